//! Verified asset downloads for Hoard
//!
//! This crate fetches asset collections into a `PoolStore`: transfers run
//! concurrently with retry and minimum-rate enforcement, bytes are hashed as
//! they stream to a staging file, and only verified files are committed.
//! Progress and per-asset results are delivered through a `FetchTask`.

pub mod events;
pub mod fetcher;
pub mod rate;
pub mod transport;

// Re-export main types
pub use events::{FetchEvent, FetchFailure, FetchSummary, FileEvent, ProgressEvent, ResponseCode};
pub use fetcher::{FetchTask, Fetcher};
pub use rate::RateMonitor;
pub use transport::{ByteStream, HttpTransport, TransferResponse, Transport};

use hoard_core::error::HoardError;

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, HoardError>;
