//! # hoard-core
//!
//! Core types and utilities shared across all Hoard crates.
//!
//! This crate provides:
//! - AssetDescriptor and AssetHash types describing remote assets
//! - FetchOptions and MinimumTransferRate for download policy
//! - HoardError enum for unified error handling
//! - Digest and path helpers used by the pool and the fetcher
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (AssetDescriptor, FetchOptions, etc.)
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{FailureKind, HoardError, HoardResult};
pub use types::{
    AssetDescriptor, AssetHash, FetchOptions, HashMethod, MinimumTransferRate, RetryPolicy,
};
