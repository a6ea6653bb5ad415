//! Byte sources for asset links
//!
//! A `Transport` opens a link and yields its status and a body stream. The
//! fetcher owns hashing, size checks and rate enforcement, so transports
//! only move bytes.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use hoard_core::HoardResult;
use std::fmt::Debug;
use url::Url;

pub mod http;

pub use http::HttpTransport;

/// Body of a transfer
pub type ByteStream = BoxStream<'static, HoardResult<Bytes>>;

/// Opened transfer
pub struct TransferResponse {
    /// HTTP status; local files report 200
    pub status: u16,
    /// Length announced by the source, if any
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl TransferResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl Debug for TransferResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Opens links for the fetcher
pub trait Transport: Debug + Send + Sync {
    /// Start a transfer. Errors here mean no response was obtained at all.
    fn open<'a>(&'a self, link: &'a Url) -> BoxFuture<'a, HoardResult<TransferResponse>>;
}
