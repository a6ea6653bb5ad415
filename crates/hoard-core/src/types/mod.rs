//! Core data types for Hoard asset management.
//!
//! This module provides the fundamental types used throughout Hoard:
//! - Asset descriptors and declared digests
//! - Fetch policy options

pub mod asset;
pub mod options;

// Re-export all public types
pub use asset::{AssetDescriptor, AssetHash, HashMethod};
pub use options::{FetchOptions, MinimumTransferRate, RetryPolicy};
