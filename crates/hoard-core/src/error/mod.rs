//! Error types and result aliases for Hoard operations.
//!
//! Provides a unified error type that covers all possible error conditions
//! across the Hoard crates with actionable error messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Hoard operations
#[derive(Error, Debug)]
pub enum HoardError {
    // Config errors
    #[error("Failed to parse hoard.toml: {message}")]
    TomlParse { message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("Asset '{name}' is invalid: {reason}")]
    InvalidAsset { name: String, reason: String },

    // Transfer errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Server answered {status} for {link}")]
    HttpStatus { link: String, status: u16 },

    #[error(
        "Transfer of '{name}' too slow: {observed} bytes in the last {period_secs}s, need at least {required}"
    )]
    TransferTooSlow {
        name: String,
        observed: u64,
        required: u64,
        period_secs: u64,
    },

    #[error("Hash mismatch for '{name}': expected {expected}, got {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for '{name}': expected {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("Transfer of '{name}' was cancelled")]
    Cancelled { name: String },

    // Pool errors
    #[error("Pool capacity exceeded: {reason}")]
    Capacity { reason: String },

    #[error("Asset '{name}' is not ready")]
    NotReady { name: String },

    #[error("Asset '{name}' is protected by {refcount} tag(s)")]
    AssetProtected { name: String, refcount: u32 },

    #[error("Failed to realize '{name}': {reason}")]
    Realize { name: String, reason: String },

    #[error("Pool at {path} is locked by another instance")]
    Lock {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Pool index at {path} is corrupt: {reason}")]
    CorruptIndex { path: String, reason: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Hoard operations
pub type HoardResult<T> = Result<T, HoardError>;

/// Coarse classification of a failure, carried by fetch events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Io,
    Network,
    TransferTooSlow,
    HashMismatch,
    SizeMismatch,
    Capacity,
    Cancelled,
    Other,
}

impl HoardError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a capacity error
    pub fn capacity(reason: impl Into<String>) -> Self {
        Self::Capacity {
            reason: reason.into(),
        }
    }

    /// Whether a per-asset transfer attempt that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HoardError::Cancelled { .. }
                | HoardError::InvalidAsset { .. }
                | HoardError::Lock { .. }
                | HoardError::CorruptIndex { .. }
        )
    }

    /// Classification used when reporting a failed asset
    pub fn kind(&self) -> FailureKind {
        match self {
            HoardError::Io { .. } => FailureKind::Io,
            HoardError::Network { .. } | HoardError::HttpStatus { .. } => FailureKind::Network,
            HoardError::TransferTooSlow { .. } => FailureKind::TransferTooSlow,
            HoardError::HashMismatch { .. } => FailureKind::HashMismatch,
            HoardError::SizeMismatch { .. } => FailureKind::SizeMismatch,
            HoardError::Capacity { .. } => FailureKind::Capacity,
            HoardError::Cancelled { .. } => FailureKind::Cancelled,
            _ => FailureKind::Other,
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            HoardError::Network { .. } | HoardError::HttpStatus { .. } => {
                Some("Check your network connection and the asset link, then try again")
            },
            HoardError::TransferTooSlow { .. } => {
                Some("Lower minimum_transfer_rate in hoard.toml or retry on a faster link")
            },
            HoardError::Capacity { .. } => {
                Some("Raise the pool size, unprotect unused assets, or free disk space")
            },
            HoardError::Lock { .. } => {
                Some("Another hoard process owns this pool; wait for it to finish")
            },
            HoardError::CorruptIndex { .. } => {
                Some("Run 'hoard rebuild' to rescan the pool directory")
            },
            HoardError::NotReady { .. } | HoardError::Realize { .. } => {
                Some("Run 'hoard fetch' for the asset list first")
            },
            _ => None,
        }
    }
}
