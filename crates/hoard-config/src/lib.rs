//! Configuration parsing for Hoard
//!
//! This crate handles parsing and validation of hoard.toml files and layers
//! environment and command-line overrides on top of them.

pub mod merge;
pub mod toml;

// Re-export main types
pub use self::merge::{default_pool_path, ConfigLayering, ConfigLoader, ConfigSource, CONFIG_FILE};
pub use self::toml::{
    load_from_file, parse_hoard_toml, serialize_hoard_toml, ByteSize, FetchSection, HoardToml,
    PoolSection, RateSection, RetrySection,
};

use hoard_core::error::HoardError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, HoardError>;
