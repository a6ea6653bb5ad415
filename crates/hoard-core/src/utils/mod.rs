//! Utility functions and helpers.
//!
//! Common functionality used across multiple Hoard crates.

pub mod hash;
pub mod path;

// Re-export commonly used utilities
pub use hash::{hash_bytes, hash_file, verify_file, Digester};
pub use path::is_safe_file_name;
