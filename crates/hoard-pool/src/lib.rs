//! Disk-backed asset pool for Hoard
//!
//! This crate owns the pool directory: content-addressed blob storage, the
//! name index, protection tags and LRU eviction under size and free-space
//! limits. It also provides read-only path resolution and realization of
//! pool assets to external locations.

pub mod pool;
pub mod realize;
pub mod resolve;

// Re-export main types
pub use pool::{
    DiskSpace, EvictionReport, OwnedReservation, PoolEntry, PoolOptions, PoolStats, PoolStore,
    Reservation, SpaceProbe,
};
pub use realize::{RealizeOutcome, RealizeReport, Realizer};
pub use resolve::PathResolver;

use hoard_core::error::HoardError;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, HoardError>;
