//! Pool store module
//!
//! On-disk pool of content-addressed blobs with a name index, refcounted
//! protection and LRU eviction under a byte cap and a free-space floor.

pub mod blob;
pub mod evict;
pub mod index;
pub mod lock;
pub mod protect;
pub mod space;
pub mod store;

pub use index::{BlobRecord, PoolIndex};
pub use space::{DiskSpace, SpaceProbe};
pub use store::{
    EvictionReport, OwnedReservation, PoolEntry, PoolOptions, PoolStats, PoolStore, Reservation,
    INDEX_FILE, TMP_DIR,
};
