//! Exclusive ownership of a pool directory.

use camino::Utf8Path;
use fs4::fs_std::FileExt;
use hoard_core::HoardError;
use std::fs::{File, OpenOptions};

use crate::PoolResult;

pub const LOCK_FILE: &str = "pool.lock";

/// Holds the pool's lock file; the lock is released when this is dropped
#[derive(Debug)]
pub struct PoolLock {
    _file: File,
}

impl PoolLock {
    /// Take the lock without blocking
    pub fn acquire(root: &Utf8Path) -> PoolResult<Self> {
        let path = root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| HoardError::io(format!("Failed to open lock file {}", path), e))?;

        match file.try_lock_exclusive() {
            Ok(true) => Ok(Self { _file: file }),
            Ok(false) => Err(HoardError::Lock {
                path: root.to_string(),
                source: None,
            }),
            Err(e) => Err(HoardError::Lock {
                path: root.to_string(),
                source: Some(e),
            }),
        }
    }
}
