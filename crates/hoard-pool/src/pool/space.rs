//! Device free-space probing.

use camino::Utf8Path;
use std::fmt::Debug;
use std::io;

/// Reports how many bytes the device holding a path can still take
pub trait SpaceProbe: Debug + Send + Sync {
    fn available_space(&self, path: &Utf8Path) -> io::Result<u64>;
}

/// Queries the filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSpace;

impl SpaceProbe for DiskSpace {
    fn available_space(&self, path: &Utf8Path) -> io::Result<u64> {
        fs4::available_space(path)
    }
}
