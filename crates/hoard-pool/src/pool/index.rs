//! Pool index for metadata management
//!
//! This module provides the PoolIndex tracking committed blobs, the asset
//! names pointing at them, and persisted protection tags. The index is
//! replaced atomically on every save.

use chrono::{DateTime, Utc};
use hoard_core::{AssetHash, HoardError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::PoolResult;

const INDEX_VERSION: u32 = 1;

/// Metadata for one committed blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Content digest; also the blob's address
    pub hash: AssetHash,
    /// Size in bytes
    pub size: u64,
    /// When the blob was committed (ms timestamp)
    pub stored_at: i64,
    /// When the blob was last accessed (ms timestamp, strictly increasing per index)
    pub last_accessed: i64,
    /// Insertion order, breaks access-time ties
    pub seq: u64,
}

impl BlobRecord {
    /// Get last_accessed as DateTime
    pub fn last_accessed_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_accessed).unwrap_or_else(Utc::now)
    }
}

/// Serialized pool index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolIndex {
    #[serde(default)]
    version: u32,
    /// Next insertion sequence number
    #[serde(default)]
    next_seq: u64,
    /// Last handed out access timestamp
    #[serde(default)]
    clock: i64,
    /// Blob key ("method:hex") to record
    #[serde(default)]
    pub blobs: BTreeMap<String, BlobRecord>,
    /// Asset name to blob key
    #[serde(default)]
    pub names: BTreeMap<String, String>,
    /// Protection tags persisted beyond a single PoolStore lifetime
    #[serde(default)]
    pub protections: BTreeMap<String, BTreeSet<String>>,
}

impl PoolIndex {
    /// Empty index
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            ..Default::default()
        }
    }

    /// Load an index file; a missing file yields an empty index
    pub fn load(path: &Path) -> PoolResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => {
                return Err(HoardError::io(
                    format!("Failed to read index {}", path.display()),
                    e,
                ))
            }
        };

        let index: PoolIndex =
            serde_json::from_str(&content).map_err(|e| HoardError::CorruptIndex {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if index.version != INDEX_VERSION {
            return Err(HoardError::CorruptIndex {
                path: path.display().to_string(),
                reason: format!("unsupported index version {}", index.version),
            });
        }
        for (key, record) in &index.blobs {
            if let Err(reason) = record.hash.validate() {
                return Err(HoardError::CorruptIndex {
                    path: path.display().to_string(),
                    reason: format!("blob {}: {}", key, reason),
                });
            }
            if *key != blob_key(&record.hash) {
                return Err(HoardError::CorruptIndex {
                    path: path.display().to_string(),
                    reason: format!("blob {} is keyed as {}", blob_key(&record.hash), key),
                });
            }
        }
        if let Some((name, key)) = index
            .names
            .iter()
            .find(|(_, key)| !index.blobs.contains_key(*key))
        {
            return Err(HoardError::CorruptIndex {
                path: path.display().to_string(),
                reason: format!("asset '{}' points at unknown blob {}", name, key),
            });
        }
        Ok(index)
    }

    /// Write the index to a sibling temp file, sync it, then rename over `path`
    pub fn save(&self, path: &Path) -> PoolResult<()> {
        let content = serde_json::to_vec_pretty(self).map_err(|e| {
            HoardError::io(
                format!("Failed to serialize index: {}", e),
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        })?;

        let tmp_path = temp_sibling(path);
        {
            let mut file = fs::File::create(&tmp_path)
                .map_err(|e| HoardError::io("Failed to create index temp file".to_string(), e))?;
            file.write_all(&content)
                .map_err(|e| HoardError::io("Failed to write index temp file".to_string(), e))?;
            file.sync_all()
                .map_err(|e| HoardError::io("Failed to sync index temp file".to_string(), e))?;
        }
        fs::rename(&tmp_path, path)
            .map_err(|e| HoardError::io("Failed to replace index file".to_string(), e))?;

        // Persist the rename itself
        if let Some(parent) = path.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    /// Next strictly increasing access timestamp
    pub fn tick(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.clock = std::cmp::max(now, self.clock + 1);
        self.clock
    }

    /// Insert a blob record, assigning sequence and timestamps
    pub fn insert_blob(&mut self, key: String, hash: AssetHash, size: u64) -> &BlobRecord {
        let now = self.tick();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.blobs.entry(key).or_insert(BlobRecord {
            hash,
            size,
            stored_at: now,
            last_accessed: now,
            seq,
        })
    }

    /// Insert a blob found on disk without a name; it sorts before every accessed blob
    pub fn insert_orphan(&mut self, key: String, hash: AssetHash, size: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.blobs.entry(key).or_insert(BlobRecord {
            hash,
            size,
            stored_at: Utc::now().timestamp_millis(),
            last_accessed: 0,
            seq,
        });
    }

    /// Update a blob's access time
    pub fn touch(&mut self, key: &str) {
        let now = self.tick();
        if let Some(record) = self.blobs.get_mut(key) {
            record.last_accessed = now;
        }
    }

    /// Remove a blob and every name pointing at it
    pub fn remove_blob(&mut self, key: &str) -> Option<(BlobRecord, Vec<String>)> {
        let record = self.blobs.remove(key)?;
        let names: Vec<String> = self
            .names
            .iter()
            .filter(|(_, k)| k.as_str() == key)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.names.remove(name);
        }
        Some((record, names))
    }

    /// Names currently pointing at a blob
    pub fn names_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.names
            .iter()
            .filter(move |(_, k)| k.as_str() == key)
            .map(|(name, _)| name)
    }

    /// Sum of committed blob sizes
    pub fn usage(&self) -> u64 {
        self.blobs.values().map(|record| record.size).sum()
    }
}

/// Key under which a digest is stored in the index
pub fn blob_key(hash: &AssetHash) -> String {
    hash.to_string()
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
