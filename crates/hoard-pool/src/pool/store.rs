//! Pool store implementation
//!
//! PoolStore owns a pool directory: the blob files, the index, protection
//! bookkeeping and the capacity policy. Every mutation runs under one mutex
//! and the directory lock is held for the store's lifetime.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use hoard_core::utils::verify_file;
use hoard_core::{AssetDescriptor, HoardError};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::blob::{blob_path, remove_blob_file, scan_blobs, verify_blobs, BLOBS_DIR};
use super::evict::{lru_order, plan_eviction, Budget, Candidate, RoomRequest};
use super::index::{blob_key, PoolIndex};
use super::lock::PoolLock;
use super::protect::ProtectionTable;
use super::space::{DiskSpace, SpaceProbe};
use crate::PoolResult;

pub const INDEX_FILE: &str = "index.json";
pub const TMP_DIR: &str = "tmp";

/// Options for opening a pool
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Rescan the blob directory instead of failing when the index is corrupt
    pub rebuild_on_corrupt: bool,
    /// Source of device free-space figures
    pub space_probe: Arc<dyn SpaceProbe>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            rebuild_on_corrupt: false,
            space_probe: Arc::new(DiskSpace),
        }
    }
}

/// Committed asset as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub name: String,
    pub hash: hoard_core::AssetHash,
    pub size: u64,
    pub path: Utf8PathBuf,
    pub last_accessed: DateTime<Utc>,
    pub protection_refcount: u32,
}

/// Blobs removed by an eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub evicted_blobs: usize,
    pub freed_bytes: u64,
    /// Asset names that lost their entry
    pub assets: Vec<String>,
}

impl EvictionReport {
    fn absorb(&mut self, other: EvictionReport) {
        self.evicted_blobs += other.evicted_blobs;
        self.freed_bytes += other.freed_bytes;
        self.assets.extend(other.assets);
    }
}

/// Snapshot of pool figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub usage: u64,
    pub blob_count: usize,
    pub asset_count: usize,
    pub orphan_count: usize,
    pub pending_bytes: u64,
    pub maximum_pool_size: u64,
    pub reserved_free_space: u64,
}

#[derive(Debug)]
struct PoolState {
    index: PoolIndex,
    protections: ProtectionTable,
    maximum_pool_size: u64,
    reserved_free_space: u64,
    /// In-flight reservations by id
    pending: HashMap<u64, u64>,
    next_reservation: u64,
    dirty: bool,
    closed: bool,
}

impl PoolState {
    fn pending_total(&self) -> u64 {
        self.pending.values().sum()
    }

    fn protected_keys(&self) -> HashSet<&str> {
        self.index
            .names
            .iter()
            .filter(|(name, _)| self.protections.is_protected(name))
            .map(|(_, key)| key.as_str())
            .collect()
    }

    fn candidates(&self) -> Vec<Candidate> {
        let protected = self.protected_keys();
        let mut candidates: Vec<Candidate> = self
            .index
            .blobs
            .iter()
            .filter(|(key, _)| !protected.contains(key.as_str()))
            .map(|(key, record)| Candidate {
                key: key.clone(),
                size: record.size,
                last_accessed: record.last_accessed,
                seq: record.seq,
            })
            .collect();
        lru_order(&mut candidates);
        candidates
    }
}

/// Content-addressed asset pool
#[derive(Debug)]
pub struct PoolStore {
    /// Root directory of the pool
    root: Utf8PathBuf,
    index_path: Utf8PathBuf,
    tmp_dir: Utf8PathBuf,
    state: Mutex<PoolState>,
    space: Arc<dyn SpaceProbe>,
    /// Released last, after the final index flush in `Drop`
    _lock: PoolLock,
}

/// Space held for an in-flight fetch; released on drop unless committed
#[derive(Debug)]
pub struct Reservation<'a> {
    store: &'a PoolStore,
    id: u64,
    bytes: u64,
    armed: bool,
}

impl Reservation<'_> {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn disarm(&mut self) -> u64 {
        self.armed = false;
        self.id
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.lock_state().pending.remove(&self.id);
        }
    }
}

/// A `Reservation` holding its own store handle, so it can move into blocking tasks
#[derive(Debug)]
pub struct OwnedReservation {
    store: Arc<PoolStore>,
    id: u64,
    bytes: u64,
    armed: bool,
}

impl OwnedReservation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn disarm(&mut self) -> u64 {
        self.armed = false;
        self.id
    }
}

impl Drop for OwnedReservation {
    fn drop(&mut self) {
        if self.armed {
            self.store.lock_state().pending.remove(&self.id);
        }
    }
}

impl PoolStore {
    /// Open (or create) a pool with default options
    pub fn open<P: AsRef<Utf8Path>>(root: P) -> PoolResult<Self> {
        Self::open_with(root, PoolOptions::default())
    }

    /// Open (or create) a pool
    pub fn open_with<P: AsRef<Utf8Path>>(root: P, options: PoolOptions) -> PoolResult<Self> {
        Self::open_inner(root.as_ref(), options, false)
    }

    /// Open a pool, discarding its index and rebuilding it from the blob directory
    pub fn rebuild<P: AsRef<Utf8Path>>(root: P, options: PoolOptions) -> PoolResult<Self> {
        Self::open_inner(root.as_ref(), options, true)
    }

    fn open_inner(root: &Utf8Path, options: PoolOptions, force_rebuild: bool) -> PoolResult<Self> {
        let root = root.to_path_buf();
        let tmp_dir = root.join(TMP_DIR);
        fs::create_dir_all(root.join(BLOBS_DIR))
            .map_err(|e| HoardError::io(format!("Failed to create pool directory {}", root), e))?;
        fs::create_dir_all(&tmp_dir)
            .map_err(|e| HoardError::io(format!("Failed to create {}", tmp_dir), e))?;

        let lock = PoolLock::acquire(&root)?;
        clear_staging(&tmp_dir)?;

        let index_path = root.join(INDEX_FILE);
        let index = if force_rebuild {
            rebuild_index(&root)
        } else {
            match PoolIndex::load(index_path.as_std_path()) {
                Ok(index) => reconcile(&root, index),
                Err(HoardError::CorruptIndex { reason, .. }) if options.rebuild_on_corrupt => {
                    warn!("Pool index at {} is corrupt ({}), rebuilding", index_path, reason);
                    rebuild_index(&root)
                }
                Err(e) => return Err(e),
            }
        };
        index.save(index_path.as_std_path())?;

        let mut protections = ProtectionTable::new();
        for (tag, names) in &index.protections {
            protections.protect(tag, names.iter().cloned());
        }

        info!(
            "Opened pool at {} ({} assets, {} blobs, {} bytes)",
            root,
            index.names.len(),
            index.blobs.len(),
            index.usage()
        );

        Ok(Self {
            root,
            index_path,
            tmp_dir,
            state: Mutex::new(PoolState {
                index,
                protections,
                maximum_pool_size: u64::MAX,
                reserved_free_space: 0,
                pending: HashMap::new(),
                next_reservation: 0,
                dirty: false,
                closed: false,
            }),
            space: options.space_probe,
            _lock: lock,
        })
    }

    /// Get the root path of the pool
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory for staging files of in-flight fetches
    pub fn tmp_dir(&self) -> &Utf8Path {
        &self.tmp_dir
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock()
    }

    fn persist(&self, state: &mut PoolState) -> PoolResult<()> {
        state.index.save(self.index_path.as_std_path())?;
        state.dirty = false;
        Ok(())
    }
}

// Capacity policy and eviction
impl PoolStore {
    /// Set the byte cap, evicting unprotected blobs if usage now exceeds it.
    /// Fails with `Capacity`, leaving cap and pool untouched, when protected
    /// blobs alone exceed the new cap.
    pub fn set_maximum_pool_size(&self, bytes: u64) -> PoolResult<EvictionReport> {
        let mut state = self.lock_state();
        let previous = state.maximum_pool_size;
        state.maximum_pool_size = bytes;
        let request = RoomRequest {
            usage_incoming: 0,
            device_incoming: None,
        };
        let result = self.make_room(&mut state, request);
        if result.is_err() {
            state.maximum_pool_size = previous;
        }
        if state.dirty {
            self.persist(&mut state)?;
        }
        let report = result?;
        debug!("Maximum pool size set to {} bytes", bytes);
        Ok(report)
    }

    pub fn maximum_pool_size(&self) -> u64 {
        self.lock_state().maximum_pool_size
    }

    /// Set the device free-space floor for later writes
    pub fn reserve_storage(&self, bytes: u64) {
        self.lock_state().reserved_free_space = bytes;
        debug!("Reserved free space set to {} bytes", bytes);
    }

    pub fn reserved_free_space(&self) -> u64 {
        self.lock_state().reserved_free_space
    }

    /// Committed bytes
    pub fn usage(&self) -> u64 {
        self.lock_state().index.usage()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        let named: HashSet<&String> = state.index.names.values().collect();
        PoolStats {
            usage: state.index.usage(),
            blob_count: state.index.blobs.len(),
            asset_count: state.index.names.len(),
            orphan_count: state.index.blobs.len() - named.len(),
            pending_bytes: state.pending_total(),
            maximum_pool_size: state.maximum_pool_size,
            reserved_free_space: state.reserved_free_space,
        }
    }

    /// Hold space for a write of `bytes`, evicting if needed
    pub fn reserve(&self, bytes: u64) -> PoolResult<Reservation<'_>> {
        let mut state = self.lock_state();
        let pending = state.pending_total();
        let request = RoomRequest {
            usage_incoming: pending.saturating_add(bytes),
            device_incoming: Some(pending.saturating_add(bytes)),
        };
        let result = self.make_room(&mut state, request);
        if state.dirty {
            self.persist(&mut state)?;
        }
        result?;

        let id = state.next_reservation;
        state.next_reservation += 1;
        state.pending.insert(id, bytes);
        debug!("Reserved {} bytes (reservation {})", bytes, id);
        Ok(Reservation {
            store: self,
            id,
            bytes,
            armed: true,
        })
    }

    /// `reserve` for callers sharing the store through an `Arc`
    pub fn reserve_owned(self: &Arc<Self>, bytes: u64) -> PoolResult<OwnedReservation> {
        let mut reservation = self.reserve(bytes)?;
        let id = reservation.disarm();
        Ok(OwnedReservation {
            store: self.clone(),
            id,
            bytes,
            armed: true,
        })
    }

    /// Evict every unprotected blob
    pub fn evict_unprotected(&self) -> PoolResult<EvictionReport> {
        let mut state = self.lock_state();
        let mut report = EvictionReport::default();
        for candidate in state.candidates() {
            report.absorb(self.evict_blob(&mut state, &candidate.key)?);
        }
        if state.dirty {
            self.persist(&mut state)?;
        }
        Ok(report)
    }

    fn budget(&self, state: &PoolState, request: &RoomRequest) -> PoolResult<Budget> {
        let available_space = match request.device_incoming {
            Some(_) => self.space.available_space(&self.root).map_err(|e| {
                HoardError::io(format!("Failed to query free space for {}", self.root), e)
            })?,
            None => u64::MAX,
        };
        Ok(Budget {
            usage: state.index.usage(),
            maximum_pool_size: state.maximum_pool_size,
            available_space,
            reserved_free_space: state.reserved_free_space,
        })
    }

    /// Evict LRU candidates one at a time until the request fits.
    /// Nothing is evicted when no amount of eviction could make it fit.
    fn make_room(&self, state: &mut PoolState, request: RoomRequest) -> PoolResult<EvictionReport> {
        let budget = self.budget(state, &request)?;
        let mut report = EvictionReport::default();
        if budget.fits(&request, 0) {
            return Ok(report);
        }

        if plan_eviction(&budget, &request, state.candidates()).is_none() {
            return Err(capacity_error(&budget, &request));
        }

        loop {
            let budget = self.budget(state, &request)?;
            if budget.fits(&request, 0) {
                return Ok(report);
            }
            let Some(candidate) = state.candidates().into_iter().next() else {
                return Err(capacity_error(&budget, &request));
            };
            report.absorb(self.evict_blob(state, &candidate.key)?);
        }
    }

    fn evict_blob(&self, state: &mut PoolState, key: &str) -> PoolResult<EvictionReport> {
        let Some(record) = state.index.blobs.get(key).cloned() else {
            return Ok(EvictionReport::default());
        };
        let path = blob_path(&self.root, &record.hash);
        remove_blob_file(&path)
            .map_err(|e| HoardError::io(format!("Failed to remove blob {}", path), e))?;

        let names = state
            .index
            .remove_blob(key)
            .map(|(_, names)| names)
            .unwrap_or_default();
        state.dirty = true;
        info!(
            "Evicted blob {} ({} bytes, assets: {:?})",
            key, record.size, names
        );
        Ok(EvictionReport {
            evicted_blobs: 1,
            freed_bytes: record.size,
            assets: names,
        })
    }
}

// Commit and lookup
impl PoolStore {
    /// Promote a verified staging file into the pool under `asset.name`.
    /// `computed_hex` is the digest computed while the bytes were written.
    pub fn commit(
        &self,
        mut reservation: Reservation<'_>,
        asset: &AssetDescriptor,
        staged: &Path,
        computed_hex: &str,
    ) -> PoolResult<PoolEntry> {
        let id = reservation.disarm();
        self.commit_reserved(id, asset, staged, computed_hex)
    }

    /// `commit` for a reservation taken with `reserve_owned`
    pub fn commit_owned(
        &self,
        mut reservation: OwnedReservation,
        asset: &AssetDescriptor,
        staged: &Path,
        computed_hex: &str,
    ) -> PoolResult<PoolEntry> {
        let id = reservation.disarm();
        self.commit_reserved(id, asset, staged, computed_hex)
    }

    fn commit_reserved(
        &self,
        id: u64,
        asset: &AssetDescriptor,
        staged: &Path,
        computed_hex: &str,
    ) -> PoolResult<PoolEntry> {
        let mut state = self.lock_state();
        state.pending.remove(&id);

        if !asset.hash.matches_hex(computed_hex) {
            return Err(HoardError::HashMismatch {
                name: asset.name.clone(),
                expected: asset.hash.normalized_hex(),
                actual: computed_hex.to_ascii_lowercase(),
            });
        }

        let size = fs::metadata(staged)
            .map_err(|e| HoardError::io(format!("Failed to stat {}", staged.display()), e))?
            .len();
        let key = blob_key(&asset.hash);
        let dest = blob_path(&self.root, &asset.hash);

        if state.index.blobs.contains_key(&key) && dest.exists() {
            // Same bytes already pooled under another name
            let _ = fs::remove_file(staged);
        } else {
            let others = state.pending_total();
            let request = RoomRequest {
                usage_incoming: size.saturating_add(others),
                device_incoming: Some(others),
            };
            let result = self.make_room(&mut state, request);
            if state.dirty {
                self.persist(&mut state)?;
            }
            result?;

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    HoardError::io("Failed to create blob directory".to_string(), e)
                })?;
            }
            fs::rename(staged, &dest)
                .map_err(|e| HoardError::io(format!("Failed to move blob into {}", dest), e))?;
            state.index.blobs.remove(&key);
            state
                .index
                .insert_blob(key.clone(), asset.hash.clone(), size);
        }

        self.link_name(&mut state, &asset.name, &key)?;
        self.persist(&mut state)?;
        info!("Committed '{}' as {} ({} bytes)", asset.name, key, size);

        entry_locked(&self.root, &state, &asset.name).ok_or_else(|| HoardError::NotReady {
            name: asset.name.clone(),
        })
    }

    /// Point a name at a blob, dropping the blob it used to point at if nothing else uses it
    fn link_name(&self, state: &mut PoolState, name: &str, key: &str) -> PoolResult<()> {
        let previous = state.index.names.insert(name.to_string(), key.to_string());
        state.index.touch(key);
        state.dirty = true;
        if let Some(previous) = previous {
            if previous != key && state.index.names_for(&previous).next().is_none() {
                debug!("'{}' replaced, dropping stale blob {}", name, previous);
                self.evict_blob(state, &previous)?;
            }
        }
        Ok(())
    }

    /// Return the entry for an asset if the pool already holds its bytes.
    /// A blob with the same digest held under another name, or as an orphan,
    /// is linked to this name without any transfer.
    pub fn claim_existing(&self, asset: &AssetDescriptor) -> PoolResult<Option<PoolEntry>> {
        let key = blob_key(&asset.hash);
        let orphan_path = {
            let mut state = self.lock_state();
            if is_ready_locked(&self.root, &state, asset) {
                state.index.touch(&key);
                state.dirty = true;
                return Ok(entry_locked(&self.root, &state, &asset.name));
            }
            let Some(record) = state.index.blobs.get(&key) else {
                return Ok(None);
            };
            let path = blob_path(&self.root, &record.hash);
            if !path.exists() {
                return Ok(None);
            }
            let orphan = state.index.names_for(&key).next().is_none();
            orphan.then_some(path)
        };

        // Orphans were never bound to a name; check their bytes before trusting them
        if let Some(path) = orphan_path {
            if let Err(e) = verify_file(&asset.name, path.as_std_path(), &asset.hash) {
                warn!("Orphan blob {} failed verification: {}", path, e);
                let mut state = self.lock_state();
                self.evict_blob(&mut state, &key)?;
                self.persist(&mut state)?;
                return Ok(None);
            }
        }

        let mut state = self.lock_state();
        if state.index.blobs.contains_key(&key) {
            self.link_name(&mut state, &asset.name, &key)?;
            self.persist(&mut state)?;
            info!("Adopted existing blob {} for '{}'", key, asset.name);
            return Ok(entry_locked(&self.root, &state, &asset.name));
        }
        Ok(None)
    }

    /// True iff every asset has a committed entry matching its declared digest
    pub fn are_assets_ready(&self, assets: &[AssetDescriptor]) -> bool {
        let state = self.lock_state();
        assets
            .iter()
            .all(|asset| is_ready_locked(&self.root, &state, asset))
    }

    pub fn is_asset_ready(&self, asset: &AssetDescriptor) -> bool {
        let state = self.lock_state();
        is_ready_locked(&self.root, &state, asset)
    }

    /// Entry for a name without touching its access time
    pub fn entry(&self, name: &str) -> Option<PoolEntry> {
        let state = self.lock_state();
        entry_locked(&self.root, &state, name)
    }

    /// Entry for a name, marking it as accessed
    pub fn resolve(&self, name: &str) -> PoolResult<PoolEntry> {
        let mut state = self.lock_state();
        let key = state
            .index
            .names
            .get(name)
            .cloned()
            .ok_or_else(|| HoardError::NotReady {
                name: name.to_string(),
            })?;
        let entry = entry_locked(&self.root, &state, name)
            .filter(|entry| entry.path.exists())
            .ok_or_else(|| HoardError::NotReady {
                name: name.to_string(),
            })?;
        state.index.touch(&key);
        state.dirty = true;
        Ok(entry)
    }

    /// All named entries, sorted by name
    pub fn entries(&self) -> Vec<PoolEntry> {
        let state = self.lock_state();
        state
            .index
            .names
            .keys()
            .filter_map(|name| entry_locked(&self.root, &state, name))
            .collect()
    }

    /// Re-hash an asset's blob on disk
    pub fn verify_asset(&self, name: &str) -> PoolResult<bool> {
        let entry = self.entry(name).ok_or_else(|| HoardError::NotReady {
            name: name.to_string(),
        })?;
        match verify_file(name, entry.path.as_std_path(), &entry.hash) {
            Ok(()) => Ok(true),
            Err(HoardError::HashMismatch { actual, .. }) => {
                warn!("Blob for '{}' no longer matches its digest (got {})", name, actual);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop an asset's entry; its blob goes too once no other name uses it
    pub fn remove_asset(&self, name: &str) -> PoolResult<()> {
        let mut state = self.lock_state();
        let refcount = state.protections.refcount(name);
        if refcount > 0 {
            return Err(HoardError::AssetProtected {
                name: name.to_string(),
                refcount,
            });
        }
        let key = state
            .index
            .names
            .remove(name)
            .ok_or_else(|| HoardError::NotReady {
                name: name.to_string(),
            })?;
        state.dirty = true;
        if state.index.names_for(&key).next().is_none() {
            self.evict_blob(&mut state, &key)?;
        }
        self.persist(&mut state)?;
        info!("Removed '{}'", name);
        Ok(())
    }
}

// Protection
impl PoolStore {
    /// Protect assets under `tag` for the lifetime of this store
    pub fn protect_assets(&self, tag: &str, assets: &[AssetDescriptor]) -> usize {
        let mut state = self.lock_state();
        let added = state
            .protections
            .protect(tag, assets.iter().map(|a| a.name.clone()));
        debug!("Protected {} new asset(s) under '{}'", added, tag);
        added
    }

    /// Protect assets under `tag` and record the tag in the index so it
    /// survives `close()` and is restored by the next `open()`
    pub fn protect_assets_persistent(
        &self,
        tag: &str,
        assets: &[AssetDescriptor],
    ) -> PoolResult<usize> {
        let mut state = self.lock_state();
        let added = state
            .protections
            .protect(tag, assets.iter().map(|a| a.name.clone()));
        state
            .index
            .protections
            .entry(tag.to_string())
            .or_default()
            .extend(assets.iter().map(|a| a.name.clone()));
        self.persist(&mut state)?;
        debug!("Persistently protected {} new asset(s) under '{}'", added, tag);
        Ok(added)
    }

    /// Release a tag; returns the asset names that became evictable
    pub fn unprotect_assets(&self, tag: &str) -> PoolResult<Vec<String>> {
        let mut state = self.lock_state();
        let released = state.protections.unprotect(tag);
        if state.index.protections.remove(tag).is_some() {
            self.persist(&mut state)?;
        }
        debug!("Unprotected '{}', {} asset(s) now evictable", tag, released.len());
        Ok(released)
    }

    pub fn protection_refcount(&self, name: &str) -> u32 {
        self.lock_state().protections.refcount(name)
    }

    /// Active protection tags, sorted
    pub fn protection_tags(&self) -> Vec<String> {
        let state = self.lock_state();
        let mut tags: Vec<String> = state.protections.tag_names().cloned().collect();
        tags.sort();
        tags
    }

    /// Release session protections, flush the index and drop the lock
    pub fn close(self) -> PoolResult<()> {
        let mut state = self.lock_state();
        state.protections.clear();
        self.persist(&mut state)?;
        state.closed = true;
        drop(state);
        info!("Closed pool at {}", self.root);
        Ok(())
    }
}

impl Drop for PoolStore {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.closed && state.dirty {
            if let Err(e) = state.index.save(self.index_path.as_std_path()) {
                warn!("Failed to flush pool index on drop: {}", e);
            }
        }
    }
}

fn is_ready_locked(root: &Utf8Path, state: &PoolState, asset: &AssetDescriptor) -> bool {
    let key = blob_key(&asset.hash);
    state.index.names.get(&asset.name) == Some(&key)
        && state
            .index
            .blobs
            .get(&key)
            .map(|record| blob_path(root, &record.hash).exists())
            .unwrap_or(false)
}

fn entry_locked(root: &Utf8Path, state: &PoolState, name: &str) -> Option<PoolEntry> {
    let key = state.index.names.get(name)?;
    let record = state.index.blobs.get(key)?;
    Some(PoolEntry {
        name: name.to_string(),
        hash: record.hash.clone(),
        size: record.size,
        path: blob_path(root, &record.hash),
        last_accessed: record.last_accessed_datetime(),
        protection_refcount: state.protections.refcount(name),
    })
}

fn capacity_error(budget: &Budget, request: &RoomRequest) -> HoardError {
    match request.device_incoming {
        Some(incoming) if budget.available_space < budget.reserved_free_space.saturating_add(incoming) => {
            HoardError::capacity(format!(
                "writing {} bytes would leave less than {} bytes free ({} available) and no unprotected asset can be evicted",
                incoming, budget.reserved_free_space, budget.available_space
            ))
        }
        _ => HoardError::capacity(format!(
            "{} bytes in use plus {} incoming exceeds the {} byte limit and no unprotected asset can be evicted",
            budget.usage, request.usage_incoming, budget.maximum_pool_size
        )),
    }
}

/// Remove leftovers of interrupted fetches
fn clear_staging(tmp_dir: &Utf8Path) -> PoolResult<()> {
    let entries = fs::read_dir(tmp_dir)
        .map_err(|e| HoardError::io(format!("Failed to list {}", tmp_dir), e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => debug!("Removed stale staging file {}", path.display()),
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    Ok(())
}

/// Bring a loaded index in line with the blob directory
fn reconcile(root: &Utf8Path, mut index: PoolIndex) -> PoolIndex {
    let stale: Vec<String> = index
        .blobs
        .iter()
        .filter(|(_, record)| {
            let path = blob_path(root, &record.hash);
            !matches!(fs::metadata(&path), Ok(meta) if meta.len() == record.size)
        })
        .map(|(key, _)| key.clone())
        .collect();
    for key in stale {
        if let Some((record, names)) = index.remove_blob(&key) {
            warn!(
                "Dropping {} from index: blob missing or wrong size (assets: {:?})",
                key, names
            );
            let _ = remove_blob_file(&blob_path(root, &record.hash));
        }
    }

    let scan = scan_blobs(root);
    for stray in scan.strays {
        warn!("Removing stray file {}", stray.display());
        let _ = fs::remove_file(&stray);
    }
    for blob in scan.blobs {
        let key = blob_key(&blob.hash);
        if !index.blobs.contains_key(&key) {
            info!("Registering unindexed blob {} as orphan", key);
            index.insert_orphan(key, blob.hash, blob.size);
        }
    }
    index
}

/// Build a fresh index from verified blob files; names and persisted tags are lost
fn rebuild_index(root: &Utf8Path) -> PoolIndex {
    let scan = scan_blobs(root);
    for stray in scan.strays {
        warn!("Removing stray file {}", stray.display());
        let _ = fs::remove_file(&stray);
    }

    let (verified, corrupt) = verify_blobs(scan.blobs);
    for blob in corrupt {
        warn!("Removing blob {} whose bytes do not match its address", blob.path);
        let _ = remove_blob_file(&blob.path);
    }

    let mut index = PoolIndex::new();
    for blob in verified {
        index.insert_orphan(blob_key(&blob.hash), blob.hash, blob.size);
    }
    info!("Rebuilt pool index with {} recovered blob(s)", index.blobs.len());
    index
}

#[cfg(test)]
mod tests;
