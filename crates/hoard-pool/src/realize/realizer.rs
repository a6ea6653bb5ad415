//! Realizer implementation for atomic copies out of the pool

use camino::{Utf8Path, Utf8PathBuf};
use hoard_core::error::HoardError;
use hoard_core::utils::{hash_file, is_safe_file_name};
use hoard_core::AssetDescriptor;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

use crate::pool::{PoolEntry, PoolStore};
use crate::PoolResult;

/// Copies pool assets to `<target_root>/<name>`
#[derive(Debug)]
pub struct Realizer {
    store: Arc<PoolStore>,
    target_root: Utf8PathBuf,
}

/// What happened to one realized file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealizeOutcome {
    Copied { bytes: u64 },
    /// The target already held identical bytes
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealizedFile {
    pub name: String,
    pub path: Utf8PathBuf,
    pub outcome: RealizeOutcome,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RealizeReport {
    pub files: Vec<RealizedFile>,
    pub files_copied: usize,
    pub files_up_to_date: usize,
    pub bytes_copied: u64,
}

impl Realizer {
    pub fn new<P: AsRef<Utf8Path>>(store: Arc<PoolStore>, target_root: P) -> Self {
        Self {
            store,
            target_root: target_root.as_ref().to_path_buf(),
        }
    }

    /// Copy every asset into the target root. All assets are checked for
    /// readiness before the first copy starts.
    pub fn realize(&self, assets: &[AssetDescriptor]) -> PoolResult<RealizeReport> {
        let mut sources = Vec::with_capacity(assets.len());
        for asset in assets {
            if !is_safe_file_name(&asset.name) {
                return Err(realize_error(&asset.name, "name is not a plain file name"));
            }
            if !self.store.is_asset_ready(asset) {
                return Err(realize_error(&asset.name, "asset is not ready in the pool"));
            }
            let entry = self
                .store
                .resolve(&asset.name)
                .map_err(|e| realize_error(&asset.name, &e.to_string()))?;
            sources.push(entry);
        }

        fs::create_dir_all(&self.target_root).map_err(|e| {
            HoardError::io(format!("Failed to create target directory {}", self.target_root), e)
        })?;

        let mut report = RealizeReport::default();
        for entry in sources {
            let path = self.target_root.join(&entry.name);
            let outcome = if is_up_to_date(&entry, &path) {
                debug!("{} is up to date", path);
                report.files_up_to_date += 1;
                RealizeOutcome::UpToDate
            } else {
                let bytes = copy_atomic(&entry.path, &path)?;
                info!("Realized '{}' to {} ({} bytes)", entry.name, path, bytes);
                report.files_copied += 1;
                report.bytes_copied += bytes;
                RealizeOutcome::Copied { bytes }
            };
            report.files.push(RealizedFile {
                name: entry.name,
                path,
                outcome,
            });
        }
        Ok(report)
    }
}

fn realize_error(name: &str, reason: &str) -> HoardError {
    HoardError::Realize {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn is_up_to_date(entry: &PoolEntry, target: &Utf8Path) -> bool {
    match fs::metadata(target) {
        Ok(meta) if meta.is_file() && meta.len() == entry.size => {
            hash_file(entry.hash.method, target.as_std_path())
                .map(|hex| entry.hash.matches_hex(&hex))
                .unwrap_or(false)
        }
        _ => false,
    }
}

/// Copy under a temporary name in the destination directory, then rename into place
fn copy_atomic(source: &Utf8Path, dest: &Utf8Path) -> PoolResult<u64> {
    let file_name = dest.file_name().unwrap_or("asset");
    let tmp = dest.with_file_name(format!(".{}.{}.partial", file_name, std::process::id()));

    let result = copy_then_rename(source, &tmp, dest);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn copy_then_rename(source: &Utf8Path, tmp: &Utf8Path, dest: &Utf8Path) -> PoolResult<u64> {
    let bytes = fs::copy(source, tmp)
        .map_err(|e| HoardError::io(format!("Failed to copy {} to {}", source, tmp), e))?;
    fs::File::open(tmp)
        .and_then(|file| file.sync_all())
        .map_err(|e| HoardError::io(format!("Failed to sync {}", tmp), e))?;
    fs::rename(tmp, dest)
        .map_err(|e| HoardError::io(format!("Failed to move {} into place", dest), e))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::utils::hash_bytes;
    use hoard_core::{AssetHash, HashMethod};
    use tempfile::{tempdir, TempDir};
    use url::Url;

    fn asset(name: &str, content: &[u8]) -> AssetDescriptor {
        AssetDescriptor::new(
            name,
            AssetHash::new(HashMethod::Sha1, hash_bytes(HashMethod::Sha1, content)),
            Url::parse("https://assets.example.com/file").unwrap(),
        )
    }

    fn setup(temp_dir: &TempDir) -> (Arc<PoolStore>, Utf8PathBuf) {
        let base = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
        let store = Arc::new(PoolStore::open(base.join("pool")).unwrap());
        (store, base.join("out"))
    }

    fn commit(store: &PoolStore, asset: &AssetDescriptor, content: &[u8]) {
        let reservation = store.reserve(content.len() as u64).unwrap();
        let staged = store.tmp_dir().join("staged");
        fs::write(&staged, content).unwrap();
        let hex = hash_bytes(asset.hash.method, content);
        store
            .commit(reservation, asset, staged.as_std_path(), &hex)
            .unwrap();
    }

    #[test]
    fn test_realize_copies_and_skips_identical() {
        let temp_dir = tempdir().unwrap();
        let (store, out) = setup(&temp_dir);
        let logo = asset("logo.png", b"png bytes");
        commit(&store, &logo, b"png bytes");
        let realizer = Realizer::new(store.clone(), &out);

        let report = realizer.realize(&[logo.clone()]).unwrap();
        assert_eq!(report.files_copied, 1);
        assert_eq!(report.bytes_copied, 9);
        assert_eq!(fs::read(out.join("logo.png")).unwrap(), b"png bytes");

        let report = realizer.realize(&[logo]).unwrap();
        assert_eq!(report.files[0].outcome, RealizeOutcome::UpToDate);
        assert_eq!(report.files_up_to_date, 1);

        // Only the realized file, no leftovers
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn test_realize_overwrites_stale_copy() {
        let temp_dir = tempdir().unwrap();
        let (store, out) = setup(&temp_dir);
        let config = asset("config.bin", b"new config");
        commit(&store, &config, b"new config");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("config.bin"), b"old config").unwrap();

        let report = Realizer::new(store, &out).realize(&[config]).unwrap();
        assert_eq!(report.files[0].outcome, RealizeOutcome::Copied { bytes: 10 });
        assert_eq!(fs::read(out.join("config.bin")).unwrap(), b"new config");
    }

    #[test]
    fn test_realize_rejects_unready_asset() {
        let temp_dir = tempdir().unwrap();
        let (store, out) = setup(&temp_dir);
        let ready = asset("ready.bin", b"ready");
        commit(&store, &ready, b"ready");
        let missing = asset("missing.bin", b"missing");

        let result = Realizer::new(store, &out).realize(&[ready, missing]);
        assert!(matches!(result, Err(HoardError::Realize { name, .. }) if name == "missing.bin"));
        assert!(!out.join("ready.bin").exists());
    }

    #[test]
    fn test_realize_rejects_escaping_name() {
        let temp_dir = tempdir().unwrap();
        let (store, out) = setup(&temp_dir);
        let sneaky = asset("../escape.bin", b"x");

        let result = Realizer::new(store, &out).realize(&[sneaky]);
        assert!(matches!(result, Err(HoardError::Realize { .. })));
    }
}
