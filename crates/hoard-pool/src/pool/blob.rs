//! Blob layout and directory rescans.
//!
//! Blobs live at `blobs/<method>/<hex[0..2]>/<hex>`. A file at that path is
//! always complete: bytes are verified in `tmp/` and renamed into place.

use camino::{Utf8Path, Utf8PathBuf};
use hoard_core::utils::hash_file;
use hoard_core::{AssetHash, HashMethod};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const BLOBS_DIR: &str = "blobs";

/// Get the storage path for a digest
pub fn blob_path(root: &Utf8Path, hash: &AssetHash) -> Utf8PathBuf {
    let hex = hash.normalized_hex();
    root.join(BLOBS_DIR)
        .join(hash.method.as_str())
        .join(&hex[0..2])
        .join(&hex)
}

/// Recover the digest a blob path claims to hold
pub fn parse_blob_path(blobs_root: &Utf8Path, path: &Utf8Path) -> Option<AssetHash> {
    let relative = path.strip_prefix(blobs_root).ok()?;
    let parts: Vec<&str> = relative.iter().collect();
    let [method, prefix, hex] = parts.as_slice() else {
        return None;
    };
    let method: HashMethod = method.parse().ok()?;
    let hash = AssetHash::new(method, *hex);
    if hash.validate().is_err()
        || prefix.len() != 2
        || !hash.hex.starts_with(*prefix)
        || *hex != hash.hex
    {
        return None;
    }
    Some(hash)
}

/// A blob file found during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedBlob {
    pub hash: AssetHash,
    pub path: Utf8PathBuf,
    pub size: u64,
}

/// Result of scanning the blob directory
#[derive(Debug, Default)]
pub struct BlobScan {
    /// Files at valid blob addresses
    pub blobs: Vec<ScannedBlob>,
    /// Files that are not valid blob addresses
    pub strays: Vec<PathBuf>,
}

/// List every file under `blobs/`, sorted for deterministic processing
pub fn scan_blobs(root: &Utf8Path) -> BlobScan {
    let blobs_root = root.join(BLOBS_DIR);
    let mut scan = BlobScan::default();

    let mut paths: Vec<PathBuf> = WalkDir::new(&blobs_root)
        .into_iter()
        .filter_map(|entry| {
            entry.ok().and_then(|e| {
                if e.file_type().is_file() {
                    Some(e.path().to_path_buf())
                } else {
                    None
                }
            })
        })
        .collect();
    paths.sort();

    for path in paths {
        let parsed = Utf8PathBuf::from_path_buf(path.clone())
            .ok()
            .and_then(|utf8| parse_blob_path(&blobs_root, &utf8).map(|hash| (hash, utf8)));
        match parsed {
            Some((hash, utf8)) => match fs::metadata(&path) {
                Ok(meta) => scan.blobs.push(ScannedBlob {
                    hash,
                    path: utf8,
                    size: meta.len(),
                }),
                Err(e) => warn!("Skipping unreadable blob {}: {}", path.display(), e),
            },
            None => scan.strays.push(path),
        }
    }
    scan
}

/// Re-hash scanned blobs in parallel and split them into verified and corrupt
pub fn verify_blobs(blobs: Vec<ScannedBlob>) -> (Vec<ScannedBlob>, Vec<ScannedBlob>) {
    let checked: Vec<(ScannedBlob, bool)> = blobs
        .into_par_iter()
        .map(|blob| {
            let ok = match hash_file(blob.hash.method, blob.path.as_std_path()) {
                Ok(actual) => blob.hash.matches_hex(&actual),
                Err(e) => {
                    debug!("Failed to hash {}: {}", blob.path, e);
                    false
                }
            };
            (blob, ok)
        })
        .collect();

    let (good, bad): (Vec<_>, Vec<_>) = checked.into_iter().partition(|(_, ok)| *ok);
    (
        good.into_iter().map(|(blob, _)| blob).collect(),
        bad.into_iter().map(|(blob, _)| blob).collect(),
    )
}

/// Remove a blob file and its now-empty prefix directories
pub fn remove_blob_file(path: &Utf8Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    if let Some(parent) = path.parent() {
        let _ = fs::remove_dir(parent); // Only succeeds when empty
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::utils::hash_bytes;
    use tempfile::tempdir;

    fn utf8_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn write_blob(root: &Utf8Path, content: &[u8]) -> AssetHash {
        let hash = AssetHash::new(HashMethod::Sha256, hash_bytes(HashMethod::Sha256, content));
        let path = blob_path(root, &hash);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        hash
    }

    #[test]
    fn test_blob_path_layout() {
        let root = Utf8PathBuf::from("/pool");
        let hash = AssetHash::new(HashMethod::Sha1, "AB".to_string() + &"c".repeat(38));
        let path = blob_path(&root, &hash);
        assert_eq!(
            path,
            Utf8PathBuf::from(format!("/pool/blobs/sha1/ab/ab{}", "c".repeat(38)))
        );
        assert_eq!(
            parse_blob_path(&root.join(BLOBS_DIR), &path),
            Some(hash)
        );
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        let blobs = Utf8PathBuf::from("/pool/blobs");
        assert!(parse_blob_path(&blobs, Utf8Path::new("/pool/blobs/sha256/zz/notes.txt")).is_none());
        assert!(parse_blob_path(&blobs, Utf8Path::new("/pool/blobs/md5/ab/abcd")).is_none());
        let wrong_prefix = format!("/pool/blobs/sha1/ff/ab{}", "c".repeat(38));
        assert!(parse_blob_path(&blobs, Utf8Path::new(&wrong_prefix)).is_none());
    }

    #[test]
    fn test_scan_and_verify() {
        let temp_dir = tempdir().unwrap();
        let root = utf8_root(&temp_dir);

        let good = write_blob(&root, b"content1");
        let tampered = write_blob(&root, b"content2");
        fs::write(blob_path(&root, &tampered), b"tampered").unwrap();
        fs::write(root.join(BLOBS_DIR).join("stray.txt"), b"x").unwrap();

        let scan = scan_blobs(&root);
        assert_eq!(scan.blobs.len(), 2);
        assert_eq!(scan.strays.len(), 1);

        let (verified, corrupt) = verify_blobs(scan.blobs);
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].hash, good);
        assert_eq!(corrupt.len(), 1);
        assert_eq!(corrupt[0].hash, tampered);
    }

    #[test]
    fn test_scan_empty_pool() {
        let temp_dir = tempdir().unwrap();
        let scan = scan_blobs(&utf8_root(&temp_dir));
        assert!(scan.blobs.is_empty());
        assert!(scan.strays.is_empty());
    }

    #[test]
    fn test_remove_blob_file_tolerates_missing() {
        let temp_dir = tempdir().unwrap();
        let root = utf8_root(&temp_dir);
        let hash = write_blob(&root, b"bye");
        let path = blob_path(&root, &hash);
        remove_blob_file(&path).unwrap();
        assert!(!path.exists());
        remove_blob_file(&path).unwrap();
    }
}
