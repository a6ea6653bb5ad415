//! Staging files for in-flight transfers.

use camino::{Utf8Path, Utf8PathBuf};
use hoard_core::{HoardError, HoardResult};
use std::io::ErrorKind;
use tokio::fs::{File, OpenOptions};

const MAX_ATTEMPTS: u32 = 1024;

/// A file under the pool's `tmp/` directory, deleted on drop unless committed
#[derive(Debug)]
pub(crate) struct StagingFile {
    path: Utf8PathBuf,
    armed: bool,
}

impl StagingFile {
    /// Create a fresh staging file for asset `index` of a collection
    pub(crate) async fn create(tmp_dir: &Utf8Path, index: usize, name: &str) -> HoardResult<(Self, File)> {
        let stem: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .take(64)
            .collect();

        for suffix in 0..MAX_ATTEMPTS {
            let path = tmp_dir.join(format!("{}-{}-{}.part", index, suffix, stem));
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((Self { path, armed: true }, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(HoardError::io(format!("Failed to create staging file {}", path), e))
                }
            }
        }
        Err(HoardError::io(
            format!("No free staging name for '{}' in {}", name, tmp_dir),
            std::io::Error::from(ErrorKind::AlreadyExists),
        ))
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The file has been moved away; do not delete it
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
