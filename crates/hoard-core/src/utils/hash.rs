//! Incremental digest utilities for content integrity.
//!
//! Provides streaming hashers for every supported `HashMethod` so downloads
//! can be verified while they are written.

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::Path;

use crate::error::{HoardError, HoardResult};
use crate::types::{AssetHash, HashMethod};

/// Streaming hasher for one of the supported methods
#[derive(Clone)]
pub enum Digester {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Digester {
    pub fn new(method: HashMethod) -> Self {
        match method {
            HashMethod::Sha1 => Digester::Sha1(Sha1::new()),
            HashMethod::Sha256 => Digester::Sha256(Sha256::new()),
            HashMethod::Sha512 => Digester::Sha512(Sha512::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Digester::Sha1(h) => h.update(data),
            Digester::Sha256(h) => h.update(data),
            Digester::Sha512(h) => h.update(data),
        }
    }

    /// Consume the hasher and return the lowercase hex digest
    pub fn finalize_hex(self) -> String {
        match self {
            Digester::Sha1(h) => hex::encode(h.finalize()),
            Digester::Sha256(h) => hex::encode(h.finalize()),
            Digester::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Compute the hex digest of data
pub fn hash_bytes(method: HashMethod, data: &[u8]) -> String {
    let mut digester = Digester::new(method);
    digester.update(data);
    digester.finalize_hex()
}

/// Compute the hex digest of a file without loading it into memory
pub fn hash_file(method: HashMethod, path: &Path) -> HoardResult<String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| HoardError::io(format!("Failed to open {}", path.display()), e))?;
    let mut digester = Digester::new(method);
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| HoardError::io(format!("Failed to read {}", path.display()), e))?;
        if read == 0 {
            break;
        }
        digester.update(&buffer[..read]);
    }
    Ok(digester.finalize_hex())
}

/// Verify file contents against a declared digest
pub fn verify_file(name: &str, path: &Path, expected: &AssetHash) -> HoardResult<()> {
    let actual = hash_file(expected.method, path)?;
    if expected.matches_hex(&actual) {
        Ok(())
    } else {
        Err(HoardError::HashMismatch {
            name: name.to_string(),
            expected: expected.normalized_hex(),
            actual,
        })
    }
}
