//! Asset descriptor types.
//!
//! Defines the logical identity of a remote asset and the digest it is
//! expected to have once downloaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{HoardError, HoardResult};

/// Digest algorithm declared for an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HashMethod {
    #[serde(rename = "SHA1", alias = "sha1")]
    Sha1,
    #[serde(rename = "SHA256", alias = "sha256")]
    Sha256,
    #[serde(rename = "SHA512", alias = "sha512")]
    Sha512,
}

impl HashMethod {
    /// Length of the hex encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            HashMethod::Sha1 => 40,
            HashMethod::Sha256 => 64,
            HashMethod::Sha512 => 128,
        }
    }

    /// Lowercase tag used in pool paths
    pub fn as_str(&self) -> &'static str {
        match self {
            HashMethod::Sha1 => "sha1",
            HashMethod::Sha256 => "sha256",
            HashMethod::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashMethod {
    type Err = HoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashMethod::Sha1),
            "sha256" => Ok(HashMethod::Sha256),
            "sha512" => Ok(HashMethod::Sha512),
            other => Err(HoardError::InvalidAsset {
                name: other.to_string(),
                reason: "unsupported hash method".to_string(),
            }),
        }
    }
}

/// Declared digest: algorithm tag plus hex digest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetHash {
    pub method: HashMethod,
    pub hex: String,
}

impl AssetHash {
    /// Create a digest, normalizing the hex to lowercase
    pub fn new(method: HashMethod, hex: impl Into<String>) -> Self {
        Self {
            method,
            hex: hex.into().to_ascii_lowercase(),
        }
    }

    /// Lowercase hex digest
    pub fn normalized_hex(&self) -> String {
        self.hex.to_ascii_lowercase()
    }

    /// Case-insensitive comparison against a computed hex digest
    pub fn matches_hex(&self, hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(hex)
    }

    /// Check the digest is well-formed for its method
    pub fn validate(&self) -> Result<(), String> {
        if self.hex.len() != self.method.hex_len() {
            return Err(format!(
                "{} digest must be {} hex characters, got {}",
                self.method,
                self.method.hex_len(),
                self.hex.len()
            ));
        }
        if !self.hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("digest '{}' is not hexadecimal", self.hex));
        }
        Ok(())
    }
}

// Digests compare case-insensitively
impl PartialEq for AssetHash {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method && self.hex.eq_ignore_ascii_case(&other.hex)
    }
}

impl Eq for AssetHash {}

impl std::hash::Hash for AssetHash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.method.hash(state);
        self.normalized_hex().hash(state);
    }
}

impl fmt::Display for AssetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.normalized_hex())
    }
}

impl FromStr for AssetHash {
    type Err = HoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, hex) = s.split_once(':').ok_or_else(|| HoardError::InvalidAsset {
            name: s.to_string(),
            reason: "expected '<method>:<hex>'".to_string(),
        })?;
        let hash = AssetHash::new(method.parse()?, hex);
        hash.validate().map_err(|reason| HoardError::InvalidAsset {
            name: s.to_string(),
            reason,
        })?;
        Ok(hash)
    }
}

/// Logical identity and expectations for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Unique key within a collection
    pub name: String,
    /// Declared digest
    pub hash: AssetHash,
    /// Source URI
    pub link: Url,
    /// Expected byte length, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Caller-defined fields, carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AssetDescriptor {
    /// Create a descriptor with no declared size
    pub fn new(name: impl Into<String>, hash: AssetHash, link: Url) -> Self {
        Self {
            name: name.into(),
            hash,
            link,
            size: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Set the expected byte length
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Validate name and digest
    pub fn validate(&self) -> HoardResult<()> {
        if self.name.is_empty() {
            return Err(HoardError::InvalidAsset {
                name: self.name.clone(),
                reason: "asset name must not be empty".to_string(),
            });
        }
        self.hash.validate().map_err(|reason| HoardError::InvalidAsset {
            name: self.name.clone(),
            reason,
        })
    }

    /// Parse a JSON array of descriptors and validate each one
    pub fn parse_collection(json: &str) -> HoardResult<Vec<AssetDescriptor>> {
        let assets: Vec<AssetDescriptor> =
            serde_json::from_str(json).map_err(|e| HoardError::InvalidAsset {
                name: "<collection>".to_string(),
                reason: format!("invalid asset list: {}", e),
            })?;
        for asset in &assets {
            asset.validate()?;
        }
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256_HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_hash_case_insensitive() {
        let lower = AssetHash::new(HashMethod::Sha256, SHA256_HELLO);
        let upper = AssetHash {
            method: HashMethod::Sha256,
            hex: SHA256_HELLO.to_uppercase(),
        };
        assert_eq!(lower, upper);
        assert!(upper.matches_hex(SHA256_HELLO));
        assert_eq!(upper.normalized_hex(), SHA256_HELLO);
    }

    #[test]
    fn test_hash_validation() {
        assert!(AssetHash::new(HashMethod::Sha256, SHA256_HELLO).validate().is_ok());
        assert!(AssetHash::new(HashMethod::Sha1, SHA256_HELLO).validate().is_err());
        assert!(AssetHash::new(HashMethod::Sha1, "z".repeat(40)).validate().is_err());
    }

    #[test]
    fn test_hash_from_str() {
        let hash: AssetHash = format!("SHA256:{}", SHA256_HELLO).parse().unwrap();
        assert_eq!(hash.method, HashMethod::Sha256);
        assert_eq!(hash.to_string(), format!("sha256:{}", SHA256_HELLO));
        assert!("md5:abcd".parse::<AssetHash>().is_err());
        assert!("nocolon".parse::<AssetHash>().is_err());
    }

    #[test]
    fn test_parse_collection_keeps_extra_fields() {
        let json = format!(
            r#"[{{
                "name": "intro.mp4",
                "hash": {{ "method": "SHA256", "hex": "{}" }},
                "link": "https://cdn.example.com/intro.mp4",
                "size": 11,
                "title": "Intro"
            }}]"#,
            SHA256_HELLO
        );
        let assets = AssetDescriptor::parse_collection(&json).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].size, Some(11));
        assert_eq!(assets[0].extra.get("title").unwrap(), "Intro");
    }

    #[test]
    fn test_parse_collection_rejects_bad_digest() {
        let json = r#"[{
            "name": "a",
            "hash": { "method": "SHA1", "hex": "abc" },
            "link": "https://cdn.example.com/a"
        }]"#;
        assert!(matches!(
            AssetDescriptor::parse_collection(json),
            Err(HoardError::InvalidAsset { .. })
        ));
    }
}
