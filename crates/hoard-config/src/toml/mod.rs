//! hoard.toml configuration parsing and serialization

use camino::Utf8PathBuf;
use hoard_core::error::HoardError;
use hoard_core::{FetchOptions, MinimumTransferRate, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigResult;

/// Complete hoard.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoardToml {
    /// Pool location and limits
    #[serde(default)]
    pub pool: PoolSection,

    /// Fetch policy
    #[serde(default)]
    pub fetch: FetchSection,
}

/// `[pool]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolSection {
    /// Pool directory; relative paths are resolved against the config file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Utf8PathBuf>,

    /// Byte cap, e.g. `536870912` or `"512MB"`; unlimited when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_size: Option<ByteSize>,

    /// Device free-space floor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_free_space: Option<ByteSize>,
}

/// `[fetch]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchSection {
    /// Seconds between progress events of one transfer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_interval: Option<f64>,

    /// Attempts per asset beyond the first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_retry_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_transfers: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_transfer_rate: Option<RateSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySection>,
}

/// `[fetch.minimum_transfer_rate]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSection {
    pub bytes_per_second: u64,
    pub period_in_seconds: u64,
}

/// `[fetch.retry]` backoff between attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_delay_ms() -> u64 {
    RetryPolicy::default().initial_delay.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    RetryPolicy::default().max_delay.as_millis() as u64
}

fn default_multiplier() -> f64 {
    RetryPolicy::default().multiplier
}

/// Byte count written as an integer or a string with a unit suffix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ByteSize {
    Bytes(u64),
    Text(String),
}

impl ByteSize {
    /// Resolve to a byte count; `field` names the setting in errors
    pub fn to_bytes(&self, field: &str) -> ConfigResult<u64> {
        match self {
            ByteSize::Bytes(bytes) => Ok(*bytes),
            ByteSize::Text(text) => parse_byte_size(text).ok_or_else(|| HoardError::ConfigValidation {
                field: field.to_string(),
                reason: format!("'{}' is not a byte size (try 1048576, \"512KB\" or \"2GiB\")", text),
            }),
        }
    }
}

/// Parse "1024", "512KB", "1.5 GiB" and similar
pub fn parse_byte_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().ok()?;
    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "tb" => 1_000_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        _ => return None,
    };
    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return None;
    }
    Some(bytes.round() as u64)
}

impl HoardToml {
    /// Cap in bytes, `None` for unlimited
    pub fn maximum_pool_size(&self) -> ConfigResult<Option<u64>> {
        self.pool
            .maximum_size
            .as_ref()
            .map(|size| size.to_bytes("pool.maximum_size"))
            .transpose()
    }

    pub fn reserved_free_space(&self) -> ConfigResult<u64> {
        Ok(self
            .pool
            .reserved_free_space
            .as_ref()
            .map(|size| size.to_bytes("pool.reserved_free_space"))
            .transpose()?
            .unwrap_or(0))
    }

    /// Fetch options with unset fields at their defaults
    pub fn fetch_options(&self) -> ConfigResult<FetchOptions> {
        let defaults = FetchOptions::default();
        let fetch = &self.fetch;
        let options = FetchOptions {
            progress_interval: fetch
                .progress_interval
                .map(progress_interval)
                .transpose()?
                .unwrap_or(defaults.progress_interval),
            file_retry_count: fetch.file_retry_count.unwrap_or(defaults.file_retry_count),
            minimum_transfer_rate: fetch
                .minimum_transfer_rate
                .as_ref()
                .map(|rate| MinimumTransferRate::new(rate.bytes_per_second, rate.period_in_seconds)),
            max_concurrent_transfers: fetch
                .max_concurrent_transfers
                .unwrap_or(defaults.max_concurrent_transfers),
            retry: fetch
                .retry
                .as_ref()
                .map(|retry| RetryPolicy {
                    initial_delay: Duration::from_millis(retry.initial_delay_ms),
                    max_delay: Duration::from_millis(retry.max_delay_ms),
                    multiplier: retry.multiplier,
                })
                .unwrap_or(defaults.retry),
        };
        options.validate()?;
        Ok(options)
    }
}

/// Seconds as a Duration; rejects negative, non-finite and overflowing values
fn progress_interval(seconds: f64) -> ConfigResult<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|e| HoardError::ConfigValidation {
        field: "fetch.progress_interval".to_string(),
        reason: format!("must be a number of seconds, 0 or more ({})", e),
    })
}

/// Parse TOML string to HoardToml configuration
pub fn parse_hoard_toml(content: &str) -> ConfigResult<HoardToml> {
    let config: HoardToml = ::toml::from_str(content).map_err(|e| HoardError::TomlParse {
        message: format!("TOML parsing error: {}", e),
    })?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize HoardToml to TOML string
pub fn serialize_hoard_toml(config: &HoardToml) -> ConfigResult<String> {
    ::toml::to_string_pretty(config).map_err(|e| HoardError::TomlParse {
        message: format!("TOML serialization error: {}", e),
    })
}

/// Validate value ranges
pub fn validate_config(config: &HoardToml) -> ConfigResult<()> {
    if let Some(path) = &config.pool.path {
        if path.as_str().is_empty() {
            return Err(HoardError::ConfigValidation {
                field: "pool.path".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
    }
    config.maximum_pool_size()?;
    config.reserved_free_space()?;

    config.fetch_options()?;
    Ok(())
}

/// Load and parse hoard.toml from file path
pub async fn load_from_file(path: &camino::Utf8Path) -> ConfigResult<HoardToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HoardError::io(format!("Failed to read {}", path), e))?;

    parse_hoard_toml(&content).map_err(|e| match e {
        HoardError::TomlParse { message } => HoardError::TomlParse {
            message: format!("In file {}: {}", path, message),
        },
        HoardError::ConfigValidation { field, reason } => HoardError::ConfigValidation {
            field,
            reason: format!("{} (in {})", reason, path),
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_empty_config() {
        let config = parse_hoard_toml("").unwrap();
        assert_eq!(config, HoardToml::default());
        assert_eq!(config.maximum_pool_size().unwrap(), None);
        assert_eq!(config.reserved_free_space().unwrap(), 0);
        assert_eq!(config.fetch_options().unwrap(), FetchOptions::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[pool]
path = "/var/lib/hoard"
maximum_size = "512MiB"
reserved_free_space = 104857600

[fetch]
progress_interval = 0.5
file_retry_count = 5
max_concurrent_transfers = 2

[fetch.minimum_transfer_rate]
bytes_per_second = 4096
period_in_seconds = 30

[fetch.retry]
initial_delay_ms = 250
"#;
        let config = parse_hoard_toml(toml).unwrap();
        assert_eq!(config.pool.path.as_deref(), Some(camino::Utf8Path::new("/var/lib/hoard")));
        assert_eq!(config.maximum_pool_size().unwrap(), Some(512 * 1024 * 1024));
        assert_eq!(config.reserved_free_space().unwrap(), 104_857_600);

        let options = config.fetch_options().unwrap();
        assert_eq!(options.progress_interval, Duration::from_millis(500));
        assert_eq!(options.file_retry_count, 5);
        assert_eq!(options.max_concurrent_transfers, 2);
        assert_eq!(
            options.minimum_transfer_rate,
            Some(MinimumTransferRate::new(4096, 30))
        );
        assert_eq!(options.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(options.retry.max_delay, RetryPolicy::default().max_delay);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_rate = r#"
[fetch.minimum_transfer_rate]
bytes_per_second = 0
period_in_seconds = 10
"#;
        assert!(matches!(
            parse_hoard_toml(bad_rate),
            Err(HoardError::ConfigValidation { .. })
        ));

        let bad_size = "[pool]\nmaximum_size = \"lots\"\n";
        assert!(matches!(
            parse_hoard_toml(bad_size),
            Err(HoardError::ConfigValidation { field, .. }) if field == "pool.maximum_size"
        ));

        let bad_interval = "[fetch]\nprogress_interval = -1.0\n";
        assert!(parse_hoard_toml(bad_interval).is_err());

        let huge_interval = "[fetch]\nprogress_interval = 1e30\n";
        assert!(matches!(
            parse_hoard_toml(huge_interval),
            Err(HoardError::ConfigValidation { field, .. }) if field == "fetch.progress_interval"
        ));

        assert!(matches!(
            parse_hoard_toml("[pool\n"),
            Err(HoardError::TomlParse { .. })
        ));
    }

    #[test]
    fn test_byte_size_units() {
        assert_eq!(parse_byte_size("1024"), Some(1024));
        assert_eq!(parse_byte_size("2KB"), Some(2000));
        assert_eq!(parse_byte_size("2 KiB"), Some(2048));
        assert_eq!(parse_byte_size("1.5gb"), Some(1_500_000_000));
        assert_eq!(parse_byte_size("12 parsecs"), None);
        assert_eq!(parse_byte_size(""), None);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut config = HoardToml::default();
        config.pool.maximum_size = Some(ByteSize::Text("1GB".to_string()));
        config.fetch.file_retry_count = Some(2);
        let text = serialize_hoard_toml(&config).unwrap();
        assert_eq!(parse_hoard_toml(&text).unwrap(), config);
    }

    proptest! {
        #[test]
        fn plain_byte_counts_parse(bytes in 0u64..(1u64 << 52)) {
            prop_assert_eq!(parse_byte_size(&bytes.to_string()), Some(bytes));
        }
    }
}
