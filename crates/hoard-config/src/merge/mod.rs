//! Configuration layering, fallback logic, and environment overrides

use camino::{Utf8Path, Utf8PathBuf};
use hoard_core::error::HoardError;
use std::collections::HashMap;
use tracing::debug;

use crate::toml::{ByteSize, HoardToml, RateSection};
use crate::ConfigResult;

pub const CONFIG_FILE: &str = "hoard.toml";
const ENV_PREFIX: &str = "HOARD_";

/// Main configuration loading interface
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration layering and merging
#[derive(Debug, Default)]
pub struct ConfigLayering;

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Project hoard.toml file
    ProjectToml(Utf8PathBuf),
    /// Global config file
    Global(Utf8PathBuf),
    /// Built-in defaults
    Defaults,
}

/// Pool directory used when no configuration names one
pub fn default_pool_path() -> ConfigResult<Utf8PathBuf> {
    let cache_dir = dirs::cache_dir().ok_or_else(|| HoardError::ConfigValidation {
        field: "pool.path".to_string(),
        reason: "Could not determine a cache directory; set pool.path or HOARD_POOL_PATH".to_string(),
    })?;
    let cache_dir = Utf8PathBuf::try_from(cache_dir).map_err(|e| HoardError::ConfigValidation {
        field: "pool.path".to_string(),
        reason: format!("Invalid cache directory path: {}", e),
    })?;
    Ok(cache_dir.join("hoard").join("pool"))
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Find hoard.toml here or in a parent directory
    pub fn resolve_config_path(&self) -> Option<Utf8PathBuf> {
        self.cwd
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|path| path.is_file())
    }

    /// Load the project configuration, falling back to the global file and then defaults
    pub async fn load_project_config(&self) -> ConfigResult<(HoardToml, ConfigSource)> {
        if let Some(path) = self.resolve_config_path() {
            debug!("Using configuration {}", path);
            let config = load_resolving_paths(&path).await?;
            return Ok((config, ConfigSource::ProjectToml(path)));
        }

        if let Some(path) = global_config_path().filter(|path| path.is_file()) {
            debug!("Using global configuration {}", path);
            let config = load_resolving_paths(&path).await?;
            return Ok((config, ConfigSource::Global(path)));
        }

        Ok((HoardToml::default(), ConfigSource::Defaults))
    }

    /// Load configuration with every override layer applied
    pub async fn load(
        &self,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<(HoardToml, ConfigSource)> {
        let (config, source) = self.load_project_config().await?;
        let merged = ConfigLayering::merge_configs(
            config,
            ConfigLayering::collect_env_overrides(),
            cli_overrides,
        )?;
        Ok((merged, source))
    }
}

fn global_config_path() -> Option<Utf8PathBuf> {
    let dir = dirs::config_dir()?;
    Utf8PathBuf::try_from(dir)
        .ok()
        .map(|dir| dir.join("hoard").join("config.toml"))
}

/// Parse a file and anchor a relative pool path at the file's directory
async fn load_resolving_paths(path: &Utf8Path) -> ConfigResult<HoardToml> {
    let mut config = crate::toml::load_from_file(path).await?;
    if let (Some(pool_path), Some(dir)) = (config.pool.path.as_mut(), path.parent()) {
        if pool_path.is_relative() {
            *pool_path = dir.join(&*pool_path);
        }
    }
    Ok(config)
}

impl ConfigLayering {
    /// Apply environment overrides, then CLI overrides (highest priority), then re-validate
    pub fn merge_configs(
        config: HoardToml,
        env_overrides: HashMap<String, String>,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<HoardToml> {
        let mut merged = config;

        for (key, value) in &env_overrides {
            if let Some(setting) = key.strip_prefix(ENV_PREFIX) {
                Self::apply_override(&mut merged, &setting.to_ascii_lowercase(), value, key)?;
            }
        }
        for (key, value) in &cli_overrides {
            Self::apply_override(&mut merged, key, value, &format!("--{}", key.replace('_', "-")))?;
        }

        crate::toml::validate_config(&merged)?;
        Ok(merged)
    }

    /// Set one named setting; `origin` names the override in errors. Unknown names are ignored.
    fn apply_override(
        config: &mut HoardToml,
        setting: &str,
        value: &str,
        origin: &str,
    ) -> ConfigResult<()> {
        match setting {
            "pool_path" => config.pool.path = Some(Utf8PathBuf::from(value)),
            "maximum_size" => config.pool.maximum_size = Some(ByteSize::Text(value.to_string())),
            "reserved_free_space" => {
                config.pool.reserved_free_space = Some(ByteSize::Text(value.to_string()))
            }
            "progress_interval" => config.fetch.progress_interval = Some(parse(value, origin)?),
            "file_retry_count" => config.fetch.file_retry_count = Some(parse(value, origin)?),
            "max_concurrent_transfers" => {
                config.fetch.max_concurrent_transfers = Some(parse(value, origin)?)
            }
            "minimum_rate" => {
                config.fetch.minimum_transfer_rate = Some(parse_rate(value, origin)?);
            }
            _ => debug!("Ignoring unknown override {}", origin),
        }
        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }
}

fn parse<T: std::str::FromStr>(value: &str, origin: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| HoardError::ConfigValidation {
        field: origin.to_string(),
        reason: format!("'{}': {}", value, e),
    })
}

/// `<bytes_per_second>/<period_in_seconds>`, e.g. `4096/30`
fn parse_rate(value: &str, origin: &str) -> ConfigResult<RateSection> {
    let (bytes, period) = value.split_once('/').ok_or_else(|| HoardError::ConfigValidation {
        field: origin.to_string(),
        reason: format!("'{}' is not <bytes_per_second>/<period_in_seconds>", value),
    })?;
    Ok(RateSection {
        bytes_per_second: parse(bytes, origin)?,
        period_in_seconds: parse(period, origin)?,
    })
}
