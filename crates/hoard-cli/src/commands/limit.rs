//! `hoard limit` command implementation.
//!
//! Applies a new byte cap right away, evicting least recently used blobs
//! down to it, then records the cap in hoard.toml so later runs keep it.

use camino::Utf8PathBuf;
use hoard_config::{load_from_file, serialize_hoard_toml, ByteSize, ConfigLoader, HoardToml, CONFIG_FILE};
use hoard_core::{HoardError, HoardResult};
use hoard_pool::PoolStore;
use tracing::debug;

use super::CommandContext;
use crate::output::format_bytes;

/// Execute the `hoard limit` command
pub async fn execute(
    maximum_size: String,
    reserve: Option<String>,
    ctx: &CommandContext,
) -> anyhow::Result<()> {
    let maximum_size = ByteSize::Text(maximum_size);
    let cap = maximum_size.to_bytes("maximum_size")?;
    let reserve = reserve.map(ByteSize::Text);
    let floor = match &reserve {
        Some(size) => size.to_bytes("reserve")?,
        None => ctx.config.reserved_free_space()?,
    };

    // The configured cap is not applied first; only the new one counts
    let store = PoolStore::open(&ctx.pool_path)?;
    store.reserve_storage(floor);
    let report = store.set_maximum_pool_size(cap)?;
    let usage = store.usage();
    store.close()?;

    if report.evicted_blobs > 0 {
        ctx.output.info(&format!(
            "Evicted {} blob(s), freed {}: {}",
            report.evicted_blobs,
            format_bytes(report.freed_bytes),
            report.assets.join(", ")
        ));
    }

    let path = save_limits(ctx, maximum_size, reserve).await?;
    ctx.output.success(&format!(
        "Pool capped at {} (using {}), saved to {}",
        format_bytes(cap),
        format_bytes(usage),
        path
    ));
    Ok(())
}

/// Write the limits into the nearest hoard.toml, creating one in the
/// working directory when none exists
async fn save_limits(
    ctx: &CommandContext,
    maximum_size: ByteSize,
    reserve: Option<ByteSize>,
) -> HoardResult<Utf8PathBuf> {
    let path = ConfigLoader::new(ctx.cwd.clone())
        .resolve_config_path()
        .unwrap_or_else(|| ctx.cwd.join(CONFIG_FILE));

    // Read the file as written so relative paths stay relative
    let mut config = if path.is_file() {
        load_from_file(&path).await?
    } else {
        HoardToml::default()
    };
    config.pool.maximum_size = Some(maximum_size);
    if let Some(reserve) = reserve {
        config.pool.reserved_free_space = Some(reserve);
    }

    let text = serialize_hoard_toml(&config)?;
    tokio::fs::write(&path, text)
        .await
        .map_err(|e| HoardError::io(format!("Failed to write {}", path), e))?;
    debug!("Saved pool limits to {}", path);
    Ok(path)
}
