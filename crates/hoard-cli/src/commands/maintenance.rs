//! Pool upkeep: `evict`, `remove`, `verify` and `rebuild`.

use anyhow::bail;
use hoard_core::HoardError;
use hoard_pool::{PoolOptions, PoolStore};
use serde_json::json;
use tracing::warn;

use super::{close_pool, CommandContext};
use crate::output::format_bytes;

/// Evict every unprotected blob
pub async fn evict(ctx: &CommandContext) -> anyhow::Result<()> {
    let store = ctx.open_pool()?;
    let report = store.evict_unprotected()?;
    close_pool(store)?;

    if ctx.output.is_json() {
        ctx.output.json_line(&json!({
            "evicted_blobs": report.evicted_blobs,
            "freed_bytes": report.freed_bytes,
            "assets": report.assets,
        }));
    } else {
        ctx.output.success(&format!(
            "Evicted {} blob(s), freed {}",
            report.evicted_blobs,
            format_bytes(report.freed_bytes)
        ));
    }
    Ok(())
}

/// Remove one named asset
pub async fn remove(name: &str, ctx: &CommandContext) -> anyhow::Result<()> {
    let store = ctx.open_pool()?;
    let result = store.remove_asset(name);
    close_pool(store)?;
    result?;
    ctx.output.success(&format!("Removed '{}'", name));
    Ok(())
}

/// Re-hash every entry; with `repair`, drop the ones that no longer match
pub async fn verify(repair: bool, ctx: &CommandContext) -> anyhow::Result<()> {
    let store = ctx.open_pool()?;
    let entries = store.entries();
    let mut damaged = Vec::new();
    for entry in &entries {
        match store.verify_asset(&entry.name) {
            Ok(true) => {}
            Ok(false) => damaged.push(entry.name.clone()),
            // Missing blob file
            Err(HoardError::Io { .. }) => damaged.push(entry.name.clone()),
            Err(e) => return Err(e.into()),
        }
    }

    let mut removed = Vec::new();
    if repair {
        for name in &damaged {
            match store.remove_asset(name) {
                Ok(()) => removed.push(name.clone()),
                Err(e) => warn!("Could not remove '{}': {}", name, e),
            }
        }
    }
    close_pool(store)?;

    if ctx.output.is_json() {
        ctx.output.json_line(&json!({
            "checked": entries.len(),
            "damaged": damaged,
            "removed": removed,
        }));
    } else {
        for name in &damaged {
            let note = if removed.contains(name) { " (removed)" } else { "" };
            ctx.output.warn(&format!("'{}' does not match its digest{}", name, note));
        }
    }

    if damaged.len() > removed.len() {
        bail!(
            "{} of {} asset(s) failed verification",
            damaged.len() - removed.len(),
            entries.len()
        );
    }
    ctx.output.success(&format!("Verified {} asset(s)", entries.len()));
    Ok(())
}

/// Rebuild the index from the blob directory
pub async fn rebuild(ctx: &CommandContext) -> anyhow::Result<()> {
    let pool_path = ctx.pool_path.clone();
    let store =
        tokio::task::spawn_blocking(move || PoolStore::rebuild(&pool_path, PoolOptions::default()))
            .await??;
    let stats = store.stats();
    store.close()?;

    ctx.output.success(&format!(
        "Rebuilt index: {} unnamed blob(s), {} total; fetch the asset lists again to re-link names",
        stats.orphan_count,
        format_bytes(stats.usage)
    ));
    Ok(())
}
