//! `hoard status` and `hoard path`.

use camino::Utf8PathBuf;
use hoard_config::ConfigSource;
use hoard_pool::{PathResolver, PoolEntry, PoolStats};
use serde_json::json;

use super::{close_pool, CommandContext};
use crate::output::format_bytes;

/// Execute the `hoard status` command
pub async fn execute(list: Option<Utf8PathBuf>, ctx: &CommandContext) -> anyhow::Result<()> {
    let readiness_list = match &list {
        Some(list) => Some(ctx.read_asset_list(list).await?),
        None => None,
    };

    let store = ctx.open_pool()?;
    let stats = store.stats();
    let entries = store.entries();
    let tags = store.protection_tags();
    let readiness: Option<Vec<(String, bool)>> = readiness_list.map(|assets| {
        assets
            .iter()
            .map(|asset| (asset.name.clone(), store.is_asset_ready(asset)))
            .collect()
    });
    close_pool(store)?;

    if ctx.output.is_json() {
        ctx.output.json_line(&status_json(ctx, &stats, &entries, &tags, readiness.as_deref()));
        return Ok(());
    }

    let colors = ctx.output.colors();
    ctx.output.value(&format!("{} {}", colors.bold("Pool"), ctx.pool_path));
    ctx.output.value(&format!("  config    {}", describe_source(&ctx.source)));
    ctx.output.value(&format!(
        "  usage     {} in {} blob(s), {} asset(s)",
        format_bytes(stats.usage),
        stats.blob_count,
        stats.asset_count
    ));
    ctx.output.value(&format!("  cap       {}", describe_cap(stats.maximum_pool_size)));
    ctx.output.value(&format!(
        "  reserved  {} free on device",
        format_bytes(stats.reserved_free_space)
    ));
    if stats.orphan_count > 0 {
        ctx.output.value(&format!(
            "  orphans   {} blob(s) without a name, evicted first",
            stats.orphan_count
        ));
    }
    if !tags.is_empty() {
        ctx.output.value(&format!("  tags      {}", tags.join(", ")));
    }

    if !entries.is_empty() {
        ctx.output.value("");
        for entry in &entries {
            let marker = if entry.protection_refcount > 0 { "*" } else { " " };
            ctx.output.value(&format!(
                "{} {:<32} {:>10}  {}",
                marker,
                entry.name,
                format_bytes(entry.size),
                colors.dim(&entry.last_accessed.format("%Y-%m-%d %H:%M:%S").to_string())
            ));
        }
    }

    if let Some(readiness) = readiness {
        ctx.output.value("");
        for (name, ready) in &readiness {
            let state = if *ready {
                colors.green("ready")
            } else {
                colors.yellow("missing")
            };
            ctx.output.value(&format!("  {:<32} {}", name, state));
        }
    }
    Ok(())
}

/// Execute the `hoard path` command
pub async fn path(name: &str, ctx: &CommandContext) -> anyhow::Result<()> {
    let store = ctx.open_pool()?;
    let resolver = PathResolver::new(store.clone());
    let path = resolver.get_path(name);
    drop(resolver);
    close_pool(store)?;

    let path = path?;
    if ctx.output.is_json() {
        ctx.output.json_line(&json!({ "name": name, "path": path }));
    } else {
        ctx.output.value(path.as_str());
    }
    Ok(())
}

fn describe_source(source: &ConfigSource) -> String {
    match source {
        ConfigSource::ProjectToml(path) | ConfigSource::Global(path) => path.to_string(),
        ConfigSource::Defaults => "defaults".to_string(),
    }
}

fn describe_cap(maximum_pool_size: u64) -> String {
    if maximum_pool_size == u64::MAX {
        "unlimited".to_string()
    } else {
        format_bytes(maximum_pool_size)
    }
}

fn status_json(
    ctx: &CommandContext,
    stats: &PoolStats,
    entries: &[PoolEntry],
    tags: &[String],
    readiness: Option<&[(String, bool)]>,
) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| {
            json!({
                "name": entry.name,
                "method": entry.hash.method.as_str(),
                "hex": entry.hash.hex,
                "size": entry.size,
                "path": entry.path,
                "last_accessed": entry.last_accessed.to_rfc3339(),
                "protection_refcount": entry.protection_refcount,
            })
        })
        .collect();
    let maximum = (stats.maximum_pool_size != u64::MAX).then_some(stats.maximum_pool_size);

    let mut value = json!({
        "pool": ctx.pool_path,
        "config": describe_source(&ctx.source),
        "usage": stats.usage,
        "blob_count": stats.blob_count,
        "asset_count": stats.asset_count,
        "orphan_count": stats.orphan_count,
        "maximum_pool_size": maximum,
        "reserved_free_space": stats.reserved_free_space,
        "protection_tags": tags,
        "entries": entries,
    });
    if let Some(readiness) = readiness {
        value["ready"] = readiness
            .iter()
            .map(|(name, ready)| (name.clone(), serde_json::Value::Bool(*ready)))
            .collect::<serde_json::Map<_, _>>()
            .into();
    }
    value
}
