//! `hoard protect` and `hoard unprotect`.

use camino::Utf8Path;

use super::{close_pool, CommandContext};

/// Protect every asset of a list under a persistent tag
pub async fn protect(list: &Utf8Path, tag: &str, ctx: &CommandContext) -> anyhow::Result<()> {
    let assets = ctx.read_asset_list(list).await?;
    let store = ctx.open_pool()?;
    let added = store.protect_assets_persistent(tag, &assets)?;
    let missing = assets
        .iter()
        .filter(|asset| !store.is_asset_ready(asset))
        .count();
    close_pool(store)?;

    ctx.output.success(&format!(
        "Tag '{}' protects {} asset(s) ({} newly added)",
        tag,
        assets.len(),
        added
    ));
    if missing > 0 {
        ctx.output.warn(&format!(
            "{} of them are not in the pool yet; run 'hoard fetch {}'",
            missing, list
        ));
    }
    Ok(())
}

/// Release a tag
pub async fn unprotect(tag: &str, ctx: &CommandContext) -> anyhow::Result<()> {
    let store = ctx.open_pool()?;
    let released = store.unprotect_assets(tag)?;
    close_pool(store)?;

    if released.is_empty() {
        ctx.output.info(&format!("Tag '{}' held nothing that is now evictable", tag));
    } else {
        ctx.output.success(&format!(
            "Released tag '{}': {} asset(s) now evictable",
            tag,
            released.len()
        ));
    }
    Ok(())
}
