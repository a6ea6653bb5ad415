//! `hoard fetch` command implementation.
//!
//! Protects the collection, downloads whatever the pool is missing and
//! reports each asset as it completes. Ctrl-C cancels the transfers in
//! flight; nothing partial is committed.

use anyhow::bail;
use hoard_fetch::{FetchEvent, Fetcher};
use std::time::Instant;
use tracing::{debug, warn};

use super::{close_pool, CommandContext};
use crate::output::format_bytes;
use crate::output::progress::TransferProgress;
use crate::FetchArgs;

/// Execute the `hoard fetch` command
pub async fn execute(args: FetchArgs, ctx: &CommandContext) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let assets = ctx.read_asset_list(&args.list).await?;
    let options = ctx.config.fetch_options()?;
    let store = ctx.open_pool()?;

    // Keep the collection from evicting itself while it downloads
    match &args.protect {
        Some(tag) => {
            store.protect_assets_persistent(tag, &assets)?;
        }
        None => {
            store.protect_assets(&format!("fetch:{}", args.list), &assets);
        }
    }

    let fetcher = Fetcher::with_http(store.clone())?;
    let mut task = fetcher.start(assets.clone(), options).await?;

    let cancel = task.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling transfers");
            cancel.cancel();
        }
    });

    let mut progress = TransferProgress::new(assets.len(), ctx.output.colors());
    while let Some(event) = task.next_event().await {
        if ctx.output.is_json() {
            match serde_json::to_value(&event) {
                Ok(value) => ctx.output.json_line(&value),
                Err(e) => debug!("Unserializable event: {}", e),
            }
            continue;
        }
        match &event {
            FetchEvent::Progress(progress_event) => progress.update(progress_event),
            FetchEvent::File(file_event) => progress.file_done(file_event),
        }
    }
    progress.finish();

    let summary = task.wait().await?;
    interrupt.abort();

    let ready = store.are_assets_ready(&assets);
    let usage = store.usage();
    drop(fetcher);
    close_pool(store)?;

    if ctx.output.is_json() {
        ctx.output.json_line(&serde_json::json!({
            "event": "summary",
            "succeeded": summary.succeeded,
            "skipped": summary.skipped,
            "failed": summary.failed,
            "cancelled": summary.cancelled,
            "ready": ready,
        }));
    } else {
        ctx.output.info(&format!(
            "{} fetched, {} already present, {} failed in {:.2}s (pool holds {})",
            summary.succeeded,
            summary.skipped,
            summary.failed,
            start_time.elapsed().as_secs_f64(),
            format_bytes(usage)
        ));
    }

    if summary.cancelled {
        bail!("fetch cancelled");
    }
    if !summary.is_complete() || !ready {
        bail!("{} of {} asset(s) could not be fetched", summary.failed, assets.len());
    }
    ctx.output.success(&format!("All {} asset(s) ready", assets.len()));
    Ok(())
}
