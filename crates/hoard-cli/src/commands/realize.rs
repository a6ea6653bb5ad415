//! `hoard realize` command implementation.

use camino::Utf8Path;
use hoard_pool::{RealizeOutcome, Realizer};
use serde_json::json;

use super::{close_pool, CommandContext};
use crate::output::format_bytes;

/// Execute the `hoard realize` command
pub async fn execute(list: &Utf8Path, target: &Utf8Path, ctx: &CommandContext) -> anyhow::Result<()> {
    let assets = ctx.read_asset_list(list).await?;
    let store = ctx.open_pool()?;
    let realizer = Realizer::new(store.clone(), ctx.resolve(target));

    // Copies are blocking filesystem work
    let report = tokio::task::spawn_blocking(move || realizer.realize(&assets)).await?;
    close_pool(store)?;
    let report = report?;

    if ctx.output.is_json() {
        for file in &report.files {
            let (outcome, bytes) = match file.outcome {
                RealizeOutcome::Copied { bytes } => ("copied", bytes),
                RealizeOutcome::UpToDate => ("up_to_date", 0),
            };
            ctx.output.json_line(&json!({
                "name": file.name,
                "path": file.path,
                "outcome": outcome,
                "bytes": bytes,
            }));
        }
        return Ok(());
    }

    for file in &report.files {
        match file.outcome {
            RealizeOutcome::Copied { bytes } => ctx
                .output
                .info(&format!("{} -> {} ({})", file.name, file.path, format_bytes(bytes))),
            RealizeOutcome::UpToDate => ctx.output.info(&format!("{} is up to date", file.path)),
        }
    }
    ctx.output.success(&format!(
        "Realized {} file(s): {} copied ({}), {} up to date",
        report.files.len(),
        report.files_copied,
        format_bytes(report.bytes_copied),
        report.files_up_to_date
    ));
    Ok(())
}
