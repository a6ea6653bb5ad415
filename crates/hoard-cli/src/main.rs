//! # hoard-cli
//!
//! Command-line front end for the Hoard asset pool.
//!
//! Parses arguments, sets up logging and the panic hook, loads layered
//! configuration and dispatches to the command handlers.

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use hoard_core::HoardError;
use std::collections::HashMap;
use std::process::ExitCode;
use tracing::{debug, error};

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Content-addressed asset pool for storage-constrained devices
#[derive(Parser)]
#[command(name = "hoard", version, about = "Fetch, verify and keep remote assets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Pool directory (overrides pool.path)
    #[arg(long, global = true, value_name = "DIR")]
    pub pool: Option<Utf8PathBuf>,

    /// Pool byte cap for this run, e.g. 512MB (overrides pool.maximum_size)
    #[arg(long, global = true, value_name = "SIZE")]
    pub maximum_size: Option<String>,

    /// Device free-space floor for this run (overrides pool.reserved_free_space)
    #[arg(long, global = true, value_name = "SIZE")]
    pub reserved_free_space: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download every asset of a JSON asset list into the pool
    Fetch(FetchArgs),
    /// Show pool usage, limits and entries
    Status {
        /// Also report readiness of the assets in this list
        #[arg(long, value_name = "FILE")]
        list: Option<Utf8PathBuf>,
    },
    /// Print the pool path of a ready asset
    Path { name: String },
    /// Copy assets of a list out of the pool into a directory
    Realize {
        list: Utf8PathBuf,
        #[arg(long, value_name = "DIR")]
        target: Utf8PathBuf,
    },
    /// Set the pool byte cap, evict down to it and save it to hoard.toml
    Limit {
        /// Cap such as 2GiB
        maximum_size: String,
        /// Device free-space floor to save alongside the cap
        #[arg(long, value_name = "SIZE")]
        reserve: Option<String>,
    },
    /// Protect the assets of a list under a tag that survives restarts
    Protect {
        list: Utf8PathBuf,
        #[arg(long)]
        tag: String,
    },
    /// Release every asset held by a tag
    Unprotect { tag: String },
    /// Evict every unprotected blob
    Evict,
    /// Remove one asset from the pool
    Remove { name: String },
    /// Re-hash every pool entry and report mismatches
    Verify {
        /// Remove entries whose bytes no longer match
        #[arg(long)]
        repair: bool,
    },
    /// Rebuild the index by rescanning the blob directory
    Rebuild,
}

#[derive(Args)]
pub struct FetchArgs {
    /// JSON array of asset descriptors
    pub list: Utf8PathBuf,

    /// Keep the fetched assets protected under this tag after exit
    #[arg(long, value_name = "TAG")]
    pub protect: Option<String>,

    /// Attempts per asset beyond the first (overrides fetch.file_retry_count)
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Parallel transfers (overrides fetch.max_concurrent_transfers)
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Minimum rate as <bytes_per_second>/<period_in_seconds>
    #[arg(long, value_name = "RATE")]
    pub minimum_rate: Option<String>,
}

impl Cli {
    /// Flags that override configuration, keyed by setting name
    fn config_overrides(&self) -> HashMap<String, String> {
        let mut overrides = HashMap::new();
        if let Some(pool) = &self.pool {
            overrides.insert("pool_path".to_string(), pool.to_string());
        }
        if let Some(size) = &self.maximum_size {
            overrides.insert("maximum_size".to_string(), size.clone());
        }
        if let Some(size) = &self.reserved_free_space {
            overrides.insert("reserved_free_space".to_string(), size.clone());
        }
        if let Commands::Fetch(args) = &self.command {
            if let Some(retries) = args.retries {
                overrides.insert("file_retry_count".to_string(), retries.to_string());
            }
            if let Some(concurrency) = args.concurrency {
                overrides.insert("max_concurrent_transfers".to_string(), concurrency.to_string());
            }
            if let Some(rate) = &args.minimum_rate {
                overrides.insert("minimum_rate".to_string(), rate.clone());
            }
        }
        overrides
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    debug!("Starting hoard v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let formatter = ErrorFormatter::new();
            match e.downcast_ref::<HoardError>() {
                Some(hoard_error) => eprintln!("{}", formatter.format_error(hoard_error)),
                None => eprintln!("{}", formatter.format_simple(&format!("{:#}", e))),
            }
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = cli.config_overrides();
    let ctx = CommandContext::load(overrides, cli.json).await?;
    commands::dispatch_command(cli.command, &ctx).await
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "hoard={level},hoard_core={level},hoard_pool={level},hoard_fetch={level},hoard_config={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("hoard encountered an unexpected error: {}", panic_info);
        eprintln!("hoard crashed! This is a bug.");
        eprintln!("Please report this at: https://github.com/hoard-rs/hoard/issues");
        eprintln!("Error: {}", panic_info);
    }));
}
