//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking the shared `CommandContext`,
//! which carries the merged configuration and the resolved pool path.

use camino::{Utf8Path, Utf8PathBuf};
use hoard_config::{default_pool_path, ConfigLoader, ConfigSource, HoardToml};
use hoard_core::{AssetDescriptor, HoardError, HoardResult};
use hoard_pool::PoolStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub mod fetch;
pub mod limit;
pub mod maintenance;
pub mod protect;
pub mod realize;
pub mod status;


use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub config: HoardToml,
    pub source: ConfigSource,
    pub pool_path: Utf8PathBuf,
    pub output: OutputHandler,
}

impl CommandContext {
    /// Load configuration for the current directory
    pub async fn load(overrides: HashMap<String, String>, json: bool) -> HoardResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| HoardError::io("Failed to get current directory".to_string(), e))?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| {
            HoardError::io(
                "Current directory is not valid UTF-8".to_string(),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            )
        })?;
        Self::for_directory(cwd, overrides, OutputHandler::new(json)).await
    }

    /// Load configuration as seen from `cwd`
    pub async fn for_directory(
        cwd: Utf8PathBuf,
        overrides: HashMap<String, String>,
        output: OutputHandler,
    ) -> HoardResult<Self> {
        let (config, source) = ConfigLoader::new(cwd.clone()).load(overrides).await?;
        let pool_path = match &config.pool.path {
            Some(path) => cwd.join(path),
            None => default_pool_path()?,
        };
        debug!("Configuration from {:?}, pool at {}", source, pool_path);

        Ok(Self {
            cwd,
            config,
            source,
            pool_path,
            output,
        })
    }

    /// Resolve a command-line path against the working directory
    pub fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.cwd.join(path)
    }

    /// Open the pool and apply the configured limits
    pub fn open_pool(&self) -> HoardResult<Arc<PoolStore>> {
        let store = PoolStore::open(&self.pool_path)?;
        self.apply_limits(&store)?;
        Ok(Arc::new(store))
    }

    pub fn apply_limits(&self, store: &PoolStore) -> HoardResult<()> {
        store.reserve_storage(self.config.reserved_free_space()?);
        if let Some(maximum) = self.config.maximum_pool_size()? {
            let report = store.set_maximum_pool_size(maximum)?;
            if report.evicted_blobs > 0 {
                self.output.info(&format!(
                    "Evicted {} blob(s) to fit the {} byte cap",
                    report.evicted_blobs, maximum
                ));
            }
        }
        Ok(())
    }

    /// Read and validate a JSON asset list
    pub async fn read_asset_list(&self, path: &Utf8Path) -> HoardResult<Vec<AssetDescriptor>> {
        let path = self.resolve(path);
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| HoardError::io(format!("Failed to read asset list {}", path), e))?;
        AssetDescriptor::parse_collection(&json)
    }
}

/// Release session protections and flush the index. A store still shared
/// elsewhere is left to flush on drop.
pub fn close_pool(store: Arc<PoolStore>) -> HoardResult<()> {
    match Arc::try_unwrap(store) {
        Ok(store) => store.close(),
        Err(_) => Ok(()),
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> anyhow::Result<()> {
    match command {
        Commands::Fetch(args) => {
            info!("Fetching assets from {}", args.list);
            fetch::execute(args, ctx).await
        }
        Commands::Status { list } => status::execute(list, ctx).await,
        Commands::Path { name } => status::path(&name, ctx).await,
        Commands::Realize { list, target } => {
            info!("Realizing {} into {}", list, target);
            realize::execute(&list, &target, ctx).await
        }
        Commands::Limit {
            maximum_size,
            reserve,
        } => {
            info!("Setting pool cap to {}", maximum_size);
            limit::execute(maximum_size, reserve, ctx).await
        }
        Commands::Protect { list, tag } => protect::protect(&list, &tag, ctx).await,
        Commands::Unprotect { tag } => protect::unprotect(&tag, ctx).await,
        Commands::Evict => maintenance::evict(ctx).await,
        Commands::Remove { name } => maintenance::remove(&name, ctx).await,
        Commands::Verify { repair } => maintenance::verify(repair, ctx).await,
        Commands::Rebuild => maintenance::rebuild(ctx).await,
    }
}
