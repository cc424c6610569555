//! Application context: configuration and paths shared by every command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sentinel_common::{SentinelConfig, SentinelPaths};

use crate::infra::coordinator::HttpCoordinator;
use crate::keychain::Keychain;

/// Environment variable prefix for [`SentinelConfig`] fields.
pub const ENV_PREFIX: &str = "SENTINEL_";

/// Data directory name under `$HOME` when `SENTINEL_DATA_DIR` is unset.
const DEFAULT_DATA_DIR: &str = ".agentcoin-fun";

/// Built once in `Cli::run()` and passed to the command handlers.
pub struct AppContext {
    pub config: SentinelConfig,
    pub paths: SentinelPaths,
}

impl AppContext {
    /// Load configuration from `SENTINEL_*` variables and ensure the data
    /// directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable does not parse, the home directory
    /// cannot be determined, or the data directory cannot be created.
    pub fn from_env() -> Result<Self> {
        let config: SentinelConfig = envy::prefixed(ENV_PREFIX)
            .from_env()
            .with_context(|| format!("failed to load config from {ENV_PREFIX}* env vars"))?;
        Self::new(config)
    }

    /// Build the context from `config`. A relative data directory is
    /// resolved against the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be resolved or created.
    pub fn new(config: SentinelConfig) -> Result<Self> {
        let root = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating data directory {}", root.display()))?;
        // Links under the root store their targets verbatim, so the root
        // must not depend on the working directory.
        let root = std::fs::canonicalize(&root)
            .with_context(|| format!("resolving data directory {}", root.display()))?;
        let paths = SentinelPaths::new(&root);
        Ok(Self { config, paths })
    }

    /// Load the agent key pair, generating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the key file cannot be read, parsed or written.
    pub fn keychain(&self) -> Result<Arc<Keychain>> {
        Keychain::load_or_create(&self.paths.keypair_file).map(Arc::new)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn coordinator(&self) -> Result<Arc<HttpCoordinator>> {
        HttpCoordinator::new(&self.config.api_url, self.config.connect_timeout()).map(Arc::new)
    }
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DATA_DIR))
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))
}
