//! Infrastructure implementations of the `GitStateStore` and `ProvisionStore`
//! ports.
//!
//! Both records are small JSON files. Reads and writes run on
//! `tokio::task::spawn_blocking`; writes go to a temp file that is renamed
//! over the target so a crash never leaves a half-written record.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sentinel_common::{GitState, ProvisionState};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{GitStateStore, ProvisionStore};

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(value))
}

/// Write `content` to `path` via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    std::fs::write(&temp, content)
        .with_context(|| format!("writing temp file {}", temp.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", temp.display()))?;
    }

    std::fs::rename(&temp, path).with_context(|| format!("finalizing {}", path.display()))
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("serializing record")?;
    write_atomic(path, content.as_bytes())
}

async fn load_blocking<T>(path: PathBuf) -> Result<Option<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || load_json(&path))
        .await
        .context("state load task panicked")?
}

async fn save_blocking<T>(path: PathBuf, value: T) -> Result<()>
where
    T: Serialize + Send + 'static,
{
    tokio::task::spawn_blocking(move || save_json(&path, &value))
        .await
        .context("state save task panicked")?
}

/// Persisted desired deployment state (`agent-git.json`).
pub struct GitStateFile {
    path: PathBuf,
}

impl GitStateFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl GitStateStore for GitStateFile {
    async fn load(&self) -> Result<Option<GitState>> {
        load_blocking(self.path.clone()).await
    }

    async fn save(&self, state: &GitState) -> Result<()> {
        save_blocking(self.path.clone(), state.clone()).await
    }
}

/// Provisioning record (`agent-provision.json`).
pub struct ProvisionFile {
    path: PathBuf,
}

impl ProvisionFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ProvisionStore for ProvisionFile {
    async fn load(&self) -> Result<Option<ProvisionState>> {
        load_blocking(self.path.clone()).await
    }

    async fn save(&self, state: &ProvisionState) -> Result<()> {
        save_blocking(self.path.clone(), state.clone()).await
    }
}
