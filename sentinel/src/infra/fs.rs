//! Filesystem infrastructure: build directories, the live `code` link and
//! the runtime's character and env files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sentinel_common::{Character, SentinelPaths};

use crate::application::ports::{CheckoutLayout, ConfigFiles};
use crate::domain::deploy::build_dir_name;
use crate::infra::state::write_atomic;

/// Builds live under `builds/<hash>`; `code` is a symlink to the live one.
pub struct LocalLayout {
    builds_dir: PathBuf,
    code_link: PathBuf,
    env_file: PathBuf,
}

impl LocalLayout {
    #[must_use]
    pub fn new(paths: &SentinelPaths) -> Self {
        Self {
            builds_dir: paths.builds_dir.clone(),
            code_link: paths.code_dir.clone(),
            env_file: paths.env_file.clone(),
        }
    }
}

async fn blocking<T, F>(what: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .with_context(|| format!("{what} task panicked"))?
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path)
            .with_context(|| format!("removing directory {}", path.display())),
        Ok(_) => std::fs::remove_file(path)
            .with_context(|| format!("removing file {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("inspecting {}", path.display())),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("linking {} -> {}", link.display(), target.display()))
}

#[cfg(not(unix))]
fn symlink(_target: &Path, link: &Path) -> Result<()> {
    anyhow::bail!("symlinks are not supported here ({})", link.display())
}

#[async_trait]
impl CheckoutLayout for LocalLayout {
    fn build_dir(&self, repository_url: &str, commit: &str) -> PathBuf {
        self.builds_dir.join(build_dir_name(repository_url, commit))
    }

    async fn live_target(&self) -> Result<Option<PathBuf>> {
        let link = self.code_link.clone();
        blocking("read live link", move || match std::fs::read_link(&link) {
            Ok(target) if target.exists() => Ok(Some(target)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading link {}", link.display())),
        })
        .await
    }

    async fn prepare_build_dir(&self, dir: &Path) -> Result<()> {
        let builds = self.builds_dir.clone();
        let dir = dir.to_path_buf();
        blocking("prepare build dir", move || {
            std::fs::create_dir_all(&builds)
                .with_context(|| format!("creating {}", builds.display()))?;
            remove_if_present(&dir)
        })
        .await
    }

    async fn link_env_file(&self, dir: &Path) -> Result<()> {
        let env_file = self.env_file.clone();
        let link = dir.join(".env");
        blocking("link env file", move || {
            remove_if_present(&link)?;
            symlink(&env_file, &link)
        })
        .await
    }

    async fn repoint_live(&self, dir: &Path) -> Result<()> {
        let link = self.code_link.clone();
        let target = dir.to_path_buf();
        blocking("repoint live link", move || {
            // New link beside the old one, then rename over it.
            let mut staged = link.as_os_str().to_owned();
            staged.push(".next");
            let staged = PathBuf::from(staged);
            remove_if_present(&staged)?;
            symlink(&target, &staged)?;
            std::fs::rename(&staged, &link)
                .with_context(|| format!("swapping {}", link.display()))
        })
        .await
    }

    async fn remove_build_dir(&self, dir: &Path) -> Result<()> {
        let dir = dir.to_path_buf();
        blocking("remove build dir", move || remove_if_present(&dir)).await
    }
}

/// Character and env files under the data directory.
pub struct LocalConfigFiles {
    character_file: PathBuf,
    env_file: PathBuf,
}

impl LocalConfigFiles {
    #[must_use]
    pub fn new(paths: &SentinelPaths) -> Self {
        Self {
            character_file: paths.character_file.clone(),
            env_file: paths.env_file.clone(),
        }
    }
}

#[async_trait]
impl ConfigFiles for LocalConfigFiles {
    async fn write_character(&self, character: &Character) -> Result<()> {
        let content = serde_json::to_vec_pretty(character).context("serializing character")?;
        let path = self.character_file.clone();
        blocking("write character", move || write_atomic(&path, &content)).await
    }

    async fn write_env(&self, contents: &str) -> Result<()> {
        let content = contents.as_bytes().to_vec();
        let path = self.env_file.clone();
        blocking("write env", move || write_atomic(&path, &content)).await
    }
}
