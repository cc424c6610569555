use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Sentinel configuration, deserialized from `SENTINEL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// Root of all sentinel state. Resolved to `$HOME/.agentcoin-fun` when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Coordinator base URL (HTTP endpoints and event connection).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Public key (compressed SEC1, hex) that admin commands must be signed with.
    #[serde(default = "default_admin_public_key")]
    pub admin_public_key: String,

    /// Repository deployed when no state has been persisted yet.
    #[serde(default = "default_repository_url")]
    pub default_repository_url: String,

    #[serde(default = "default_branch")]
    pub default_branch: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Interval between checks for the provisioning record.
    #[serde(default = "default_provision_poll_secs")]
    pub provision_poll_secs: u64,

    /// Dependency install step, run inside each build directory.
    #[serde(default = "default_install_command")]
    pub install_command: String,

    #[serde(default = "default_build_command")]
    pub build_command: String,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Consecutive failed connection attempts before giving up; unbounded when unset.
    #[serde(default)]
    pub reconnect_max_attempts: Option<u32>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://host.docker.internal:6900".to_string()
}

fn default_admin_public_key() -> String {
    "02ef90c742e3a447ceec17330d4eccedf8b604487b0cda150c3e1babcbd4076967".to_string()
}

fn default_repository_url() -> String {
    "https://github.com/tribes-protocol/agent.git".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_provision_poll_secs() -> u64 {
    10
}

fn default_install_command() -> String {
    "bun i".to_string()
}

fn default_build_command() -> String {
    "bun run build".to_string()
}

fn default_reconnect_initial_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    5000
}

fn default_connect_timeout_secs() -> u64 {
    20
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            api_url: default_api_url(),
            admin_public_key: default_admin_public_key(),
            default_repository_url: default_repository_url(),
            default_branch: default_branch(),
            poll_interval_secs: default_poll_interval_secs(),
            provision_poll_secs: default_provision_poll_secs(),
            install_command: default_install_command(),
            build_command: default_build_command(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            reconnect_max_attempts: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Reconnection parameters for the coordinator event connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSettings {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl SentinelConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn provision_poll_interval(&self) -> Duration {
        Duration::from_secs(self.provision_poll_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn reconnect(&self) -> ReconnectSettings {
        ReconnectSettings {
            initial_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms)),
            max_attempts: self.reconnect_max_attempts,
        }
    }
}

/// File locations under the sentinel data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelPaths {
    pub root: PathBuf,
    pub provision_file: PathBuf,
    pub character_file: PathBuf,
    pub env_file: PathBuf,
    pub keypair_file: PathBuf,
    pub git_state_file: PathBuf,
    /// Symlink pointing at the live build.
    pub code_dir: PathBuf,
    pub builds_dir: PathBuf,
    pub knowledge_dir: PathBuf,
    pub runtime_socket: PathBuf,
}

impl SentinelPaths {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            provision_file: root.join("agent-provision.json"),
            character_file: root.join("character.json"),
            env_file: root.join("env.production"),
            keypair_file: root.join("agent-keypair.json"),
            git_state_file: root.join("agent-git.json"),
            code_dir: root.join("code"),
            builds_dir: root.join("builds"),
            knowledge_dir: root.join("knowledge"),
            runtime_socket: root.join("runtime-server.sock"),
        }
    }
}
