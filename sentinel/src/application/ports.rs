//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces infrastructure must fulfil. Services hold them as
//! `Arc<dyn Port>` so they can run inside spawned tasks and be replaced by
//! test doubles.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};

use anyhow::Result;
use async_trait::async_trait;
use sentinel_common::{
    AuthCredentials, Character, GitState, KnowledgeAction, ProvisionResponse, ProvisionState,
};

// ── Process execution ─────────────────────────────────────────────────────────

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a program and capture its output.
    async fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<Output>;

    /// Run a program with inherited stdio and return only its exit status.
    async fn run_status(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<ExitStatus>;
}

// ── Source control ────────────────────────────────────────────────────────────

#[async_trait]
pub trait GitRepository: Send + Sync {
    /// Tip of `branch` on the remote, without a local checkout.
    async fn latest_commit(&self, repository_url: &str, branch: &str) -> Result<String>;
    /// Fetch `branch` from `origin` into an existing checkout.
    async fn fetch_branch(&self, checkout: &Path, branch: &str) -> Result<()>;
    /// Resolve `rev` to a commit hash inside `checkout`.
    async fn rev_parse(&self, checkout: &Path, rev: &str) -> Result<String>;
    /// Clone without checkout into `dest`, fetch `commit`, and check it out.
    async fn checkout_commit(&self, repository_url: &str, commit: &str, dest: &Path)
    -> Result<()>;
}

// ── On-disk build layout ──────────────────────────────────────────────────────

#[async_trait]
pub trait CheckoutLayout: Send + Sync {
    /// Deterministic build directory for `(repository_url, commit)`.
    fn build_dir(&self, repository_url: &str, commit: &str) -> PathBuf;
    /// Resolved target of the live `code` link, `None` when nothing is deployed.
    async fn live_target(&self) -> Result<Option<PathBuf>>;
    /// Ensure the builds root exists and `dir` does not.
    async fn prepare_build_dir(&self, dir: &Path) -> Result<()>;
    /// Replace `dir/.env` with a symlink to the canonical env file.
    async fn link_env_file(&self, dir: &Path) -> Result<()>;
    /// Point the live `code` link at `dir`.
    async fn repoint_live(&self, dir: &Path) -> Result<()>;
    async fn remove_build_dir(&self, dir: &Path) -> Result<()>;
}

// ── Persistence ───────────────────────────────────────────────────────────────

#[async_trait]
pub trait GitStateStore: Send + Sync {
    /// Load the last applied state, `None` if none was ever saved.
    async fn load(&self) -> Result<Option<GitState>>;
    async fn save(&self, state: &GitState) -> Result<()>;
}

/// Provisioning record shared with the provisioning flow.
#[async_trait]
pub trait ProvisionStore: Send + Sync {
    /// `None` until the agent has been provisioned.
    async fn load(&self) -> Result<Option<ProvisionState>>;
    async fn save(&self, state: &ProvisionState) -> Result<()>;
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn record(&self, source: &str, filename: &str, action: KnowledgeAction) -> Result<()>;
}

/// Character and env files read by the agent runtime. Both are replaced wholesale.
#[async_trait]
pub trait ConfigFiles: Send + Sync {
    async fn write_character(&self, character: &Character) -> Result<()>;
    async fn write_env(&self, contents: &str) -> Result<()>;
}

// ── Sibling runtime ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCommand {
    /// A new git deployment is live.
    Git,
    /// Character or env files changed.
    CharacterAndEnvVars,
}

impl RuntimeCommand {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::CharacterAndEnvVars => "character_n_envvars",
        }
    }
}

#[async_trait]
pub trait RuntimeNotifier: Send + Sync {
    async fn notify(&self, command: RuntimeCommand) -> Result<()>;
}

// ── Identity and coordinator ──────────────────────────────────────────────────

pub trait Signer: Send + Sync {
    /// Compressed SEC1 public key, hex.
    fn public_key(&self) -> &str;
    /// DER signature over SHA-256(`message`), hex.
    fn sign(&self, message: &str) -> Result<String>;
}

#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    /// Fetch a one-time challenge message for `public_key`.
    async fn generate_auth_message(&self, public_key: &str) -> Result<String>;
    async fn provision_agent(
        &self,
        signup_token: &str,
        signature: &str,
        public_key: &str,
    ) -> Result<ProvisionResponse>;
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open an authenticated connection subscribed to `event`.
    async fn connect(
        &self,
        credentials: &AuthCredentials,
        event: &str,
    ) -> Result<Box<dyn EventStream>>;
}

#[async_trait]
pub trait EventStream: Send {
    /// Next payload for the subscribed event; `None` once the connection closed.
    async fn next_payload(&mut self) -> Option<Result<String>>;
    async fn close(&mut self);
}
