//! Application service: git deployment state machine.
//!
//! Every trigger (the periodic check and explicit `set_git` requests) runs
//! as one item on a serial [`OperationQueue`], so state comparisons and the
//! build-and-swap that follows them never interleave.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use sentinel_common::GitState;
use tokio::sync::watch;

use crate::application::ports::{
    CheckoutLayout, CommandRunner, GitRepository, GitStateStore, RuntimeCommand, RuntimeNotifier,
};
use crate::domain::deploy::{DeployOutcome, DeployPhase, split_command};
use crate::domain::error::DeployError;
use crate::lang::OperationQueue;

/// Tunables of the deployer that come from configuration.
#[derive(Debug, Clone)]
pub struct DeployerSettings {
    pub poll_interval: Duration,
    pub install_command: String,
    pub build_command: String,
    /// State used when nothing has been persisted yet.
    pub default_state: GitState,
}

/// Collaborators the deployer drives.
#[derive(Clone)]
pub struct DeployerPorts {
    pub git: Arc<dyn GitRepository>,
    pub runner: Arc<dyn CommandRunner>,
    pub layout: Arc<dyn CheckoutLayout>,
    pub store: Arc<dyn GitStateStore>,
    pub notifier: Arc<dyn RuntimeNotifier>,
}

/// Keeps the live checkout in sync with the current [`GitState`].
///
/// Cheap to clone; clones share the queue, the state and the run flag.
#[derive(Clone)]
pub struct GitDeployer {
    inner: Arc<Inner>,
}

struct Inner {
    queue: OperationQueue,
    state: Mutex<GitState>,
    running: watch::Sender<bool>,
    phase: watch::Sender<DeployPhase>,
    ports: DeployerPorts,
    settings: DeployerSettings,
}

impl GitDeployer {
    /// Build a deployer starting from `state`.
    #[must_use]
    pub fn new(state: GitState, ports: DeployerPorts, settings: DeployerSettings) -> Self {
        let (running, _) = watch::channel(false);
        let (phase, _) = watch::channel(DeployPhase::Idle);
        Self {
            inner: Arc::new(Inner {
                queue: OperationQueue::serial("deployer"),
                state: Mutex::new(state),
                running,
                phase,
                ports,
                settings,
            }),
        }
    }

    /// Build a deployer from the persisted state, or the default one when
    /// none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted state exists but cannot be read.
    pub async fn load(ports: DeployerPorts, settings: DeployerSettings) -> Result<Self> {
        let state = match ports.store.load().await.context("loading git state")? {
            Some(state) => state,
            None => {
                tracing::info!(
                    repository = %settings.default_state.repository_url,
                    branch = %settings.default_state.branch,
                    "no git state persisted, using default"
                );
                settings.default_state.clone()
            }
        };
        Ok(Self::new(state, ports, settings))
    }

    /// Current desired state.
    #[must_use]
    pub fn state(&self) -> GitState {
        self.inner.lock_state().clone()
    }

    #[must_use]
    pub fn phase(&self) -> DeployPhase {
        *self.inner.phase.borrow()
    }

    /// Subscribe to phase transitions.
    #[must_use]
    pub fn phases(&self) -> watch::Receiver<DeployPhase> {
        self.inner.phase.subscribe()
    }

    /// Run the periodic check until [`stop`](Self::stop) is called.
    ///
    /// A failed check is logged and retried on the next tick. Returns at
    /// once if the loop is already running.
    pub async fn start(&self) {
        let mut running = self.inner.running.subscribe();
        if self.inner.running.send_replace(true) {
            tracing::debug!("deployer already started");
            return;
        }
        tracing::info!(
            interval_secs = self.inner.settings.poll_interval.as_secs(),
            "deployer started"
        );

        while *running.borrow_and_update() {
            match self.check_and_update().await {
                Ok(DeployOutcome::Deployed { commit }) => {
                    tracing::info!(%commit, "deployed new commit");
                }
                Ok(outcome) => tracing::debug!(?outcome, "periodic check"),
                Err(e) => tracing::warn!(error = %format!("{e:#}"), "periodic check failed"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.inner.settings.poll_interval) => {}
                _ = running.changed() => {}
            }
        }
        tracing::info!("deployer stopped");
    }

    /// Stop the periodic check. An item already on the queue still runs.
    pub fn stop(&self) {
        self.inner.running.send_replace(false);
    }

    /// Run one periodic check on the deployer queue.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving the remote commit or the build fails.
    pub async fn check_and_update(&self) -> Result<DeployOutcome> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .submit(move || async move { inner.check_once().await })
            .await?
    }

    /// Replace the desired state, building its target commit first.
    ///
    /// The new state is persisted only after the build succeeded; an equal
    /// state is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit cannot be resolved, the build fails,
    /// or the state cannot be persisted.
    pub async fn set_git_state(&self, new_state: GitState) -> Result<DeployOutcome> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .submit(move || async move { inner.apply_state(new_state).await })
            .await?
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, GitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: DeployPhase) {
        self.phase.send_replace(phase);
    }

    async fn check_once(&self) -> Result<DeployOutcome> {
        let state = self.lock_state().clone();
        if state.is_pinned() {
            return Ok(DeployOutcome::Pinned);
        }

        self.set_phase(DeployPhase::Checking);
        let target = self.resolve_poll_target(&state).await;
        self.set_phase(DeployPhase::Idle);

        match target? {
            Some(commit) => self.build_and_swap(&state.repository_url, &commit).await,
            None => Ok(DeployOutcome::UpToDate),
        }
    }

    /// Commit the poll should build, `None` when the live checkout is current.
    async fn resolve_poll_target(&self, state: &GitState) -> Result<Option<String>> {
        let git = &self.ports.git;
        let Some(live) = self.ports.layout.live_target().await? else {
            let commit = self.latest_commit(state).await?;
            tracing::info!(%commit, "no live checkout, building branch tip");
            return Ok(Some(commit));
        };

        git.fetch_branch(&live, &state.branch).await?;
        let local = git.rev_parse(&live, "HEAD").await?;
        let remote = git
            .rev_parse(&live, &format!("origin/{}", state.branch))
            .await?;
        if local == remote {
            return Ok(None);
        }
        tracing::info!(%local, %remote, branch = %state.branch, "branch moved");
        Ok(Some(remote))
    }

    async fn apply_state(&self, new_state: GitState) -> Result<DeployOutcome> {
        if *self.lock_state() == new_state {
            return Ok(DeployOutcome::Unchanged);
        }

        let commit = match new_state.pinned_commit() {
            Some(commit) => commit.to_string(),
            None => {
                self.set_phase(DeployPhase::Checking);
                let resolved = self.latest_commit(&new_state).await;
                self.set_phase(DeployPhase::Idle);
                resolved?
            }
        };

        let outcome = self
            .build_and_swap(&new_state.repository_url, &commit)
            .await?;
        self.ports
            .store
            .save(&new_state)
            .await
            .context("persisting git state")?;
        tracing::info!(
            repository = %new_state.repository_url,
            branch = %new_state.branch,
            pinned = new_state.is_pinned(),
            "git state updated"
        );
        *self.lock_state() = new_state;
        Ok(outcome)
    }

    async fn latest_commit(&self, state: &GitState) -> Result<String> {
        self.ports
            .git
            .latest_commit(&state.repository_url, &state.branch)
            .await
    }

    async fn build_and_swap(&self, repository_url: &str, commit: &str) -> Result<DeployOutcome> {
        let layout = &self.ports.layout;
        let dir = layout.build_dir(repository_url, commit);
        let previous = layout.live_target().await?;
        if previous.as_deref() == Some(dir.as_path()) {
            tracing::info!(%commit, "commit already live");
            return Ok(DeployOutcome::UpToDate);
        }

        if let Err(e) = self.build_and_link(repository_url, commit, &dir).await {
            self.set_phase(DeployPhase::Failed);
            tracing::error!(%commit, dir = %dir.display(), error = %format!("{e:#}"), "build failed");
            if let Err(cleanup) = layout.remove_build_dir(&dir).await {
                tracing::warn!(dir = %dir.display(), error = %cleanup, "could not remove failed build");
            }
            self.set_phase(DeployPhase::Idle);
            return Err(e);
        }

        if let Err(e) = self.ports.notifier.notify(RuntimeCommand::Git).await {
            tracing::warn!(error = %format!("{e:#}"), "runtime not notified of new code");
        }
        self.remove_previous(previous, &dir).await;
        self.set_phase(DeployPhase::Idle);

        Ok(DeployOutcome::Deployed {
            commit: commit.to_string(),
        })
    }

    async fn build_and_link(&self, repository_url: &str, commit: &str, dir: &Path) -> Result<()> {
        let layout = &self.ports.layout;
        self.set_phase(DeployPhase::Building);
        tracing::info!(repository = %repository_url, %commit, dir = %dir.display(), "building");

        layout.prepare_build_dir(dir).await?;
        self.ports
            .git
            .checkout_commit(repository_url, commit, dir)
            .await?;
        layout.link_env_file(dir).await?;
        self.run_step("install", &self.settings.install_command, dir)
            .await?;
        self.run_step("build", &self.settings.build_command, dir)
            .await?;

        self.set_phase(DeployPhase::Swapping);
        layout.repoint_live(dir).await
    }

    async fn run_step(&self, step: &'static str, command: &str, dir: &Path) -> Result<()> {
        let (program, args) = split_command(command).ok_or(DeployError::EmptyCommand(step))?;
        let status = self.ports.runner.run_status(program, &args, Some(dir)).await?;
        if !status.success() {
            return Err(DeployError::BuildStep {
                step,
                command: command.to_string(),
                status: status.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn remove_previous(&self, previous: Option<PathBuf>, current: &Path) {
        let Some(previous) = previous.filter(|p| p != current) else {
            return;
        };
        if let Err(e) = self.ports.layout.remove_build_dir(&previous).await {
            tracing::warn!(dir = %previous.display(), error = %e, "could not remove previous build");
        }
    }
}
