//! Application service: applies verified admin commands.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use sentinel_common::{Character, KnowledgeAction, SentinelCommand};

use crate::application::ports::{ConfigFiles, KnowledgeStore, RuntimeCommand, RuntimeNotifier};
use crate::application::services::deployer::GitDeployer;
use crate::domain::command::render_env_file;

/// Routes each [`SentinelCommand`] to the component that owns it.
#[derive(Clone)]
pub struct CommandDispatcher {
    deployer: GitDeployer,
    files: Arc<dyn ConfigFiles>,
    knowledge: Arc<dyn KnowledgeStore>,
    notifier: Arc<dyn RuntimeNotifier>,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(
        deployer: GitDeployer,
        files: Arc<dyn ConfigFiles>,
        knowledge: Arc<dyn KnowledgeStore>,
        notifier: Arc<dyn RuntimeNotifier>,
    ) -> Self {
        Self {
            deployer,
            files,
            knowledge,
            notifier,
        }
    }

    /// Apply one command.
    ///
    /// Character and env files are replaced wholesale. Env vars are validated
    /// before anything is written, so an invalid set leaves both files alone.
    ///
    /// # Errors
    ///
    /// Returns an error if validation, the deployment, or a file write fails.
    pub async fn dispatch(&self, command: SentinelCommand) -> Result<()> {
        match command {
            SentinelCommand::SetGit { state } => {
                let outcome = self.deployer.set_git_state(state).await?;
                tracing::info!(?outcome, "set_git applied");
            }
            SentinelCommand::SetCharacterAndEnvvars {
                character,
                env_vars,
            } => {
                let env = render_env_file(&env_vars)?;
                self.write_character(&character).await?;
                self.write_env(&env, &env_vars).await?;
                self.notify_runtime().await;
            }
            SentinelCommand::SetCharacter { character } => {
                self.write_character(&character).await?;
                self.notify_runtime().await;
            }
            SentinelCommand::SetEnvvars { env_vars } => {
                let env = render_env_file(&env_vars)?;
                self.write_env(&env, &env_vars).await?;
                self.notify_runtime().await;
            }
            SentinelCommand::AddKnowledge { source, filename } => {
                self.knowledge
                    .record(&source, &filename, KnowledgeAction::Create)
                    .await
                    .context("recording knowledge addition")?;
            }
            SentinelCommand::DeleteKnowledge { source, filename } => {
                self.knowledge
                    .record(&source, &filename, KnowledgeAction::Delete)
                    .await
                    .context("recording knowledge deletion")?;
            }
        }
        Ok(())
    }

    async fn write_character(&self, character: &Character) -> Result<()> {
        self.files
            .write_character(character)
            .await
            .context("writing character file")?;
        tracing::info!(name = %character.name, "character updated");
        Ok(())
    }

    async fn write_env(&self, contents: &str, vars: &BTreeMap<String, String>) -> Result<()> {
        self.files
            .write_env(contents)
            .await
            .context("writing env file")?;
        // Values may be secrets; only names are logged.
        tracing::info!(keys = ?vars.keys().collect::<Vec<_>>(), "env vars updated");
        Ok(())
    }

    async fn notify_runtime(&self) {
        if let Err(e) = self.notifier.notify(RuntimeCommand::CharacterAndEnvVars).await {
            tracing::warn!(error = %format!("{e:#}"), "runtime not notified of config change");
        }
    }
}
