//! `sentinel run`: keep the agent deployed and listen for admin commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use sentinel_common::GitState;

use crate::app::AppContext;
use crate::application::ports::{CommandRunner, RuntimeNotifier};
use crate::application::services::{
    AgentPorts, AgentService, AgentSettings, CommandDispatcher, DeployerPorts, DeployerSettings,
    GitDeployer,
};
use crate::domain::channel::ReconnectPolicy;
use crate::infra::channel::WsConnector;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::fs::{LocalConfigFiles, LocalLayout};
use crate::infra::git::GitCli;
use crate::infra::knowledge::KnowledgeDir;
use crate::infra::runtime::UnixSocketNotifier;
use crate::infra::state::{GitStateFile, ProvisionFile};

/// Start the deployer and the agent service and run until interrupted.
///
/// # Errors
///
/// Returns an error if wiring fails, or if the agent service gives up
/// reconnecting under a bounded policy.
pub async fn run(app: &AppContext) -> Result<()> {
    let config = &app.config;
    let paths = &app.paths;
    tracing::info!(
        data_dir = %paths.root.display(),
        api_url = %config.api_url,
        poll_interval_secs = config.poll_interval_secs,
        "sentinel starting"
    );

    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::default());
    let notifier: Arc<dyn RuntimeNotifier> =
        Arc::new(UnixSocketNotifier::new(paths.runtime_socket.clone()));

    let deployer = GitDeployer::load(
        DeployerPorts {
            git: Arc::new(GitCli::new(Arc::clone(&runner))),
            runner,
            layout: Arc::new(LocalLayout::new(paths)),
            store: Arc::new(GitStateFile::new(paths.git_state_file.clone())),
            notifier: Arc::clone(&notifier),
        },
        DeployerSettings {
            poll_interval: config.poll_interval(),
            install_command: config.install_command.clone(),
            build_command: config.build_command.clone(),
            default_state: GitState::tracking(
                config.default_repository_url.clone(),
                config.default_branch.clone(),
            ),
        },
    )
    .await?;

    let dispatcher = CommandDispatcher::new(
        deployer.clone(),
        Arc::new(LocalConfigFiles::new(paths)),
        Arc::new(KnowledgeDir::new(paths.knowledge_dir.clone())),
        notifier,
    );

    let agent = AgentService::new(
        AgentPorts {
            signer: app.keychain()?,
            coordinator: app.coordinator()?,
            connector: Arc::new(WsConnector::new(
                &config.api_url,
                config.connect_timeout(),
            )?),
            provision: Arc::new(ProvisionFile::new(paths.provision_file.clone())),
        },
        dispatcher,
        AgentSettings {
            admin_public_key: config.admin_public_key.clone(),
            provision_poll_interval: config.provision_poll_interval(),
            reconnect: ReconnectPolicy::from(config.reconnect()),
        },
    );

    let deployer_task = tokio::spawn({
        let deployer = deployer.clone();
        async move { deployer.start().await }
    });
    let agent_task = tokio::spawn({
        let agent = agent.clone();
        async move { agent.start().await }
    });

    let agent_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            tracing::info!("interrupt received, shutting down");
            None
        }
        joined = agent_task => Some(joined.context("agent service task panicked")?),
    };

    agent.stop();
    deployer.stop();
    agent.wait_until_idle().await;
    deployer_task.await.context("deployer task panicked")?;

    match agent_result {
        Some(result) => result,
        None => Ok(()),
    }
}
