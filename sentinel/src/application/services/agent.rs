//! Application service: authenticated command channel to the coordinator.
//!
//! Resolves the agent identity, keeps one event connection open with
//! backoff between attempts, verifies each admin payload and hands accepted
//! commands to a serial queue so they apply one at a time in arrival order.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sentinel_common::{AgentIdentity, AuthCredentials};
use tokio::sync::{OnceCell, watch};

use crate::application::ports::{
    ChannelConnector, CoordinatorApi, EventStream, ProvisionStore, Signer,
};
use crate::application::services::dispatch::CommandDispatcher;
use crate::domain::channel::{ConnectionState, ReconnectPolicy};
use crate::domain::command::{decode_command, decode_payload};
use crate::domain::error::{ChannelError, CommandError};
use crate::keychain::is_valid_signature;
use crate::lang::{OperationQueue, Submission};

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Key every admin payload must be signed with (compressed SEC1, hex).
    pub admin_public_key: String,
    /// Interval between checks for the provisioning record.
    pub provision_poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

/// Collaborators the agent service drives.
#[derive(Clone)]
pub struct AgentPorts {
    pub signer: Arc<dyn Signer>,
    pub coordinator: Arc<dyn CoordinatorApi>,
    pub connector: Arc<dyn ChannelConnector>,
    pub provision: Arc<dyn ProvisionStore>,
}

/// Cheap to clone; clones share the connection and the command queue.
#[derive(Clone)]
pub struct AgentService {
    inner: Arc<Inner>,
}

struct Inner {
    commands: OperationQueue,
    identity: OnceCell<AgentIdentity>,
    connection: watch::Sender<ConnectionState>,
    running: watch::Sender<bool>,
    dispatcher: CommandDispatcher,
    ports: AgentPorts,
    settings: AgentSettings,
}

/// Why the event pump returned.
enum PumpExit {
    Closed,
    Stopped,
    /// Rejected by the coordinator, or broken before delivering anything.
    Failed(anyhow::Error),
}

impl AgentService {
    #[must_use]
    pub fn new(ports: AgentPorts, dispatcher: CommandDispatcher, settings: AgentSettings) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        let (running, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                commands: OperationQueue::serial("commands"),
                identity: OnceCell::new(),
                connection,
                running,
                dispatcher,
                ports,
                settings,
            }),
        }
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    /// Subscribe to connection state transitions.
    #[must_use]
    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    /// The agent identity, waiting for the provisioning record if needed.
    ///
    /// Polls on the configured interval; unreadable records are logged and
    /// retried. The first identity read is cached for the life of the service.
    pub async fn agent_id(&self) -> AgentIdentity {
        self.inner
            .identity
            .get_or_init(|| self.inner.wait_for_identity())
            .await
            .clone()
    }

    /// Connect and process admin commands until [`stop`](Self::stop) is called.
    ///
    /// Returns at once if the service is already running.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::RetriesExhausted`] when a bounded reconnect
    /// policy runs out of attempts. A rejected handshake counts as a failed
    /// attempt, as does a stream that breaks before its first payload.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.inner.running.subscribe();
        if self.inner.running.send_replace(true) {
            tracing::debug!("agent service already started");
            return Ok(());
        }

        let result = self.serve(&mut running).await;
        self.inner.running.send_replace(false);
        self.inner.set_connection(ConnectionState::Disconnected);
        tracing::info!("agent service stopped");
        result
    }

    async fn serve(&self, running: &mut watch::Receiver<bool>) -> Result<()> {
        let identity = tokio::select! {
            identity = self.agent_id() => identity,
            () = stopped(running) => return Ok(()),
        };
        let event = identity.admin_event();
        let policy = self.inner.settings.reconnect;
        tracing::info!(agent_id = %identity, %event, "agent service started");

        // Reset only once a connection has delivered a payload.
        let mut failures = 0u32;
        while *running.borrow() {
            match self.inner.open(&identity, &event).await {
                Ok(mut stream) => {
                    self.inner.set_connection(ConnectionState::Connected);
                    tracing::info!("connected to coordinator");
                    let exit = self.pump(stream.as_mut(), running, &mut failures).await;
                    stream.close().await;
                    self.inner.set_connection(ConnectionState::Disconnected);
                    match exit {
                        PumpExit::Stopped => return Ok(()),
                        PumpExit::Closed => tracing::warn!("coordinator connection closed"),
                        PumpExit::Failed(e) => record_failure(&policy, &mut failures, &e)?,
                    }
                }
                Err(e) => {
                    self.inner.set_connection(ConnectionState::Disconnected);
                    record_failure(&policy, &mut failures, &e)?;
                }
            }

            let delay = policy.delay_for(failures.max(1));
            tracing::debug!(delay_ms = delay.as_millis(), "reconnecting");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = stopped(running) => return Ok(()),
            }
        }
        Ok(())
    }

    /// Close the connection. Commands already queued still run.
    pub fn stop(&self) {
        self.inner.running.send_replace(false);
    }

    /// Resolve once every accepted command has finished.
    pub async fn wait_until_idle(&self) {
        self.inner.commands.wait_until_finished().await;
    }

    /// Verify and decode one raw event payload and queue the command.
    ///
    /// The returned submission resolves once the command has been applied;
    /// the queued work logs its own outcome, so callers may drop it.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] when the envelope is malformed, the
    /// signature does not verify against the admin key, or the content is
    /// not a recognized command. Nothing is queued in that case.
    pub fn handle_payload(&self, raw: &str) -> Result<Submission<()>, CommandError> {
        let payload = decode_payload(raw)?;
        if !is_valid_signature(
            &payload.content,
            &self.inner.settings.admin_public_key,
            &payload.signature,
        ) {
            return Err(CommandError::InvalidSignature);
        }
        let command = decode_command(&payload.content)?;
        let kind = command.kind();
        tracing::info!(kind, "admin command accepted");

        let dispatcher = self.inner.dispatcher.clone();
        Ok(self.inner.commands.submit(move || async move {
            match dispatcher.dispatch(command).await {
                Ok(()) => tracing::info!(kind, "admin command applied"),
                Err(e) => tracing::error!(kind, error = %format!("{e:#}"), "admin command failed"),
            }
        }))
    }

    async fn pump(
        &self,
        stream: &mut dyn EventStream,
        running: &mut watch::Receiver<bool>,
        failures: &mut u32,
    ) -> PumpExit {
        let mut healthy = false;
        loop {
            let next = tokio::select! {
                next = stream.next_payload() => next,
                () = stopped(running) => return PumpExit::Stopped,
            };
            match next {
                None => return PumpExit::Closed,
                Some(Err(e)) => {
                    let rejected = matches!(
                        e.downcast_ref::<ChannelError>(),
                        Some(ChannelError::HandshakeRejected(_))
                    );
                    if rejected || !healthy {
                        return PumpExit::Failed(e);
                    }
                    tracing::warn!(error = %format!("{e:#}"), "event stream failed");
                    return PumpExit::Closed;
                }
                Some(Ok(raw)) => {
                    if !healthy {
                        healthy = true;
                        *failures = 0;
                    }
                    if let Err(e) = self.handle_payload(&raw) {
                        tracing::warn!(error = %e, "admin payload rejected");
                    }
                }
            }
        }
    }
}

impl Inner {
    fn set_connection(&self, state: ConnectionState) {
        self.connection.send_replace(state);
    }

    async fn wait_for_identity(&self) -> AgentIdentity {
        let interval = self.settings.provision_poll_interval;
        loop {
            match self.ports.provision.load().await {
                Ok(Some(record)) => return record.agent_id,
                Ok(None) => tracing::info!(
                    retry_secs = interval.as_secs(),
                    "agent not provisioned yet, waiting"
                ),
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "could not read provision record");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// One authenticated connection attempt with a fresh challenge.
    async fn open(&self, identity: &AgentIdentity, event: &str) -> Result<Box<dyn EventStream>> {
        self.set_connection(ConnectionState::Connecting);
        let signer = &self.ports.signer;
        let message = self
            .ports
            .coordinator
            .generate_auth_message(signer.public_key())
            .await
            .context("requesting auth message")?;

        self.set_connection(ConnectionState::Authenticating);
        let credentials = AuthCredentials {
            signature: signer.sign(&message)?,
            message,
            agent_id: identity.to_string(),
        };
        self.ports.connector.connect(&credentials, event).await
    }
}

/// Count a failed attempt; errors once the policy allows no more.
fn record_failure(
    policy: &ReconnectPolicy,
    failures: &mut u32,
    error: &anyhow::Error,
) -> Result<()> {
    *failures = failures.saturating_add(1);
    tracing::warn!(
        failures = *failures,
        error = %format!("{error:#}"),
        "connection attempt failed"
    );
    if policy.should_retry(*failures) {
        Ok(())
    } else {
        Err(ChannelError::RetriesExhausted {
            attempts: *failures,
        }
        .into())
    }
}

/// Resolve once the run flag is cleared.
async fn stopped(running: &mut watch::Receiver<bool>) {
    if running.wait_for(|running| !*running).await.is_err() {
        std::future::pending::<()>().await;
    }
}
