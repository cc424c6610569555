//! Application service: one-shot agent provisioning.

use anyhow::{Context, Result};
use sentinel_common::{AgentIdentity, ProvisionState};

use crate::application::ports::{CoordinatorApi, ProvisionStore, Signer};

/// Exchange a signup token for an agent identity and persist it.
///
/// The token is signed with the local key so the coordinator binds the new
/// identity to this key pair. An existing record is left untouched.
///
/// # Errors
///
/// Returns an error if signing, the provisioning request, or the write fails,
/// or if the coordinator reports failure.
pub async fn provision_agent(
    signer: &dyn Signer,
    coordinator: &dyn CoordinatorApi,
    store: &dyn ProvisionStore,
    signup_token: &str,
) -> Result<AgentIdentity> {
    if let Some(existing) = store.load().await? {
        tracing::info!(agent_id = %existing.agent_id, "agent already provisioned");
        return Ok(existing.agent_id);
    }

    let signature = signer.sign(signup_token)?;
    let response = coordinator
        .provision_agent(signup_token, &signature, signer.public_key())
        .await
        .context("provisioning request failed")?;
    anyhow::ensure!(response.success, "coordinator rejected the signup token");

    store
        .save(&ProvisionState {
            agent_id: response.agent_id.clone(),
        })
        .await
        .context("writing provision record")?;
    tracing::info!(agent_id = %response.agent_id, "agent provisioned");
    Ok(response.agent_id)
}
