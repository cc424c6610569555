//! `sentinel provision`: register this agent with the coordinator.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::provision_agent;
use crate::infra::state::ProvisionFile;

#[derive(Args)]
pub struct ProvisionArgs {
    /// One-time signup token issued by the coordinator
    #[arg(long, env = "SENTINEL_SIGNUP_TOKEN")]
    pub token: String,
}

/// Run the provision command and print the agent id.
///
/// # Errors
///
/// Returns an error if provisioning fails.
pub async fn run(app: &AppContext, args: &ProvisionArgs) -> Result<()> {
    let keychain = app.keychain()?;
    let coordinator = app.coordinator()?;
    let store = ProvisionFile::new(app.paths.provision_file.clone());

    let agent_id = provision_agent(keychain.as_ref(), coordinator.as_ref(), &store, &args.token).await?;
    println!("{agent_id}");
    Ok(())
}
