// lib/crates/sentinel-common/src/agent.rs

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `AGENT-` followed by a version 4 UUID.
static AGENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^AGENT-[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$",
    )
    .unwrap_or_else(|e| unreachable!("static agent id pattern: {e}"))
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid agent id '{0}': expected AGENT-<uuid v4>")]
    InvalidAgentId(String),
}

/// Validate that an agent id matches `AGENT-<uuid v4>`.
pub fn validate_agent_id(id: &str) -> Result<(), IdentityError> {
    if AGENT_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(IdentityError::InvalidAgentId(id.to_string()))
    }
}

/// Fleet-assigned agent identifier. Only constructible from a valid id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentIdentity(String);

impl AgentIdentity {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the per-identity event carrying admin commands.
    #[must_use]
    pub fn admin_event(&self) -> String {
        format!("admin:{}", self.0)
    }
}

impl TryFrom<String> for AgentIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_agent_id(&value)?;
        Ok(Self(value))
    }
}

impl From<AgentIdentity> for String {
    fn from(value: AgentIdentity) -> Self {
        value.0
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provisioning record written by the provisioning flow (`agent-provision.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionState {
    pub agent_id: AgentIdentity,
}

/// Response of the coordinator's provisioning endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub success: bool,
    pub agent_id: AgentIdentity,
}
