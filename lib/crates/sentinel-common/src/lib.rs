pub mod agent;
pub mod config;
pub mod types;

pub use agent::{AgentIdentity, IdentityError, ProvisionResponse, ProvisionState, validate_agent_id};
pub use config::{ReconnectSettings, SentinelConfig, SentinelPaths};
pub use types::*;
