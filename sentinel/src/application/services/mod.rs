//! Application services: use-case orchestration.
//!
//! Services compose domain logic with port trait calls; all I/O goes through
//! the ports.

pub mod agent;
pub mod deployer;
pub mod dispatch;
pub mod provision;

pub use agent::{AgentPorts, AgentService, AgentSettings};
pub use deployer::{DeployerPorts, DeployerSettings, GitDeployer};
pub use dispatch::CommandDispatcher;
pub use provision::provision_agent;
