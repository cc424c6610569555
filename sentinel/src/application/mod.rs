//! Application layer: port trait definitions and use-case orchestration.
//!
//! Depends on `crate::domain`, `crate::lang` and the pure signature check in
//! `crate::keychain`; never on `crate::infra`.

pub mod ports;
pub mod services;

pub use ports::{
    ChannelConnector, CheckoutLayout, CommandRunner, ConfigFiles, CoordinatorApi, EventStream,
    GitRepository, GitStateStore, KnowledgeStore, ProvisionStore, RuntimeCommand,
    RuntimeNotifier, Signer,
};
