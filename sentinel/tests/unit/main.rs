//! Unit tests for the sentinel services
//!
//! These tests drive the application services through in-memory ports and
//! run fast without git, sockets or a coordinator.

mod agent_service;
mod deployer;
mod provision_service;
