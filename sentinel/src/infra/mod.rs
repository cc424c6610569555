//! Infrastructure layer: concrete implementations of application port traits.
//!
//! All I/O lives here: child processes, the filesystem layout, persisted
//! records, the coordinator HTTP API, the websocket event channel and the
//! runtime control socket.

pub mod channel;
pub mod command_runner;
pub mod coordinator;
pub mod fs;
pub mod git;
pub mod knowledge;
pub mod runtime;
pub mod state;
