//! Domain layer: pure rules and types.
//!
//! No I/O, no async. Functions take data in and return data out.

pub mod channel;
pub mod command;
pub mod deploy;
pub mod error;

pub use channel::{ConnectionState, ReconnectPolicy};
pub use command::{decode_command, decode_payload, render_env_file};
pub use deploy::{DeployOutcome, DeployPhase, build_dir_name, parse_ls_remote, split_command};
pub use error::{ChannelError, CommandError, DeployError, KeychainError};
