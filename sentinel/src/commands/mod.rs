//! Command handlers, one module per subcommand.

pub mod keychain;
pub mod provision;
pub mod run;
