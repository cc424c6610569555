//! Typed domain error enums.
//!
//! Services return `anyhow::Result`; these convert through `?` and can be
//! recovered with `downcast_ref` where a caller needs to branch on them.

use thiserror::Error;

// ── Deployment errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("branch '{branch}' not found in repository {repository}")]
    BranchNotFound { repository: String, branch: String },

    #[error("{step} step `{command}` failed: {status}")]
    BuildStep {
        step: &'static str,
        command: String,
        status: String,
    },

    #[error("the {0} command is empty")]
    EmptyCommand(&'static str),
}

// ── Admin command errors ──────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("signature does not verify against the admin key")]
    InvalidSignature,

    #[error("unrecognized command: {0}")]
    UnrecognizedCommand(String),

    #[error("invalid env var name '{0}'")]
    InvalidEnvKey(String),

    #[error("env var '{0}' has a multi-line value")]
    InvalidEnvValue(String),
}

// ── Coordinator channel errors ────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("gave up connecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
}

// ── Keychain errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeychainError {
    #[error("malformed key material: {0}")]
    MalformedKey(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("decryption failed")]
    DecryptFailed,

    #[error("decrypted payload is not valid UTF-8")]
    NotUtf8,

    #[error("signing failed: {0}")]
    SigningFailed(String),
}
