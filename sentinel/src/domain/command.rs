//! Decoding and validation of admin command payloads.

use std::collections::BTreeMap;

use sentinel_common::{SentinelCommand, SignedPayload};

use crate::domain::error::CommandError;

/// Parse the raw event payload into its `{content, signature}` envelope.
///
/// Both fields must be present and be strings.
pub fn decode_payload(raw: &str) -> Result<SignedPayload, CommandError> {
    serde_json::from_str(raw).map_err(|e| CommandError::InvalidPayload(e.to_string()))
}

/// Parse verified `content` as a [`SentinelCommand`].
pub fn decode_command(content: &str) -> Result<SentinelCommand, CommandError> {
    serde_json::from_str(content).map_err(|e| CommandError::UnrecognizedCommand(e.to_string()))
}

fn is_valid_env_key(key: &str) -> bool {
    !key.is_empty()
        && !key.contains('=')
        && !key.chars().any(char::is_whitespace)
        && !key.starts_with('#')
}

/// Render env vars as a `KEY=VALUE` file, one per line, keys sorted.
pub fn render_env_file(vars: &BTreeMap<String, String>) -> Result<String, CommandError> {
    let mut out = String::new();
    for (key, value) in vars {
        if !is_valid_env_key(key) {
            return Err(CommandError::InvalidEnvKey(key.clone()));
        }
        if value.contains('\n') || value.contains('\r') {
            return Err(CommandError::InvalidEnvValue(key.clone()));
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    Ok(out)
}
