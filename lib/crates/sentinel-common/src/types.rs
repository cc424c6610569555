use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Desired deployment target.
///
/// Equality compares all three fields; a `null` and an absent `commit` both
/// deserialize to `None` and therefore compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitState {
    pub repository_url: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl GitState {
    /// Track the tip of `branch`.
    #[must_use]
    pub fn tracking(repository_url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: branch.into(),
            commit: None,
        }
    }

    /// Pin to an exact commit.
    #[must_use]
    pub fn pinned(
        repository_url: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: branch.into(),
            commit: Some(commit.into()),
        }
    }

    /// The pinned commit, if any. Blank commits do not pin.
    #[must_use]
    pub fn pinned_commit(&self) -> Option<&str> {
        self.commit
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned_commit().is_some()
    }
}

/// Hex-encoded P-256 key material as persisted in `agent-keypair.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

/// Envelope of an admin command as delivered on the admin channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPayload {
    /// JSON-encoded [`SentinelCommand`], signed verbatim.
    pub content: String,
    /// DER signature, hex.
    pub signature: String,
}

/// Credentials presented when opening the coordinator event connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCredentials {
    pub message: String,
    pub agent_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageExample {
    pub user: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStyle {
    pub all: Vec<String>,
    pub chat: Vec<String>,
    pub post: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceSettings>,
}

/// Character document consumed by the agent runtime (`character.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub clients: Vec<String>,
    pub model_provider: String,
    pub settings: CharacterSettings,
    pub plugins: Vec<String>,
    pub bio: Vec<String>,
    pub lore: Vec<String>,
    pub knowledge: Vec<String>,
    pub message_examples: Vec<Vec<MessageExample>>,
    pub post_examples: Vec<String>,
    pub topics: Vec<String>,
    pub style: CharacterStyle,
    pub adjectives: Vec<String>,
}

/// Remotely issued instruction, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SentinelCommand {
    SetGit {
        state: GitState,
    },
    #[serde(alias = "set_character_n_envvars")]
    SetCharacterAndEnvvars {
        character: Character,
        #[serde(rename = "envVars")]
        env_vars: BTreeMap<String, String>,
    },
    SetCharacter {
        character: Character,
    },
    SetEnvvars {
        #[serde(rename = "envVars")]
        env_vars: BTreeMap<String, String>,
    },
    AddKnowledge {
        source: String,
        filename: String,
    },
    DeleteKnowledge {
        source: String,
        filename: String,
    },
}

impl SentinelCommand {
    /// Wire tag of this command.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetGit { .. } => "set_git",
            Self::SetCharacterAndEnvvars { .. } => "set_character_and_envvars",
            Self::SetCharacter { .. } => "set_character",
            Self::SetEnvvars { .. } => "set_envvars",
            Self::AddKnowledge { .. } => "add_knowledge",
            Self::DeleteKnowledge { .. } => "delete_knowledge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeAction {
    Create,
    Delete,
}

/// One knowledge add/delete event, stored as `knowledge/<hash>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeRecord {
    pub source: String,
    pub filename: String,
    pub action: KnowledgeAction,
    pub updated_at: DateTime<Utc>,
}
