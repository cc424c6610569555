//! Tests for the `AgentService` command channel and `CommandDispatcher`.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use sentinel::application::ports::RuntimeCommand;
use sentinel::application::services::{
    AgentPorts, AgentService, AgentSettings, CommandDispatcher,
};
use sentinel::domain::channel::{ConnectionState, ReconnectPolicy};
use sentinel::domain::error::{ChannelError, CommandError};
use sentinel::keychain::Keychain;
use sentinel_common::{
    Character, CharacterSettings, CharacterStyle, GitState, KnowledgeAction, SentinelCommand,
};
use serde_json::json;

use crate::mocks::{
    AGENT_ID, DelayedProvision, DeployerRig, MemoryConfigFiles, MemoryKnowledge, MockCoordinator,
    REPO, ScriptedConnector, agent_identity,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Rig {
    admin: Keychain,
    deploy: DeployerRig,
    files: Arc<MemoryConfigFiles>,
    knowledge: Arc<MemoryKnowledge>,
    coordinator: Arc<MockCoordinator>,
    connector: Arc<ScriptedConnector>,
    provision: Arc<DelayedProvision>,
    agent: AgentService,
}

fn fast_policy(max_attempts: Option<u32>) -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        max_attempts,
    }
}

fn rig_with(connector: ScriptedConnector, policy: ReconnectPolicy) -> Rig {
    let admin = Keychain::generate();
    let deploy = DeployerRig::default();
    let files = Arc::new(MemoryConfigFiles::default());
    let knowledge = Arc::new(MemoryKnowledge::default());
    let coordinator = Arc::new(MockCoordinator::new(true));
    let connector = Arc::new(connector);
    let provision = Arc::new(DelayedProvision::after(0));

    let dispatcher = CommandDispatcher::new(
        deploy.deployer(GitState::tracking(REPO, "main")),
        files.clone(),
        knowledge.clone(),
        deploy.notifier.clone(),
    );
    let agent = AgentService::new(
        AgentPorts {
            signer: Arc::new(Keychain::generate()),
            coordinator: coordinator.clone(),
            connector: connector.clone(),
            provision: provision.clone(),
        },
        dispatcher,
        AgentSettings {
            admin_public_key: admin.public_key().to_string(),
            provision_poll_interval: Duration::from_millis(1),
            reconnect: policy,
        },
    );

    Rig {
        admin,
        deploy,
        files,
        knowledge,
        coordinator,
        connector,
        provision,
        agent,
    }
}

fn rig() -> Rig {
    rig_with(ScriptedConnector::refusing(), fast_policy(Some(1)))
}

/// Envelope for `command` signed by `signer`.
fn signed(signer: &Keychain, command: &serde_json::Value) -> String {
    let content = command.to_string();
    let signature = signer.sign(&content).unwrap();
    json!({ "content": content, "signature": signature }).to_string()
}

fn character(name: &str) -> Character {
    Character {
        id: None,
        name: name.to_string(),
        clients: vec!["twitter".into()],
        model_provider: "anthropic".into(),
        settings: CharacterSettings::default(),
        plugins: Vec::new(),
        bio: vec!["bio".into()],
        lore: Vec::new(),
        knowledge: Vec::new(),
        message_examples: Vec::new(),
        post_examples: Vec::new(),
        topics: Vec::new(),
        style: CharacterStyle::default(),
        adjectives: Vec::new(),
    }
}

// ── Payload verification ──────────────────────────────────────────────────────

#[tokio::test]
async fn signature_from_other_key_is_rejected() {
    let rig = rig();
    let impostor = Keychain::generate();
    let payload = signed(
        &impostor,
        &json!({"kind": "set_git", "state": {"repositoryUrl": REPO, "branch": "main", "commit": "c1"}}),
    );

    let err = rig.agent.handle_payload(&payload).unwrap_err();
    assert_eq!(err, CommandError::InvalidSignature);
    rig.agent.wait_until_idle().await;
    assert_eq!(rig.deploy.git.checkout_count(), 0);
}

#[tokio::test]
async fn tampered_content_is_rejected() {
    let rig = rig();
    let content = json!({"kind": "add_knowledge", "source": "s", "filename": "f"}).to_string();
    let signature = rig.admin.sign(&content).unwrap();
    let tampered = content.replace("\"f\"", "\"g\"");
    let payload = json!({ "content": tampered, "signature": signature }).to_string();

    assert_eq!(
        rig.agent.handle_payload(&payload).unwrap_err(),
        CommandError::InvalidSignature
    );
    assert!(rig.knowledge.filenames().is_empty());
}

#[tokio::test]
async fn malformed_envelopes_are_rejected() {
    let rig = rig();
    for raw in ["", "not json", r#"{"content":"x"}"#, r#"{"signature":"ab"}"#] {
        assert!(matches!(
            rig.agent.handle_payload(raw),
            Err(CommandError::InvalidPayload(_))
        ));
    }
}

#[tokio::test]
async fn unknown_kind_is_rejected_after_verification() {
    let rig = rig();
    let payload = signed(&rig.admin, &json!({"kind": "reboot"}));
    assert!(matches!(
        rig.agent.handle_payload(&payload),
        Err(CommandError::UnrecognizedCommand(_))
    ));
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn signed_set_git_reaches_the_deployer() {
    let rig = rig();
    let payload = signed(
        &rig.admin,
        &json!({"kind": "set_git", "state": {"repositoryUrl": REPO, "branch": "main", "commit": "c5"}}),
    );

    rig.agent.handle_payload(&payload).unwrap().await.unwrap();

    assert_eq!(rig.deploy.git.checkout_count(), 1);
    assert_eq!(
        *rig.deploy.store.saved.lock().unwrap(),
        Some(GitState::pinned(REPO, "main", "c5"))
    );
}

#[tokio::test]
async fn character_and_env_replace_files_and_notify_runtime() {
    let rig = rig();
    let command = SentinelCommand::SetCharacterAndEnvvars {
        character: character("scout"),
        env_vars: BTreeMap::from([
            ("OPENAI_KEY".to_string(), "sk-1".to_string()),
            ("A".to_string(), "1".to_string()),
        ]),
    };
    let payload = signed(&rig.admin, &serde_json::to_value(&command).unwrap());

    rig.agent.handle_payload(&payload).unwrap().await.unwrap();

    assert_eq!(
        rig.files.character.lock().unwrap().as_ref().map(|c| c.name.clone()),
        Some("scout".to_string())
    );
    assert_eq!(
        rig.files.env.lock().unwrap().as_deref(),
        Some("A=1\nOPENAI_KEY=sk-1\n")
    );
    assert_eq!(
        rig.deploy.notifier.sent(),
        vec![RuntimeCommand::CharacterAndEnvVars]
    );
}

#[tokio::test]
async fn legacy_tag_is_accepted() {
    let rig = rig();
    let mut command = serde_json::to_value(SentinelCommand::SetCharacterAndEnvvars {
        character: character("legacy"),
        env_vars: BTreeMap::new(),
    })
    .unwrap();
    command["kind"] = json!("set_character_n_envvars");
    let payload = signed(&rig.admin, &command);

    rig.agent.handle_payload(&payload).unwrap().await.unwrap();
    assert!(rig.files.character.lock().unwrap().is_some());
}

#[tokio::test]
async fn invalid_env_key_writes_nothing() {
    let rig = rig();
    let command = SentinelCommand::SetCharacterAndEnvvars {
        character: character("scout"),
        env_vars: BTreeMap::from([("BAD KEY".to_string(), "1".to_string())]),
    };
    let payload = signed(&rig.admin, &serde_json::to_value(&command).unwrap());

    // Accepted by the channel; the queued work fails and logs.
    rig.agent.handle_payload(&payload).unwrap().await.unwrap();

    assert!(rig.files.character.lock().unwrap().is_none());
    assert!(rig.files.env.lock().unwrap().is_none());
    assert!(rig.deploy.notifier.sent().is_empty());
}

#[tokio::test]
async fn knowledge_commands_apply_in_arrival_order() {
    let rig = rig();
    let names = ["a.md", "b.md", "c.md"];
    for name in names {
        let payload = signed(
            &rig.admin,
            &json!({"kind": "add_knowledge", "source": format!("https://x/{name}"), "filename": name}),
        );
        // Dropped submissions still run.
        drop(rig.agent.handle_payload(&payload).unwrap());
    }
    let payload = signed(
        &rig.admin,
        &json!({"kind": "delete_knowledge", "source": "https://x/a.md", "filename": "a.md"}),
    );
    drop(rig.agent.handle_payload(&payload).unwrap());

    rig.agent.wait_until_idle().await;
    assert_eq!(rig.knowledge.filenames(), ["a.md", "b.md", "c.md", "a.md"]);
    let last = rig.knowledge.records.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.2, KnowledgeAction::Delete);
}

// ── Connection lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn bounded_policy_gives_up_after_max_attempts() {
    let rig = rig_with(ScriptedConnector::refusing(), fast_policy(Some(3)));

    let err = tokio::time::timeout(Duration::from_secs(5), rig.agent.start())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<ChannelError>(),
        Some(&ChannelError::RetriesExhausted { attempts: 3 })
    );
    assert_eq!(rig.connector.attempts.load(Ordering::SeqCst), 3);
    // Every attempt asks for a fresh challenge.
    assert_eq!(rig.coordinator.auth_requests.load(Ordering::SeqCst), 3);
    assert_eq!(rig.agent.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn rejected_handshake_counts_against_bounded_policy() {
    let rig = rig_with(
        ScriptedConnector::rejecting("invalid signature"),
        fast_policy(Some(3)),
    );

    let err = tokio::time::timeout(Duration::from_secs(5), rig.agent.start())
        .await
        .unwrap()
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<ChannelError>(),
        Some(&ChannelError::RetriesExhausted { attempts: 3 })
    );
    assert_eq!(rig.connector.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(rig.agent.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn start_can_run_again_after_giving_up() {
    let rig = rig_with(ScriptedConnector::refusing(), fast_policy(Some(2)));

    for _ in 0..2 {
        let err = tokio::time::timeout(Duration::from_secs(5), rig.agent.start())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.downcast_ref::<ChannelError>().is_some());
    }
    assert_eq!(rig.connector.attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn connection_authenticates_and_dispatches_stream_payloads() {
    let rig = rig_with(ScriptedConnector::default(), fast_policy(None));
    let batch = vec![
        "garbage".to_string(),
        signed(&rig.admin, &json!({"kind": "add_knowledge", "source": "s1", "filename": "one"})),
        signed(&rig.admin, &json!({"kind": "add_knowledge", "source": "s2", "filename": "two"})),
    ];
    rig.connector.scripts.lock().unwrap().push_back(batch);

    let task = tokio::spawn({
        let agent = rig.agent.clone();
        async move { agent.start().await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while rig.knowledge.filenames().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(rig.agent.connection_state(), ConnectionState::Connected);

    rig.agent.stop();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(rig.knowledge.filenames(), ["one", "two"]);
    assert_eq!(rig.connector.attempts.load(Ordering::SeqCst), 1);
    let credentials = rig.connector.credentials.lock().unwrap().clone();
    let (creds, event) = &credentials[0];
    assert_eq!(creds.agent_id, AGENT_ID);
    assert_eq!(creds.message, "challenge-0");
    assert_eq!(event, &agent_identity().admin_event());
    assert_eq!(rig.agent.connection_state(), ConnectionState::Disconnected);
}

/// Agent service over the rig's mocks, trusting `rig.admin`.
fn rebuild(rig: &Rig) -> AgentService {
    let dispatcher = CommandDispatcher::new(
        rig.deploy.deployer(GitState::tracking(REPO, "main")),
        rig.files.clone(),
        rig.knowledge.clone(),
        rig.deploy.notifier.clone(),
    );
    AgentService::new(
        AgentPorts {
            signer: Arc::new(Keychain::generate()),
            coordinator: rig.coordinator.clone(),
            connector: rig.connector.clone(),
            provision: rig.provision.clone(),
        },
        dispatcher,
        AgentSettings {
            admin_public_key: rig.admin.public_key().to_string(),
            provision_poll_interval: Duration::from_millis(1),
            reconnect: fast_policy(None),
        },
    )
}

#[tokio::test]
async fn identity_waits_for_provision_record() {
    let provision = Arc::new(DelayedProvision::after(3));
    let mut rig = rig();
    rig.provision = provision.clone();
    let agent = rebuild(&rig);

    let id = tokio::time::timeout(Duration::from_secs(5), agent.agent_id())
        .await
        .unwrap();
    assert_eq!(id.as_str(), AGENT_ID);
    assert_eq!(provision.loads.load(Ordering::SeqCst), 4);

    // Cached afterwards.
    agent.agent_id().await;
    assert_eq!(provision.loads.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn stop_before_provisioning_returns_cleanly() {
    let mut rig = rig();
    rig.provision = Arc::new(DelayedProvision::after(u32::MAX));
    let agent = rebuild(&rig);

    let task = tokio::spawn({
        let agent = agent.clone();
        async move { agent.start().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    agent.stop();

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(rig.connector.attempts.load(Ordering::SeqCst), 0);
}
