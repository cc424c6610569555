//! Tests for the one-shot provisioning use-case.

#![allow(clippy::unwrap_used)]

use sentinel::application::ports::ProvisionStore;
use sentinel::application::services::provision_agent;
use sentinel::keychain::{Keychain, is_valid_signature};
use sentinel_common::ProvisionState;

use crate::mocks::{AGENT_ID, MemoryProvision, MockCoordinator, agent_identity};

#[tokio::test]
async fn signs_token_and_persists_identity() {
    let keychain = Keychain::generate();
    let coordinator = MockCoordinator::new(true);
    let store = MemoryProvision::default();

    let id = provision_agent(&keychain, &coordinator, &store, "signup-123")
        .await
        .unwrap();

    assert_eq!(id.as_str(), AGENT_ID);
    let calls = coordinator.provision_calls.lock().unwrap().clone();
    let (token, signature, public_key) = &calls[0];
    assert_eq!(token, "signup-123");
    assert_eq!(public_key, keychain.public_key());
    assert!(is_valid_signature(token, public_key, signature));
    assert_eq!(
        store.load().await.unwrap().map(|s| s.agent_id),
        Some(agent_identity())
    );
}

#[tokio::test]
async fn rejected_token_writes_nothing() {
    let keychain = Keychain::generate();
    let coordinator = MockCoordinator::new(false);
    let store = MemoryProvision::default();

    let err = provision_agent(&keychain, &coordinator, &store, "stale")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("rejected"));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn existing_record_skips_the_coordinator() {
    let keychain = Keychain::generate();
    let coordinator = MockCoordinator::new(true);
    let store = MemoryProvision::default();
    store
        .save(&ProvisionState {
            agent_id: agent_identity(),
        })
        .await
        .unwrap();

    provision_agent(&keychain, &coordinator, &store, "again")
        .await
        .unwrap();
    assert!(coordinator.provision_calls.lock().unwrap().is_empty());
}
