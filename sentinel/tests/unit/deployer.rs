//! Tests for the `GitDeployer` application service.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::Ordering;
use std::time::Duration;

use sentinel::application::ports::RuntimeCommand;
use sentinel::application::services::GitDeployer;
use sentinel::domain::deploy::{DeployOutcome, DeployPhase};
use sentinel::domain::error::DeployError;
use sentinel_common::GitState;

use crate::mocks::{BUILD, DeployerRig, INSTALL, REPO, build_dir};

#[tokio::test]
async fn pinned_state_never_builds_on_poll() {
    let rig = DeployerRig::default();
    rig.git.set_tip("tip");
    let deployer = rig.deployer(GitState::pinned(REPO, "main", "abc"));

    for _ in 0..10 {
        assert_eq!(
            deployer.check_and_update().await.unwrap(),
            DeployOutcome::Pinned
        );
    }
    assert_eq!(rig.git.checkout_count(), 0);
    assert_eq!(rig.git.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(rig.runner.step_count(), 0);
}

#[tokio::test]
async fn blank_commit_does_not_pin() {
    let rig = DeployerRig::default();
    rig.git.set_tip("tip");
    let deployer = rig.deployer(GitState::pinned(REPO, "main", "  "));

    let outcome = deployer.check_and_update().await.unwrap();
    assert_eq!(
        outcome,
        DeployOutcome::Deployed {
            commit: "tip".into()
        }
    );
}

#[tokio::test]
async fn first_poll_builds_branch_tip_and_goes_live() {
    let rig = DeployerRig::default();
    rig.git.set_tip("c1");
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));

    let outcome = deployer.check_and_update().await.unwrap();

    let dir = build_dir(REPO, "c1");
    assert_eq!(outcome, DeployOutcome::Deployed { commit: "c1".into() });
    assert_eq!(rig.layout.live(), Some(dir.clone()));
    assert_eq!(*rig.layout.env_linked.lock().unwrap(), vec![dir.clone()]);
    let steps = rig.runner.steps.lock().unwrap().clone();
    assert_eq!(
        steps,
        vec![(INSTALL.to_string(), dir.clone()), (BUILD.to_string(), dir)]
    );
    assert_eq!(rig.notifier.sent(), vec![RuntimeCommand::Git]);
    assert_eq!(deployer.phase(), DeployPhase::Idle);
}

#[tokio::test]
async fn poll_is_noop_when_live_matches_remote() {
    let rig = DeployerRig::default();
    rig.seed_live("c1");
    rig.git.set_tip("c1");
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));

    for _ in 0..3 {
        assert_eq!(
            deployer.check_and_update().await.unwrap(),
            DeployOutcome::UpToDate
        );
    }
    assert_eq!(rig.git.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(rig.git.checkout_count(), 0);
    assert!(rig.notifier.sent().is_empty());
}

#[tokio::test]
async fn moved_branch_is_rebuilt_and_old_build_removed() {
    let rig = DeployerRig::default();
    let old = rig.seed_live("c1");
    rig.git.set_tip("c2");
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));

    let outcome = deployer.check_and_update().await.unwrap();

    assert_eq!(outcome, DeployOutcome::Deployed { commit: "c2".into() });
    assert_eq!(rig.layout.live(), Some(build_dir(REPO, "c2")));
    assert_eq!(rig.layout.removed(), vec![old]);
}

#[tokio::test]
async fn failed_build_keeps_live_checkout_and_state() {
    let rig = DeployerRig::default();
    let live = rig.seed_live("c1");
    let original = GitState::tracking(REPO, "main");
    let deployer = rig.deployer(original.clone());
    rig.runner.fail_on(BUILD);

    let err = deployer
        .set_git_state(GitState::pinned(REPO, "main", "c2"))
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::BuildStep { step: "build", .. })
    ));
    assert_eq!(rig.layout.live(), Some(live));
    assert_eq!(rig.layout.removed(), vec![build_dir(REPO, "c2")]);
    assert_eq!(rig.store.saves.load(Ordering::SeqCst), 0);
    assert_eq!(deployer.state(), original);
    assert_eq!(deployer.phase(), DeployPhase::Idle);
    assert!(rig.notifier.sent().is_empty());
}

#[tokio::test]
async fn failed_install_skips_build_step() {
    let rig = DeployerRig::default();
    rig.git.set_tip("c1");
    rig.runner.fail_on(INSTALL);
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));

    assert!(deployer.check_and_update().await.is_err());
    assert_eq!(rig.runner.step_count(), 1);
    assert_eq!(rig.layout.live(), None);
}

#[tokio::test]
async fn set_git_builds_once_then_is_unchanged() {
    let rig = DeployerRig::default();
    rig.seed_live("c1");
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));
    let pinned = GitState::pinned(REPO, "main", "c7");

    let first = deployer.set_git_state(pinned.clone()).await.unwrap();
    let second = deployer.set_git_state(pinned.clone()).await.unwrap();

    assert_eq!(first, DeployOutcome::Deployed { commit: "c7".into() });
    assert_eq!(second, DeployOutcome::Unchanged);
    assert_eq!(rig.git.checkout_count(), 1);
    assert_eq!(rig.store.saves.load(Ordering::SeqCst), 1);
    assert_eq!(*rig.store.saved.lock().unwrap(), Some(pinned.clone()));
    assert_eq!(deployer.state(), pinned);
}

#[tokio::test]
async fn set_git_unpinned_resolves_branch_tip() {
    let rig = DeployerRig::default();
    rig.git.set_tip("c9");
    let deployer = rig.deployer(GitState::pinned(REPO, "main", "c1"));

    let outcome = deployer
        .set_git_state(GitState::tracking(REPO, "main"))
        .await
        .unwrap();
    assert_eq!(outcome, DeployOutcome::Deployed { commit: "c9".into() });
}

#[tokio::test]
async fn set_git_to_live_commit_persists_without_rebuilding() {
    let rig = DeployerRig::default();
    rig.seed_live("c1");
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));
    let pinned = GitState::pinned(REPO, "main", "c1");

    let outcome = deployer.set_git_state(pinned.clone()).await.unwrap();

    assert_eq!(outcome, DeployOutcome::UpToDate);
    assert_eq!(rig.git.checkout_count(), 0);
    assert!(rig.layout.removed().is_empty());
    assert_eq!(*rig.store.saved.lock().unwrap(), Some(pinned));
}

#[tokio::test]
async fn missing_branch_surfaces_typed_error() {
    let rig = DeployerRig::default();
    let deployer = rig.deployer(GitState::pinned(REPO, "main", "c1"));

    let err = deployer
        .set_git_state(GitState::tracking(REPO, "gone"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::BranchNotFound { .. })
    ));
    assert_eq!(rig.store.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn notify_failure_does_not_fail_the_deploy() {
    let rig = DeployerRig::default();
    rig.git.set_tip("c1");
    rig.notifier.unreachable.store(true, Ordering::SeqCst);
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));

    let outcome = deployer.check_and_update().await.unwrap();
    assert_eq!(outcome, DeployOutcome::Deployed { commit: "c1".into() });
    assert_eq!(rig.layout.live(), Some(build_dir(REPO, "c1")));
}

#[tokio::test]
async fn poll_and_set_git_never_build_concurrently() {
    let rig = DeployerRig::default();
    rig.git.set_tip("c1");
    *rig.runner.step_delay.lock().unwrap() = Duration::from_millis(20);
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));

    let poll = deployer.check_and_update();
    let set = deployer.set_git_state(GitState::pinned(REPO, "main", "c2"));
    let (poll, set) = tokio::join!(poll, set);
    poll.unwrap();
    set.unwrap();

    assert_eq!(rig.runner.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(rig.layout.live(), Some(build_dir(REPO, "c2")));
}

#[tokio::test]
async fn load_falls_back_to_default_state() {
    let rig = DeployerRig::default();
    let deployer = GitDeployer::load(rig.ports(), DeployerRig::settings())
        .await
        .unwrap();
    assert_eq!(deployer.state(), GitState::tracking(REPO, "main"));

    let saved = GitState::pinned(REPO, "dev", "c3");
    *rig.store.saved.lock().unwrap() = Some(saved.clone());
    let deployer = GitDeployer::load(rig.ports(), DeployerRig::settings())
        .await
        .unwrap();
    assert_eq!(deployer.state(), saved);
}

#[tokio::test]
async fn start_polls_until_stopped() {
    let rig = DeployerRig::default();
    rig.seed_live("c1");
    rig.git.set_tip("c1");
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));

    let task = tokio::spawn({
        let deployer = deployer.clone();
        async move { deployer.start().await }
    });
    tokio::time::sleep(Duration::from_millis(60)).await;
    deployer.stop();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();

    assert!(rig.git.fetches.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn second_start_returns_while_first_keeps_polling() {
    let rig = DeployerRig::default();
    rig.seed_live("c1");
    rig.git.set_tip("c1");
    let deployer = rig.deployer(GitState::tracking(REPO, "main"));

    let first = tokio::spawn({
        let deployer = deployer.clone();
        async move { deployer.start().await }
    });
    tokio::time::sleep(Duration::from_millis(15)).await;

    tokio::time::timeout(Duration::from_millis(200), deployer.start())
        .await
        .unwrap();
    assert!(!first.is_finished());

    deployer.stop();
    tokio::time::timeout(Duration::from_secs(1), first)
        .await
        .unwrap()
        .unwrap();
}
