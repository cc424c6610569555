//! Deployment domain types and pure helpers.

use sha2::{Digest, Sha256};

/// Where the deployer currently is in a check/build/swap cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    Idle,
    Checking,
    Building,
    Swapping,
    Failed,
}

/// Result of one trigger of the deployer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Current state pins a commit; periodic checks do nothing.
    Pinned,
    /// Live checkout already matches the remote branch.
    UpToDate,
    /// Requested state equals the current state.
    Unchanged,
    /// A build-and-swap for `commit` completed.
    Deployed { commit: String },
}

/// Directory name for a build of `commit` from `repository_url`.
///
/// Deterministic, so a retried build reuses (and first clears) the same path.
#[must_use]
pub fn build_dir_name(repository_url: &str, commit: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repository_url.as_bytes());
    hasher.update(b"/");
    hasher.update(commit.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the commit hash from `git ls-remote --heads <url> <branch>` output.
///
/// Only an exact `refs/heads/<branch>` match counts; `ls-remote` treats the
/// branch argument as a pattern and may list e.g. `feature/<branch>` too.
#[must_use]
pub fn parse_ls_remote(output: &str, branch: &str) -> Option<String> {
    let wanted = format!("refs/heads/{branch}");
    output.lines().find_map(|line| {
        let (hash, reference) = line.split_once('\t')?;
        let hash = hash.trim();
        (reference.trim() == wanted && !hash.is_empty()).then(|| hash.to_string())
    })
}

/// Split a shell-like command line on whitespace into program and arguments.
#[must_use]
pub fn split_command(command: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = command.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}
