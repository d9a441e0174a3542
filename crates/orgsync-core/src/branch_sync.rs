//! Fast-forwards a clone's default branch to its remote, but only when doing
//! so cannot lose local work.
//!
//! The checks run in a fixed order and each failing check is a skip:
//! feature enabled, `origin` present, clean working tree, nothing unpushed on
//! the current branch, nothing on the current branch that the default branch
//! lacks, and finally a successful switch to the default branch. Only the
//! fetch, ref update and reset that follow can fail the sync.

use crate::config::SyncConfig;
use crate::git::{GitError, GitPort};
use crate::model::RepoDescriptor;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SkipReason {
    Disabled,
    NoOrigin,
    UncommittedChanges,
    UnpushedCommits,
    AheadOfDefaultBranch,
    DetachedHead,
    CheckoutFailed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::NoOrigin => "no_origin",
            SkipReason::UncommittedChanges => "uncommitted_changes",
            SkipReason::UnpushedCommits => "unpushed_commits",
            SkipReason::AheadOfDefaultBranch => "ahead_of_default_branch",
            SkipReason::DetachedHead => "detached_head",
            SkipReason::CheckoutFailed => "checkout_failed",
        }
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Synced,
    Failed(GitError),
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced)
    }
}

pub fn sync_default_branch<G: GitPort + ?Sized>(
    git: &G,
    config: &SyncConfig,
    repo: &RepoDescriptor,
) -> SyncOutcome {
    let outcome = match check_and_sync(git, config, repo) {
        Ok(outcome) => outcome,
        Err(err) => SyncOutcome::Failed(err),
    };
    match &outcome {
        SyncOutcome::Skipped(reason) => debug!(
            repo = %repo.name,
            branch = %repo.clone_branch,
            reason = reason.as_str(),
            "skipping default branch sync"
        ),
        SyncOutcome::Synced => info!(
            repo = %repo.name,
            branch = %repo.clone_branch,
            "default branch synced with origin"
        ),
        SyncOutcome::Failed(err) => warn!(
            repo = %repo.name,
            error = %err,
            "default branch sync failed"
        ),
    }
    outcome
}

fn check_and_sync<G: GitPort + ?Sized>(
    git: &G,
    config: &SyncConfig,
    repo: &RepoDescriptor,
) -> Result<SyncOutcome, GitError> {
    if !config.sync_default_branch {
        return Ok(SyncOutcome::Skipped(SkipReason::Disabled));
    }
    match git.remote_url(repo) {
        Ok(_) => {}
        Err(GitError::NoOrigin(_)) => return Ok(SyncOutcome::Skipped(SkipReason::NoOrigin)),
        Err(err) => return Err(err),
    }
    if git.has_local_changes(repo)? {
        return Ok(SyncOutcome::Skipped(SkipReason::UncommittedChanges));
    }
    let current = match git.current_branch(repo) {
        Ok(branch) => branch,
        Err(GitError::DetachedHead(_)) => {
            return Ok(SyncOutcome::Skipped(SkipReason::DetachedHead));
        }
        Err(err) => return Err(err),
    };
    if git.has_unpushed_commits(repo)? {
        return Ok(SyncOutcome::Skipped(SkipReason::UnpushedCommits));
    }
    if git.has_commits_not_on_default_branch(repo, &current)? {
        return Ok(SyncOutcome::Skipped(SkipReason::AheadOfDefaultBranch));
    }
    if current != repo.clone_branch
        && let Err(err) = git.checkout(repo)
    {
        debug!(repo = %repo.name, error = %err, "could not switch to default branch");
        return Ok(SyncOutcome::Skipped(SkipReason::CheckoutFailed));
    }

    let branch = &repo.clone_branch;
    git.fetch_clone_branch(repo)?;
    git.update_ref(
        repo,
        &format!("refs/heads/{branch}"),
        &format!("refs/remotes/origin/{branch}"),
    )?;
    git.reset(repo)?;
    Ok(SyncOutcome::Synced)
}
