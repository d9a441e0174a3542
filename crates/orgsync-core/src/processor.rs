//! Per-repository state machine: pick the destination, then clone, update,
//! or inspect the clone according to the run mode.

use crate::branch_sync::{SyncOutcome, sync_default_branch};
use crate::collisions::{CollisionTable, resolve_host_path};
use crate::config::{SyncConfig, SyncMode};
use crate::git::GitPort;
use crate::model::RepoDescriptor;
use crate::paths::{initial_slug, is_path_segment_safe, is_relative_path_safe};
use crate::stats::SyncStats;
use std::fs;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Severity of the single signal each repository emits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalKind {
    Success,
    Info,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RepoOutcome {
    Cloned,
    Pulled { new_commits: usize },
    RemoteUpdated,
    Fetched,
    /// Prune check: the clone holds nothing that is not on the remote.
    Untouched,
    /// Prune check: the clone is kept, or does not exist.
    Retained,
    Info(String),
    Failed(String),
}

impl RepoOutcome {
    pub fn signal(&self) -> SignalKind {
        match self {
            RepoOutcome::Info(_) => SignalKind::Info,
            RepoOutcome::Failed(_) => SignalKind::Error,
            _ => SignalKind::Success,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepoOutcome::Cloned => "cloned",
            RepoOutcome::Pulled { .. } => "pulled",
            RepoOutcome::RemoteUpdated => "remote_updated",
            RepoOutcome::Fetched => "fetched",
            RepoOutcome::Untouched => "untouched",
            RepoOutcome::Retained => "retained",
            RepoOutcome::Info(_) => "info",
            RepoOutcome::Failed(_) => "failed",
        }
    }
}

pub struct RepositoryProcessor<G> {
    git: G,
    config: Arc<SyncConfig>,
    collisions: CollisionTable,
    stats: SyncStats,
}

impl<G: GitPort> RepositoryProcessor<G> {
    pub fn new(git: G, config: Arc<SyncConfig>, collisions: CollisionTable) -> Self {
        Self {
            git,
            config,
            collisions,
            stats: SyncStats::new(),
        }
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn collisions(&self) -> &CollisionTable {
        &self.collisions
    }

    /// Processes one repository and returns its terminal outcome. Messages
    /// for `Info` and `Failed` outcomes are already recorded in the stats.
    pub fn process(&self, repo: &mut RepoDescriptor, index: usize) -> RepoOutcome {
        if let Err(outcome) = self.assign_host_path(repo, index) {
            return outcome;
        }

        let outcome = if self.config.mode == SyncMode::PruneUntouched {
            self.check_untouched(repo)
        } else {
            if let Some(delay) = self.config.clone_delay() {
                debug!(repo = %repo.name, delay_secs = delay.as_secs(), "delaying before clone");
                thread::sleep(delay);
            }
            if repo.exists_locally() {
                self.update_existing(repo)
            } else {
                self.clone_new(repo)
            }
        };

        match &outcome {
            RepoOutcome::Failed(message) => warn!(
                repo = %repo.name,
                path = %repo.host_path.display(),
                error = %message,
                "repo failed"
            ),
            RepoOutcome::Info(message) => info!(
                repo = %repo.name,
                path = %repo.host_path.display(),
                detail = %message,
                "repo needs attention"
            ),
            outcome => info!(
                repo = %repo.name,
                path = %repo.host_path.display(),
                outcome = outcome.as_str(),
                "repo processed"
            ),
        }
        outcome
    }

    fn assign_host_path(&self, repo: &mut RepoDescriptor, index: usize) -> Result<(), RepoOutcome> {
        let preserve = self.config.preserve_directory_structure;
        let slug = initial_slug(repo, preserve);
        let safe = if preserve && !repo.path.is_empty() {
            is_relative_path_safe(&slug)
        } else {
            is_path_segment_safe(&slug)
        };
        if !safe {
            return Err(self.fail(format!(
                "Unsafe directory name `{slug}` for repository {}, skipping",
                repo.name
            )));
        }
        repo.host_path = resolve_host_path(
            &self.config.output_dir,
            &self.collisions,
            repo,
            slug,
            index,
        );
        Ok(())
    }

    fn clone_new(&self, repo: &mut RepoDescriptor) -> RepoOutcome {
        if let Err(err) = self.git.clone_repo(repo) {
            if repo.is_wiki {
                if let Err(io) = fs::create_dir_all(&repo.host_path) {
                    return self.fail(format!(
                        "Failed to create directory for empty wiki {}: {io}",
                        repo.host_path.display()
                    ));
                }
                return self.inform(format!(
                    "Wiki may be enabled but there was no content to clone: {} Error: {err}",
                    repo.url
                ));
            }
            return self.fail(format!("Problem trying to clone: {} Error: {err}", repo.url));
        }

        if self.config.branch.is_some()
            && let Err(err) = self.git.checkout(repo)
        {
            let outcome = self.inform(format!(
                "Could not checkout out {}, branch may not exist or may not have any contents/commits, no changes to: {} Error: {err}",
                repo.clone_branch, repo.url
            ));
            if let Err(err) = self.git.set_origin(repo) {
                return self.fail(format!(
                    "Problem trying to set remote on: {} Error: {err}",
                    repo.url
                ));
            }
            return outcome;
        }

        let sync_failure = self.sync_branch(repo);
        if let Err(err) = self.git.set_origin(repo) {
            return self.fail(format!(
                "Problem trying to set remote on: {} Error: {err}",
                repo.url
            ));
        }
        if let Some(failed) = sync_failure {
            return failed;
        }

        if self.config.fetch_all {
            if let Err(err) = self.git.set_origin_with_credentials(repo) {
                return self.fail(format!(
                    "Problem trying to set remote with credentials on: {} Error: {err}",
                    repo.url
                ));
            }
            let fetched = self.git.fetch_all(repo);
            if let Err(err) = self.git.set_origin(repo) {
                return self.fail(format!(
                    "Problem trying to reset remote after fetch on: {} Error: {err}",
                    repo.url
                ));
            }
            if let Err(err) = fetched {
                return self.fail(format!(
                    "Could not fetch remotes: {} Error: {err}",
                    repo.url
                ));
            }
        }

        self.stats.record_clone();
        RepoOutcome::Cloned
    }

    fn update_existing(&self, repo: &mut RepoDescriptor) -> RepoOutcome {
        if let Err(err) = self.git.set_origin_with_credentials(repo) {
            return self.fail(format!(
                "Problem trying to set remote with credentials on: {} Error: {err}",
                repo.url
            ));
        }

        let outcome = match self.config.mode {
            SyncMode::Backup => self.update_mirror(repo),
            SyncMode::NoClean => self.fetch_only(repo),
            SyncMode::Standard => self.pull_branch(repo),
            SyncMode::PruneUntouched => RepoOutcome::Retained,
        };
        let outcome = match outcome.signal() {
            SignalKind::Success => self.sync_branch(repo).unwrap_or(outcome),
            _ => outcome,
        };

        // The credential-free origin goes back regardless of the result.
        if let Err(err) = self.git.set_origin(repo) {
            return self.fail(format!(
                "Problem trying to reset remote on: {} Error: {err}",
                repo.url
            ));
        }

        match &outcome {
            RepoOutcome::RemoteUpdated => self.stats.record_remote_update(),
            RepoOutcome::Fetched => self.stats.record_pull(),
            RepoOutcome::Pulled { new_commits } => {
                self.stats.record_pull();
                self.stats.add_new_commits(*new_commits);
            }
            _ => {}
        }
        outcome
    }

    fn update_mirror(&self, repo: &RepoDescriptor) -> RepoOutcome {
        match self.git.update_remote(repo) {
            Ok(()) => RepoOutcome::RemoteUpdated,
            Err(err) if repo.is_wiki => self.inform(format!(
                "Wiki may be enabled but there was no content to clone on: {} Error: {err}",
                repo.url
            )),
            Err(err) => self.fail(format!(
                "Could not update remotes: {} Error: {err}",
                repo.url
            )),
        }
    }

    fn fetch_only(&self, repo: &RepoDescriptor) -> RepoOutcome {
        if self.config.fetch_all
            && let Err(err) = self.git.fetch_all(repo)
        {
            if repo.is_wiki {
                return self.inform(format!(
                    "Wiki may be enabled but there was no content to clone on: {} Error: {err}",
                    repo.url
                ));
            }
            return self.fail(format!(
                "Could not fetch remotes: {} Error: {err}",
                repo.url
            ));
        }
        RepoOutcome::Fetched
    }

    fn pull_branch(&self, repo: &mut RepoDescriptor) -> RepoOutcome {
        if self.config.fetch_all
            && let Err(err) = self.git.fetch_all(repo)
        {
            return self.fail(format!(
                "Could not fetch remotes: {} Error: {err}",
                repo.url
            ));
        }

        if let Err(first) = self.git.checkout(repo) {
            debug!(repo = %repo.name, error = %first, "checkout failed, fetching branch and retrying");
            if let Err(err) = self.git.fetch_clone_branch(repo) {
                debug!(repo = %repo.name, error = %err, "fetching clone branch failed");
            }
            if let Err(retry) = self.git.checkout(repo) {
                return match self.git.has_remote_heads(repo) {
                    Ok(true) => self.fail(format!(
                        "Could not checkout {}, branch may not exist or may not have any contents/commits, no changes made on: {} Error: {retry}",
                        repo.clone_branch, repo.url
                    )),
                    Ok(false) => self.inform(format!(
                        "Could not checkout {} due to repository being empty, no changes made on: {}",
                        repo.clone_branch, repo.url
                    )),
                    Err(err) => self.fail(format!(
                        "Could not checkout {}, failed to list remote heads on: {} Errors: {retry} {err}",
                        repo.clone_branch, repo.url
                    )),
                };
            }
        }

        repo.commits.pre_pull = self.commit_count(repo, "pre");

        if let Err(err) = self.git.clean(repo) {
            return self.fail(format!(
                "Problem running git clean: {} Error: {err}",
                repo.url
            ));
        }
        if let Err(err) = self.git.reset(repo) {
            return self.fail(format!(
                "Problem resetting branch: {} for: {} Error: {err}",
                repo.clone_branch, repo.url
            ));
        }
        if let Err(err) = self.git.pull(repo) {
            return self.fail(format!(
                "Problem trying to pull branch: {} for: {} Error: {err}",
                repo.clone_branch, repo.url
            ));
        }

        repo.commits.post_pull = self.commit_count(repo, "post");
        repo.commits.diff = repo.commits.post_pull.saturating_sub(repo.commits.pre_pull);
        RepoOutcome::Pulled {
            new_commits: repo.commits.diff,
        }
    }

    fn commit_count(&self, repo: &RepoDescriptor, stage: &str) -> usize {
        match self.git.repo_commit_count(repo) {
            Ok(count) => count,
            Err(err) => {
                self.stats.add_info(format!(
                    "Problem trying to get {stage} pull commit count on repo: {} Error: {err}",
                    repo.url
                ));
                0
            }
        }
    }

    /// Runs the default-branch sync while `origin` still carries credentials.
    /// Returns the failed outcome when the sync itself failed.
    fn sync_branch(&self, repo: &RepoDescriptor) -> Option<RepoOutcome> {
        if !self.config.sync_default_branch || self.config.mode == SyncMode::Backup {
            return None;
        }
        match sync_default_branch(&self.git, &self.config, repo) {
            SyncOutcome::Failed(err) => Some(self.fail(format!(
                "Problem syncing default branch {} for: {} Error: {err}",
                repo.clone_branch, repo.url
            ))),
            SyncOutcome::Skipped(_) | SyncOutcome::Synced => None,
        }
    }

    /// A clone is untouched when its only local branch carries nothing the
    /// remote lacks and the working tree is clean.
    fn check_untouched(&self, repo: &RepoDescriptor) -> RepoOutcome {
        if !repo.exists_locally() {
            return RepoOutcome::Retained;
        }
        if let Err(err) = self.git.fetch_clone_branch(repo) {
            debug!(repo = %repo.name, error = %err, "fetch before prune check failed");
        }

        let branches = match self.git.branches(repo) {
            Ok(branches) => branches,
            Err(err) => {
                return self.fail(format!(
                    "Failed to list local branches for repository {}: {err}",
                    repo.name
                ));
            }
        };
        if branches.len() > 1 {
            return RepoOutcome::Retained;
        }
        if branches.is_empty() {
            return self.untouched(repo);
        }

        match self.git.short_status(repo) {
            Ok(status) if !status.trim().is_empty() => return RepoOutcome::Retained,
            Ok(_) => {}
            Err(err) => {
                return self.fail(format!(
                    "Failed to get short status for repository {}: {err}",
                    repo.name
                ));
            }
        }

        match self.git.rev_list_compare(repo, "HEAD", "@{u}") {
            Ok(commits) if !commits.is_empty() => RepoOutcome::Retained,
            Ok(_) => self.untouched(repo),
            Err(err) => self.fail(format!(
                "Failed to get commit differences for repository {}. The repository may be empty or have no upstream: {err}",
                repo.name
            )),
        }
    }

    fn untouched(&self, repo: &RepoDescriptor) -> RepoOutcome {
        self.stats.mark_untouched(repo.host_path.clone());
        RepoOutcome::Untouched
    }

    fn fail(&self, message: String) -> RepoOutcome {
        self.stats.add_error(message.clone());
        RepoOutcome::Failed(message)
    }

    fn inform(&self, message: String) -> RepoOutcome {
        self.stats.add_info(message.clone());
        RepoOutcome::Info(message)
    }
}
