use crate::model::RepoDescriptor;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {op} failed in {}: {source}", .path.display())]
    Git {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: git2::Error,
    },
    #[error("{op} failed in {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("remote `origin` is not configured in {}", .0.display())]
    NoOrigin(PathBuf),
    #[error("HEAD is detached in {}", .0.display())]
    DetachedHead(PathBuf),
    #[error("branch `{branch}` not found locally or on origin")]
    BranchNotFound { branch: String },
    #[error("cannot fast-forward `{branch}`: local and remote history diverged")]
    NotFastForward { branch: String },
}

impl GitError {
    pub fn git(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(git2::Error) -> Self {
        let path = path.into();
        move |source| GitError::Git { op, path, source }
    }

    pub fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| GitError::Io { op, path, source }
    }
}

pub type GitResult<T> = Result<T, GitError>;

/// Git primitives used by the processor and the default-branch sync.
///
/// Every call is synchronous and acts on `repo.host_path`.
pub trait GitPort: Send + Sync {
    fn clone_repo(&self, repo: &RepoDescriptor) -> GitResult<()>;
    /// Checks out `repo.clone_branch`, creating it from `origin` when only the
    /// remote-tracking ref exists.
    fn checkout(&self, repo: &RepoDescriptor) -> GitResult<()>;
    /// Removes untracked files and directories.
    fn clean(&self, repo: &RepoDescriptor) -> GitResult<()>;
    /// Hard-resets the working tree to `origin/<clone_branch>`.
    fn reset(&self, repo: &RepoDescriptor) -> GitResult<()>;
    fn pull(&self, repo: &RepoDescriptor) -> GitResult<()>;
    /// Points `origin` at the credential-free browse URL.
    fn set_origin(&self, repo: &RepoDescriptor) -> GitResult<()>;
    /// Points `origin` at the clone URL, which may carry credentials.
    fn set_origin_with_credentials(&self, repo: &RepoDescriptor) -> GitResult<()>;
    fn fetch_all(&self, repo: &RepoDescriptor) -> GitResult<()>;
    fn fetch_clone_branch(&self, repo: &RepoDescriptor) -> GitResult<()>;
    /// Refreshes every remote with its configured refspecs. Used for mirrors.
    fn update_remote(&self, repo: &RepoDescriptor) -> GitResult<()>;
    fn branches(&self, repo: &RepoDescriptor) -> GitResult<Vec<String>>;
    fn short_status(&self, repo: &RepoDescriptor) -> GitResult<String>;
    fn repo_commit_count(&self, repo: &RepoDescriptor) -> GitResult<usize>;
    /// Commits reachable from `local` but not from `remote`. `@{u}` names the
    /// upstream of the current branch.
    fn rev_list_compare(
        &self,
        repo: &RepoDescriptor,
        local: &str,
        remote: &str,
    ) -> GitResult<Vec<String>>;
    fn has_remote_heads(&self, repo: &RepoDescriptor) -> GitResult<bool>;
    fn remote_url(&self, repo: &RepoDescriptor) -> GitResult<String>;
    fn has_local_changes(&self, repo: &RepoDescriptor) -> GitResult<bool>;
    fn has_unpushed_commits(&self, repo: &RepoDescriptor) -> GitResult<bool>;
    fn current_branch(&self, repo: &RepoDescriptor) -> GitResult<String>;
    fn has_commits_not_on_default_branch(
        &self,
        repo: &RepoDescriptor,
        current_branch: &str,
    ) -> GitResult<bool>;
    /// Points `reference` at whatever `target` currently resolves to.
    fn update_ref(&self, repo: &RepoDescriptor, reference: &str, target: &str) -> GitResult<()>;
}
