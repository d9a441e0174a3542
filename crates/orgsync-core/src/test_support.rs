use crate::git::{GitError, GitPort, GitResult};
use crate::model::RepoDescriptor;
use git2::{Oid, Repository, Signature};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// Writes `name`, stages it and commits on `update_ref`. The parent is the
/// current tip of `update_ref`, falling back to HEAD.
pub(crate) fn commit_file(repo: &Repository, name: &str, contents: &str, update_ref: &str) -> Oid {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(name), contents).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("tester", "tester@example.com").unwrap();

    let parent = repo
        .refname_to_id(update_ref)
        .or_else(|_| repo.refname_to_id("HEAD"))
        .ok()
        .map(|oid| repo.find_commit(oid).unwrap());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some(update_ref), &sig, &sig, "commit", &tree, &parents)
        .unwrap()
}

/// Non-bare repository with one commit on `main`.
pub(crate) fn init_upstream(path: &Path) -> Repository {
    let repo = Repository::init(path).unwrap();
    commit_file(&repo, "README.md", "readme", "refs/heads/main");
    repo.set_head("refs/heads/main").unwrap();
    repo
}

pub(crate) fn repo_at(upstream: &Repository, host_path: &Path) -> RepoDescriptor {
    let url = upstream
        .workdir()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    let mut repo = RepoDescriptor::new("api", url, "main");
    repo.host_path = host_path.to_path_buf();
    repo
}

/// Scripted [`GitPort`] that records every call as `(repo name, op)`.
#[derive(Default)]
pub(crate) struct FakeGit {
    calls: Mutex<Vec<(String, &'static str)>>,
    failing_ops: HashSet<&'static str>,
    failing_repos: HashSet<String>,
    panicking_repos: HashSet<String>,
    checkout_failures: Mutex<usize>,
    remote_heads: Option<bool>,
    commit_counts: Mutex<VecDeque<usize>>,
    branches: Vec<String>,
    status: String,
    unpushed: Vec<String>,
    current: Option<String>,
}

impl FakeGit {
    pub(crate) fn new() -> Self {
        Self {
            remote_heads: Some(true),
            branches: vec!["main".to_string()],
            ..Self::default()
        }
    }

    pub(crate) fn failing(mut self, op: &'static str) -> Self {
        self.failing_ops.insert(op);
        self
    }

    /// Every operation against `name` fails.
    pub(crate) fn failing_repo(mut self, name: &str) -> Self {
        self.failing_repos.insert(name.to_string());
        self
    }

    pub(crate) fn panicking_repo(mut self, name: &str) -> Self {
        self.panicking_repos.insert(name.to_string());
        self
    }

    pub(crate) fn checkout_failures(self, count: usize) -> Self {
        *self.checkout_failures.lock().unwrap() = count;
        self
    }

    pub(crate) fn remote_heads(mut self, heads: Option<bool>) -> Self {
        self.remote_heads = heads;
        self
    }

    pub(crate) fn commit_counts(self, counts: &[usize]) -> Self {
        self.commit_counts.lock().unwrap().extend(counts);
        self
    }

    pub(crate) fn branches(mut self, branches: &[&str]) -> Self {
        self.branches = branches.iter().map(|b| b.to_string()).collect();
        self
    }

    pub(crate) fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub(crate) fn unpushed(mut self, commits: &[&str]) -> Self {
        self.unpushed = commits.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Checked-out branch reported by `current_branch`. Defaults to the
    /// repository's clone branch.
    pub(crate) fn on_branch(mut self, branch: &str) -> Self {
        self.current = Some(branch.to_string());
        self
    }

    pub(crate) fn ops(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|(_, op)| *op).collect()
    }

    fn step(&self, repo: &RepoDescriptor, op: &'static str) -> GitResult<()> {
        self.calls.lock().unwrap().push((repo.name.clone(), op));
        if op == "clone" && self.panicking_repos.contains(&repo.name) {
            panic!("scripted panic for {}", repo.name);
        }
        if self.failing_ops.contains(op) || self.failing_repos.contains(&repo.name) {
            return Err(GitError::Git {
                op,
                path: repo.host_path.clone(),
                source: git2::Error::from_str("scripted failure"),
            });
        }
        Ok(())
    }
}

impl GitPort for FakeGit {
    fn clone_repo(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "clone")
    }

    fn checkout(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "checkout")?;
        let mut remaining = self.checkout_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(GitError::BranchNotFound {
                branch: repo.clone_branch.clone(),
            });
        }
        Ok(())
    }

    fn clean(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "clean")
    }

    fn reset(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "reset")
    }

    fn pull(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "pull")
    }

    fn set_origin(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "set_origin")
    }

    fn set_origin_with_credentials(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "set_origin_with_credentials")
    }

    fn fetch_all(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "fetch_all")
    }

    fn fetch_clone_branch(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "fetch_clone_branch")
    }

    fn update_remote(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.step(repo, "update_remote")
    }

    fn branches(&self, repo: &RepoDescriptor) -> GitResult<Vec<String>> {
        self.step(repo, "branches")?;
        Ok(self.branches.clone())
    }

    fn short_status(&self, repo: &RepoDescriptor) -> GitResult<String> {
        self.step(repo, "short_status")?;
        Ok(self.status.clone())
    }

    fn repo_commit_count(&self, repo: &RepoDescriptor) -> GitResult<usize> {
        self.step(repo, "repo_commit_count")?;
        Ok(self.commit_counts.lock().unwrap().pop_front().unwrap_or(0))
    }

    fn rev_list_compare(
        &self,
        repo: &RepoDescriptor,
        _local: &str,
        _remote: &str,
    ) -> GitResult<Vec<String>> {
        self.step(repo, "rev_list_compare")?;
        Ok(self.unpushed.clone())
    }

    fn has_remote_heads(&self, repo: &RepoDescriptor) -> GitResult<bool> {
        self.step(repo, "has_remote_heads")?;
        self.remote_heads.ok_or_else(|| GitError::Git {
            op: "has_remote_heads",
            path: repo.host_path.clone(),
            source: git2::Error::from_str("scripted ls-remote failure"),
        })
    }

    fn remote_url(&self, repo: &RepoDescriptor) -> GitResult<String> {
        self.step(repo, "remote_url")?;
        Ok(repo.clone_url.clone())
    }

    fn has_local_changes(&self, repo: &RepoDescriptor) -> GitResult<bool> {
        self.step(repo, "has_local_changes")?;
        Ok(!self.status.is_empty())
    }

    fn has_unpushed_commits(&self, repo: &RepoDescriptor) -> GitResult<bool> {
        self.step(repo, "has_unpushed_commits")?;
        Ok(!self.unpushed.is_empty())
    }

    fn current_branch(&self, repo: &RepoDescriptor) -> GitResult<String> {
        self.step(repo, "current_branch")?;
        Ok(self
            .current
            .clone()
            .unwrap_or_else(|| repo.clone_branch.clone()))
    }

    fn has_commits_not_on_default_branch(
        &self,
        repo: &RepoDescriptor,
        _current_branch: &str,
    ) -> GitResult<bool> {
        self.step(repo, "has_commits_not_on_default_branch")?;
        Ok(false)
    }

    fn update_ref(&self, repo: &RepoDescriptor, _reference: &str, _target: &str) -> GitResult<()> {
        self.step(repo, "update_ref")
    }
}
