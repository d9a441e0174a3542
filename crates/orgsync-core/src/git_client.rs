use crate::config::{SyncConfig, SyncMode};
use crate::git::{GitError, GitPort, GitResult};
use crate::model::RepoDescriptor;
use git2::{
    AutotagOption, Branch, BranchType, ErrorCode, FetchOptions, FetchPrune, Oid, Repository,
    ResetType, Status, StatusOptions,
    build::{CheckoutBuilder, RepoBuilder},
};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const MIRROR_REFSPEC: &str = "+refs/*:refs/*";
const ORIGIN: &str = "origin";
/// Scratch namespace the remote's branches are fetched into when checking
/// whether the remote has any.
const REMOTE_HEADS_NAMESPACE: &str = "refs/orgsync/remote-heads";

/// libgit2-backed [`GitPort`]. Credentials travel inside the clone URL.
#[derive(Clone, Debug, Default)]
pub struct Git2Client {
    mirror: bool,
    depth: Option<u32>,
    submodules: bool,
}

impl Git2Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            mirror: config.mode == SyncMode::Backup,
            depth: config.clone_depth,
            submodules: config.include_submodules,
        }
    }

    fn open(&self, repo: &RepoDescriptor) -> GitResult<Repository> {
        Repository::open(&repo.host_path).map_err(GitError::git("open", &repo.host_path))
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut fo = FetchOptions::new();
        if let Some(depth) = self.depth {
            fo.depth(i32::try_from(depth).unwrap_or(i32::MAX));
        }
        fo
    }

    fn point_origin(&self, repo: &RepoDescriptor, url: &str) -> GitResult<()> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        match git.find_remote(ORIGIN) {
            Ok(remote) => {
                if remote.url() != Some(url) {
                    git.remote_set_url(ORIGIN, url)
                        .map_err(GitError::git("set origin url", path))?;
                }
            }
            Err(_) if self.mirror => {
                git.remote_with_fetch(ORIGIN, url, MIRROR_REFSPEC)
                    .map_err(GitError::git("create origin remote", path))?;
            }
            Err(_) => {
                git.remote(ORIGIN, url)
                    .map_err(GitError::git("create origin remote", path))?;
            }
        }
        Ok(())
    }

    fn fetch_remotes(&self, repo: &RepoDescriptor, prune: bool) -> GitResult<()> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let remotes = git.remotes().map_err(GitError::git("list remotes", path))?;
        for name in remotes.iter().flatten() {
            let mut remote = git
                .find_remote(name)
                .map_err(GitError::git("find remote", path))?;
            let mut fo = self.fetch_options();
            if prune {
                fo.prune(FetchPrune::On);
            }
            debug!(path = %path.display(), remote = name, "fetching remote");
            remote
                .fetch(&[] as &[&str], Some(&mut fo), None)
                .map_err(GitError::git("fetch", path))?;
        }
        Ok(())
    }
}

impl GitPort for Git2Client {
    fn clone_repo(&self, repo: &RepoDescriptor) -> GitResult<()> {
        let path = &repo.host_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(GitError::io("create clone parent", parent))?;
        }
        info!(path = %path.display(), mirror = self.mirror, "cloning repo");
        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());
        if self.mirror {
            builder.bare(true);
            builder.remote_create(|git, name, url| git.remote_with_fetch(name, url, MIRROR_REFSPEC));
        }
        let git = builder
            .clone(&repo.clone_url, path)
            .map_err(GitError::git("clone", path))?;
        if self.submodules && !self.mirror {
            update_submodules(&git, path)?;
        }
        Ok(())
    }

    fn checkout(&self, repo: &RepoDescriptor) -> GitResult<()> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let branch = &repo.clone_branch;
        let local_ref = format!("refs/heads/{branch}");

        if git.find_reference(&local_ref).is_err() {
            let remote_ref = format!("refs/remotes/{ORIGIN}/{branch}");
            let commit = git
                .find_reference(&remote_ref)
                .and_then(|reference| reference.peel_to_commit())
                .map_err(|_| GitError::BranchNotFound {
                    branch: branch.clone(),
                })?;
            let mut created = git
                .branch(branch, &commit, false)
                .map_err(GitError::git("create branch", path))?;
            created
                .set_upstream(Some(&format!("{ORIGIN}/{branch}")))
                .map_err(GitError::git("set upstream", path))?;
        }

        let target = git
            .revparse_single(&local_ref)
            .map_err(GitError::git("resolve branch", path))?;
        git.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))
            .map_err(GitError::git("checkout", path))?;
        git.set_head(&local_ref)
            .map_err(GitError::git("set HEAD", path))?;
        Ok(())
    }

    fn clean(&self, repo: &RepoDescriptor) -> GitResult<()> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let workdir = git
            .workdir()
            .ok_or_else(|| GitError::Git {
                op: "clean",
                path: path.clone(),
                source: git2::Error::from_str("repository has no working tree"),
            })?
            .to_path_buf();
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(false);
        let statuses = git
            .statuses(Some(&mut options))
            .map_err(GitError::git("status", path))?;
        for entry in statuses.iter() {
            if !entry.status().contains(Status::WT_NEW) {
                continue;
            }
            let Some(relative) = entry.path() else {
                continue;
            };
            let target = workdir.join(relative);
            let removed = if target.is_dir() {
                fs::remove_dir_all(&target)
            } else {
                fs::remove_file(&target)
            };
            removed.map_err(GitError::io("clean", &target))?;
        }
        Ok(())
    }

    fn reset(&self, repo: &RepoDescriptor) -> GitResult<()> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let target = git
            .revparse_single(&format!("refs/remotes/{ORIGIN}/{}", repo.clone_branch))
            .map_err(GitError::git("resolve origin branch", path))?;
        git.reset(&target, ResetType::Hard, None)
            .map_err(GitError::git("reset", path))?;
        Ok(())
    }

    fn pull(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.fetch_clone_branch(repo)?;
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let branch = &repo.clone_branch;
        let local_ref = format!("refs/heads/{branch}");
        let remote_ref = format!("refs/remotes/{ORIGIN}/{branch}");

        let fetched = git
            .find_reference(&remote_ref)
            .and_then(|reference| git.reference_to_annotated_commit(&reference))
            .map_err(GitError::git("resolve fetched branch", path))?;
        let (analysis, _) = git
            .merge_analysis(&[&fetched])
            .map_err(GitError::git("merge analysis", path))?;
        if analysis.is_up_to_date() {
            if self.submodules {
                update_submodules(&git, path)?;
            }
            return Ok(());
        }
        if !analysis.is_fast_forward() && !analysis.is_unborn() {
            return Err(GitError::NotFastForward {
                branch: branch.clone(),
            });
        }
        git.reference(&local_ref, fetched.id(), true, "orgsync: fast-forward pull")
            .map_err(GitError::git("update branch", path))?;
        git.set_head(&local_ref)
            .map_err(GitError::git("set HEAD", path))?;
        git.checkout_head(Some(CheckoutBuilder::new().force()))
            .map_err(GitError::git("checkout", path))?;
        if self.submodules {
            update_submodules(&git, path)?;
        }
        Ok(())
    }

    fn set_origin(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.point_origin(repo, &repo.url)
    }

    fn set_origin_with_credentials(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.point_origin(repo, &repo.clone_url)
    }

    fn fetch_all(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.fetch_remotes(repo, false)
    }

    fn fetch_clone_branch(&self, repo: &RepoDescriptor) -> GitResult<()> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let branch = &repo.clone_branch;
        let mut remote = git
            .find_remote(ORIGIN)
            .map_err(|_| GitError::NoOrigin(path.clone()))?;
        let refspec = format!("+refs/heads/{branch}:refs/remotes/{ORIGIN}/{branch}");
        let mut fo = self.fetch_options();
        debug!(path = %path.display(), branch = %branch, "fetching branch from origin");
        remote
            .fetch(&[refspec.as_str()], Some(&mut fo), None)
            .map_err(GitError::git("fetch branch", path))?;
        Ok(())
    }

    fn update_remote(&self, repo: &RepoDescriptor) -> GitResult<()> {
        self.fetch_remotes(repo, self.mirror)
    }

    fn branches(&self, repo: &RepoDescriptor) -> GitResult<Vec<String>> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let mut names = Vec::new();
        for item in git
            .branches(Some(BranchType::Local))
            .map_err(GitError::git("list branches", path))?
        {
            let (branch, _) = item.map_err(GitError::git("list branches", path))?;
            if let Some(name) = branch.name().map_err(GitError::git("branch name", path))? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn short_status(&self, repo: &RepoDescriptor) -> GitResult<String> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let mut options = StatusOptions::new();
        options.include_untracked(true).include_ignored(false);
        let statuses = git
            .statuses(Some(&mut options))
            .map_err(GitError::git("status", path))?;
        let lines: Vec<String> = statuses
            .iter()
            .map(|entry| {
                format!(
                    "{} {}",
                    short_code(entry.status()),
                    entry.path().unwrap_or_default()
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn repo_commit_count(&self, repo: &RepoDescriptor) -> GitResult<usize> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let tip = resolve_commit(&git, &repo.clone_branch, path)?;
        let mut walk = git.revwalk().map_err(GitError::git("rev-list", path))?;
        walk.push(tip).map_err(GitError::git("rev-list", path))?;
        Ok(walk.count())
    }

    fn rev_list_compare(
        &self,
        repo: &RepoDescriptor,
        local: &str,
        remote: &str,
    ) -> GitResult<Vec<String>> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let local = resolve_commit(&git, local, path)?;
        let remote = resolve_commit(&git, remote, path)?;
        let mut walk = git.revwalk().map_err(GitError::git("rev-list", path))?;
        walk.push(local).map_err(GitError::git("rev-list", path))?;
        walk.hide(remote).map_err(GitError::git("rev-list", path))?;
        walk.map(|oid| {
            oid.map(|oid| oid.to_string())
                .map_err(GitError::git("rev-list", path))
        })
        .collect()
    }

    fn has_remote_heads(&self, repo: &RepoDescriptor) -> GitResult<bool> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let mut remote = git
            .find_remote(ORIGIN)
            .map_err(|_| GitError::NoOrigin(path.clone()))?;
        // Remote::list reads a null slice when the advertisement is empty, so
        // the heads are fetched into a scratch namespace and counted there.
        clear_remote_heads(&git, path)?;
        let refspec = format!("+refs/heads/*:{REMOTE_HEADS_NAMESPACE}/*");
        let mut fo = self.fetch_options();
        fo.download_tags(AutotagOption::None);
        debug!(path = %path.display(), "listing remote heads");
        remote
            .fetch(&[refspec.as_str()], Some(&mut fo), None)
            .map_err(GitError::git("ls-remote", path))?;
        let heads = clear_remote_heads(&git, path)?;
        Ok(heads > 0)
    }

    fn remote_url(&self, repo: &RepoDescriptor) -> GitResult<String> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        match git.find_remote(ORIGIN) {
            Ok(remote) => Ok(remote.url().unwrap_or_default().to_string()),
            Err(err) if err.code() == ErrorCode::NotFound => Err(GitError::NoOrigin(path.clone())),
            Err(err) => Err(GitError::git("find origin", path)(err)),
        }
    }

    fn has_local_changes(&self, repo: &RepoDescriptor) -> GitResult<bool> {
        let git = self.open(repo)?;
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = git
            .statuses(Some(&mut options))
            .map_err(GitError::git("status", &repo.host_path))?;
        Ok(!statuses.is_empty())
    }

    fn has_unpushed_commits(&self, repo: &RepoDescriptor) -> GitResult<bool> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let branch = current_branch_name(&git, path)?;
        has_commits_outside(
            &git,
            &format!("refs/heads/{branch}"),
            &format!("refs/remotes/{ORIGIN}/{branch}"),
            path,
        )
    }

    fn current_branch(&self, repo: &RepoDescriptor) -> GitResult<String> {
        let git = self.open(repo)?;
        current_branch_name(&git, &repo.host_path)
    }

    fn has_commits_not_on_default_branch(
        &self,
        repo: &RepoDescriptor,
        current_branch: &str,
    ) -> GitResult<bool> {
        if current_branch == repo.clone_branch {
            return Ok(false);
        }
        let git = self.open(repo)?;
        has_commits_outside(
            &git,
            &format!("refs/heads/{current_branch}"),
            &format!("refs/remotes/{ORIGIN}/{}", repo.clone_branch),
            &repo.host_path,
        )
    }

    fn update_ref(&self, repo: &RepoDescriptor, reference: &str, target: &str) -> GitResult<()> {
        let git = self.open(repo)?;
        let path = &repo.host_path;
        let oid = git
            .refname_to_id(target)
            .map_err(GitError::git("resolve ref", path))?;
        git.reference(reference, oid, true, &format!("orgsync: update {reference}"))
            .map_err(GitError::git("update ref", path))?;
        Ok(())
    }
}

/// Initializes and updates every submodule of `git`, then recurses into each.
fn update_submodules(git: &Repository, path: &Path) -> GitResult<()> {
    let submodules = git
        .submodules()
        .map_err(GitError::git("list submodules", path))?;
    for mut submodule in submodules {
        let sub_path = path.join(submodule.path());
        debug!(path = %sub_path.display(), "updating submodule");
        submodule
            .update(true, None)
            .map_err(GitError::git("update submodule", &sub_path))?;
        let nested = submodule
            .open()
            .map_err(GitError::git("open submodule", &sub_path))?;
        update_submodules(&nested, &sub_path)?;
    }
    Ok(())
}

/// Deletes every ref under the scratch namespace and returns how many there were.
fn clear_remote_heads(git: &Repository, path: &Path) -> GitResult<usize> {
    let names: Vec<String> = git
        .references_glob(&format!("{REMOTE_HEADS_NAMESPACE}/*"))
        .map_err(GitError::git("list remote heads", path))?
        .names()
        .map(|name| {
            name.map(str::to_string)
                .map_err(GitError::git("list remote heads", path))
        })
        .collect::<GitResult<_>>()?;
    for name in &names {
        git.find_reference(name)
            .and_then(|mut reference| reference.delete())
            .map_err(GitError::git("drop remote head", path))?;
    }
    Ok(names.len())
}

fn current_branch_name(git: &Repository, path: &Path) -> GitResult<String> {
    let head = git.head().map_err(GitError::git("read HEAD", path))?;
    if !head.is_branch() {
        return Err(GitError::DetachedHead(path.to_path_buf()));
    }
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| GitError::DetachedHead(path.to_path_buf()))
}

fn current_local_branch<'repo>(git: &'repo Repository, path: &Path) -> GitResult<Branch<'repo>> {
    let name = current_branch_name(git, path)?;
    git.find_branch(&name, BranchType::Local)
        .map_err(GitError::git("find branch", path))
}

fn resolve_commit(git: &Repository, spec: &str, path: &Path) -> GitResult<Oid> {
    if matches!(spec, "@{u}" | "@{upstream}") {
        let branch = current_local_branch(git, path)?;
        let upstream = branch
            .upstream()
            .map_err(GitError::git("resolve upstream", path))?;
        let commit = upstream
            .get()
            .peel_to_commit()
            .map_err(GitError::git("resolve upstream", path))?;
        return Ok(commit.id());
    }
    let object = git
        .revparse_single(spec)
        .map_err(GitError::git("rev-parse", path))?;
    let commit = object
        .peel_to_commit()
        .map_err(GitError::git("rev-parse", path))?;
    Ok(commit.id())
}

/// True when `tip_ref` has commits missing from `base_ref`. A missing base
/// counts as divergent.
fn has_commits_outside(
    git: &Repository,
    tip_ref: &str,
    base_ref: &str,
    path: &Path,
) -> GitResult<bool> {
    let Ok(base) = git.refname_to_id(base_ref) else {
        debug!(path = %path.display(), base_ref, "comparison ref missing; treating as divergent");
        return Ok(true);
    };
    let tip = git
        .refname_to_id(tip_ref)
        .map_err(GitError::git("resolve ref", path))?;
    let (ahead, _) = git
        .graph_ahead_behind(tip, base)
        .map_err(GitError::git("compare refs", path))?;
    Ok(ahead > 0)
}

fn short_code(status: Status) -> String {
    if status.contains(Status::WT_NEW) {
        return "??".to_string();
    }
    if status.contains(Status::CONFLICTED) {
        return "UU".to_string();
    }
    let index = if status.contains(Status::INDEX_NEW) {
        'A'
    } else if status.contains(Status::INDEX_MODIFIED) {
        'M'
    } else if status.contains(Status::INDEX_DELETED) {
        'D'
    } else if status.contains(Status::INDEX_RENAMED) {
        'R'
    } else if status.contains(Status::INDEX_TYPECHANGE) {
        'T'
    } else {
        ' '
    };
    let worktree = if status.contains(Status::WT_MODIFIED) {
        'M'
    } else if status.contains(Status::WT_DELETED) {
        'D'
    } else if status.contains(Status::WT_RENAMED) {
        'R'
    } else if status.contains(Status::WT_TYPECHANGE) {
        'T'
    } else {
        ' '
    };
    format!("{index}{worktree}")
}
