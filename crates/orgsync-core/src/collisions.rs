use crate::model::RepoDescriptor;
use crate::paths::{build_host_path, flatten_provider_path, with_suffixes};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Names seen in one run, shared by every worker.
///
/// A `true` value marks a name (or a derived slug) that must not be used as a
/// directory again. `false` marks a name seen exactly once. The list of
/// colliding input names is fixed at detection time.
#[derive(Debug, Default)]
pub struct CollisionTable {
    names: Mutex<HashMap<String, bool>>,
    collided: Vec<String>,
}

impl CollisionTable {
    /// Scans the filtered set for duplicate names. Wikis and snippets never
    /// take part: wikis follow their repository and snippets carry their id
    /// in the directory name.
    pub fn detect(repos: &[RepoDescriptor], preserve_directory_structure: bool) -> Self {
        if preserve_directory_structure {
            return Self::default();
        }
        let mut names: HashMap<String, bool> = HashMap::new();
        for repo in repos {
            if repo.is_snippet || repo.is_wiki {
                continue;
            }
            match names.get_mut(&repo.name) {
                Some(seen) => *seen = true,
                None => {
                    names.insert(repo.name.clone(), false);
                }
            }
        }
        let mut collided: Vec<String> = names
            .iter()
            .filter(|(_, collided)| **collided)
            .map(|(name, _)| name.clone())
            .collect();
        collided.sort();
        Self {
            names: Mutex::new(names),
            collided,
        }
    }

    pub fn has_collisions(&self) -> bool {
        !self.collided.is_empty()
    }

    /// Input names that appeared more than once, sorted. Slugs claimed while
    /// resolving paths never show up here.
    pub fn collided_names(&self) -> Vec<String> {
        self.collided.clone()
    }

    fn is_collision(&self, name: &str) -> bool {
        self.lock().get(name).copied().unwrap_or(false)
    }

    /// Registers `slug` and returns `true` when it is free. Lookup and
    /// registration happen under the same guard. An empty slug is never free.
    fn claim(&self, slug: &str) -> bool {
        if slug.is_empty() {
            return false;
        }
        let mut names = self.lock();
        if names.contains_key(slug) {
            return false;
        }
        names.insert(slug.to_string(), true);
        true
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turns an initial slug into the run-unique directory for `repo`.
pub fn resolve_slug(
    table: &CollisionTable,
    repo: &RepoDescriptor,
    initial_slug: String,
    index: usize,
) -> String {
    if !table.has_collisions() || !table.is_collision(repo.collision_key()) {
        return with_suffixes(repo, initial_slug);
    }

    // Descriptors without a provider path fall back to the initial slug.
    let base = if repo.path.trim().is_empty() {
        initial_slug
    } else {
        flatten_provider_path(&repo.path)
    };
    let derived = with_suffixes(repo, base);
    let slug = if table.claim(&derived) {
        derived
    } else {
        format!("_{index}_{derived}")
    };
    with_suffixes(repo, slug)
}

pub fn resolve_host_path(
    root: &Path,
    table: &CollisionTable,
    repo: &RepoDescriptor,
    initial_slug: String,
    index: usize,
) -> PathBuf {
    let slug = resolve_slug(table, repo, initial_slug, index);
    build_host_path(root, repo, &slug)
}
