use anyhow::{Context, bail};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default, Serialize)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<PruneFailure>,
}

#[derive(Debug, Serialize)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub error: String,
}

impl PruneReport {
    pub fn removed_count(&self) -> u32 {
        u32::try_from(self.removed.len()).unwrap_or(u32::MAX)
    }
}

/// Deletes each untouched clone below `root`. Paths that resolve outside
/// the root, or to the root itself, are reported as failures and left alone.
pub fn remove_untouched(root: &Path, paths: &[PathBuf]) -> anyhow::Result<PruneReport> {
    let root = root
        .canonicalize()
        .with_context(|| format!("resolve destination root {}", root.display()))?;
    let mut report = PruneReport::default();
    for path in paths {
        match remove_one(&root, path) {
            Ok(true) => {
                info!(path = %path.display(), "pruned untouched clone");
                report.removed.push(path.clone());
            }
            Ok(false) => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not prune clone");
                report.failures.push(PruneFailure {
                    path: path.clone(),
                    error: format!("{err:#}"),
                });
            }
        }
    }
    Ok(report)
}

/// Returns `false` when the directory is already gone.
fn remove_one(root: &Path, path: &Path) -> anyhow::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let resolved = path
        .canonicalize()
        .with_context(|| format!("resolve {}", path.display()))?;
    if resolved == root || !resolved.starts_with(root) {
        bail!(
            "refusing to remove {}: not inside {}",
            resolved.display(),
            root.display()
        );
    }
    fs::remove_dir_all(&resolved).context("remove clone directory")?;
    Ok(true)
}
