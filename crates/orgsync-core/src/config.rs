use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 25;

/// How existing clones are refreshed. Chosen once per run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Checkout, clean, hard-reset and pull the target branch.
    #[default]
    Standard,
    /// Only fetch; never touch the working tree.
    NoClean,
    /// Bare mirror clones refreshed with a mirror fetch.
    Backup,
    /// Only look for untouched clones; never clone or update.
    PruneUntouched,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Standard => "standard",
            SyncMode::NoClean => "no_clean",
            SyncMode::Backup => "backup",
            SyncMode::PruneUntouched => "prune_untouched",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub output_dir: PathBuf,
    pub mode: SyncMode,
    /// Branch explicitly requested by the user. Fresh clones check it out.
    pub branch: Option<String>,
    pub fetch_all: bool,
    pub sync_default_branch: bool,
    pub preserve_directory_structure: bool,
    /// Maximum worker count. Zero starts one worker per repository.
    pub concurrency: usize,
    pub clone_delay_secs: Option<u64>,
    pub clone_depth: Option<u32>,
    /// Clone and pull submodules recursively.
    pub include_submodules: bool,
    pub prune_untouched_no_confirm: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("repos"),
            mode: SyncMode::Standard,
            branch: None,
            fetch_all: false,
            sync_default_branch: false,
            preserve_directory_structure: false,
            concurrency: DEFAULT_CONCURRENCY,
            clone_delay_secs: None,
            clone_depth: None,
            include_submodules: false,
            prune_untouched_no_confirm: false,
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config = serde_json::from_str(&data).context("parse config")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create config directory")?;
        }
        let data = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, data).context("write config")?;
        Ok(())
    }

    pub fn clone_delay(&self) -> Option<Duration> {
        self.clone_delay_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Worker count for `repo_count` repositories. A clone delay only rate
    /// limits when repositories are processed one at a time.
    pub fn worker_count(&self, repo_count: usize) -> usize {
        if self.clone_delay().is_some() {
            return 1;
        }
        let requested = if self.concurrency == 0 {
            repo_count
        } else {
            self.concurrency
        };
        requested.max(1).min(repo_count.max(1))
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let project =
        ProjectDirs::from("com", "orgsync", "orgsync").context("resolve project dirs")?;
    Ok(project.config_dir().join("config.json"))
}
