use super::*;

#[derive(Parser)]
#[command(author, version, about = "Clone and refresh many repositories into one directory tree")]
pub(super) struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to the platform config dir)")]
    pub(super) config: Option<PathBuf>,
    #[arg(long, short, global = true, help = "Enable debug logging")]
    pub(super) verbose: bool,
    #[command(subcommand)]
    pub(super) command: Commands,
}

#[derive(clap::Subcommand)]
pub(super) enum Commands {
    #[command(about = "Clone or update every repository in a descriptor list")]
    Sync(SyncArgs),
    #[command(about = "Manage config")]
    Config(ConfigArgs),
}

#[derive(Parser)]
pub(super) struct SyncArgs {
    #[arg(long, help = "JSON file holding the repository descriptor list")]
    pub(super) repos: PathBuf,
    #[arg(long, help = "Destination root for clones")]
    pub(super) output_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub(super) mode: Option<SyncModeValue>,
    #[arg(long, help = "Branch to check out for every repository")]
    pub(super) branch: Option<String>,
    #[arg(long, help = "Fetch every remote after clone and before update")]
    pub(super) fetch_all: bool,
    #[arg(long, help = "Fast-forward the default branch when it holds no local work")]
    pub(super) sync_default_branch: bool,
    #[arg(long, help = "Mirror the provider path under the destination root")]
    pub(super) preserve_dir: bool,
    #[arg(long, help = "Maximum parallel workers, 0 for one per repository")]
    pub(super) concurrency: Option<usize>,
    #[arg(long, help = "Seconds to wait before each repository (forces one worker)")]
    pub(super) clone_delay: Option<u64>,
    #[arg(long, help = "Shallow clone depth")]
    pub(super) clone_depth: Option<u32>,
    #[arg(long, help = "Clone and pull submodules recursively")]
    pub(super) include_submodules: bool,
    #[arg(long, short = 'y', help = "Remove untouched clones without asking")]
    pub(super) yes: bool,
    #[arg(long, help = "Print the run report as JSON")]
    pub(super) json: bool,
}

impl SyncArgs {
    /// Applies explicit flags on top of the file config.
    pub(super) fn apply(&self, config: &mut SyncConfig) {
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(branch) = &self.branch {
            config.branch = Some(branch.clone());
        }
        config.fetch_all |= self.fetch_all;
        config.sync_default_branch |= self.sync_default_branch;
        config.preserve_directory_structure |= self.preserve_dir;
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(delay) = self.clone_delay {
            config.clone_delay_secs = Some(delay);
        }
        if let Some(depth) = self.clone_depth {
            config.clone_depth = Some(depth);
        }
        config.include_submodules |= self.include_submodules;
        config.prune_untouched_no_confirm |= self.yes;
    }
}

#[derive(Parser)]
pub(super) struct ConfigArgs {
    #[command(subcommand)]
    pub(super) command: ConfigCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum ConfigCommands {
    #[command(about = "Write a config file with defaults and the given destination root")]
    Init(InitArgs),
    #[command(about = "Print the effective config")]
    Show,
}

#[derive(Parser)]
pub(super) struct InitArgs {
    #[arg(long)]
    pub(super) output_dir: PathBuf,
    #[arg(long, help = "Overwrite an existing config file")]
    pub(super) force: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(super) enum SyncModeValue {
    Standard,
    NoClean,
    Backup,
    PruneUntouched,
}

impl From<SyncModeValue> for SyncMode {
    fn from(value: SyncModeValue) -> Self {
        match value {
            SyncModeValue::Standard => SyncMode::Standard,
            SyncModeValue::NoClean => SyncMode::NoClean,
            SyncModeValue::Backup => SyncMode::Backup,
            SyncModeValue::PruneUntouched => SyncMode::PruneUntouched,
        }
    }
}
