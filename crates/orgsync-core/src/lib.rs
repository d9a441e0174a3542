pub mod branch_sync;
pub mod collisions;
pub mod config;
pub mod git;
pub mod git_client;
pub mod model;
pub mod orchestrator;
pub mod paths;
pub mod processor;
pub mod prune;
pub mod run_lock;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use config::{SyncConfig, SyncMode};
pub use git::{GitError, GitPort};
pub use git_client::Git2Client;
pub use model::RepoDescriptor;
pub use orchestrator::{RunReport, run_sync};
