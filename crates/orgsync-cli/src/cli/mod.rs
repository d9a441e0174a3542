use anyhow::Context;
use clap::{Parser, ValueEnum};
use orgsync_core::config::{SyncConfig, SyncMode, default_config_path};
use orgsync_core::git_client::Git2Client;
use orgsync_core::model::RepoDescriptor;
use orgsync_core::orchestrator::{RunReport, run_sync};
use orgsync_core::prune::remove_untouched;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod args;
mod config_cmd;
mod summary;
mod sync_cmd;
#[cfg(test)]
mod tests;

use args::*;

use config_cmd::handle_config;
use sync_cmd::handle_sync;

pub fn run() -> anyhow::Result<ExitCode> {
    app::run()
}
