use super::summary::print_report;
use super::*;

pub(super) fn handle_sync(args: SyncArgs, config_path: &Path) -> anyhow::Result<ExitCode> {
    let mut config = SyncConfig::load(config_path)?;
    args.apply(&mut config);
    let repos = load_repos(&args.repos, config.branch.as_deref())?;
    if repos.is_empty() {
        println!("No repositories to sync.");
        return Ok(ExitCode::SUCCESS);
    }

    let config = Arc::new(config);
    let git = Git2Client::from_config(&config);
    let mut report = run_sync(git, Arc::clone(&config), repos)?;
    if config.mode == SyncMode::PruneUntouched {
        prune_untouched(&config, &mut report)?;
    }

    if args.json {
        let rendered = serde_json::to_string_pretty(&report).context("serialize run report")?;
        println!("{rendered}");
    } else {
        print_report(&report);
    }
    Ok(if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Reads the descriptor list. A missing clone URL falls back to the browse
/// URL and `branch_override` replaces every clone branch.
pub(super) fn load_repos(
    path: &Path,
    branch_override: Option<&str>,
) -> anyhow::Result<Vec<RepoDescriptor>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read repository list {}", path.display()))?;
    let mut repos: Vec<RepoDescriptor> = serde_json::from_str(&data)
        .with_context(|| format!("parse repository list {}", path.display()))?;
    for repo in &mut repos {
        if repo.clone_url.is_empty() {
            repo.clone_url = repo.url.clone();
        }
        if let Some(branch) = branch_override {
            repo.clone_branch = branch.to_string();
        }
        if repo.clone_branch.is_empty() {
            anyhow::bail!(
                "repository {} has no clone_branch; set one or pass --branch",
                repo.name
            );
        }
    }
    Ok(repos)
}

fn prune_untouched(config: &SyncConfig, report: &mut RunReport) -> anyhow::Result<()> {
    let untouched = report.stats.untouched.clone();
    if untouched.is_empty() {
        println!("No untouched repositories found.");
        return Ok(());
    }
    println!("Untouched repositories:");
    for path in &untouched {
        println!("  {}", path.display());
    }

    if !config.prune_untouched_no_confirm {
        if !io::stdin().is_terminal() {
            println!("Not removing anything: confirmation needs a terminal (pass --yes to skip it).");
            return Ok(());
        }
        let prompt = format!("Remove {} untouched repositories?", untouched.len());
        let confirmed = confirm(&prompt, &mut io::stdin().lock(), &mut io::stdout())
            .context("read prune confirmation")?;
        if !confirmed {
            println!("No repositories removed.");
            return Ok(());
        }
    }

    let pruned = remove_untouched(&config.output_dir, &untouched)?;
    for failure in &pruned.failures {
        warn!(path = %failure.path.display(), error = %failure.error, "prune failed");
        report.stats.errors.push(format!(
            "Failed to remove untouched repository {}: {}",
            failure.path.display(),
            failure.error
        ));
    }
    report.record_untouched_pruned(pruned.removed_count());
    info!(removed = pruned.removed.len(), "untouched repositories pruned");
    Ok(())
}

pub(super) fn confirm<R: BufRead, W: Write>(
    prompt: &str,
    input: &mut R,
    output: &mut W,
) -> io::Result<bool> {
    write!(output, "{} (y/N) ", prompt.trim())?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
