use super::summary::{format_duration, summary_line};
use super::sync_cmd::{confirm, load_repos};
use super::*;
use orgsync_core::stats::StatsSnapshot;
use tempfile::TempDir;

#[test]
fn sync_flags_parse() {
    let cli = Cli::try_parse_from([
        "orgsync",
        "--verbose",
        "sync",
        "--repos",
        "repos.json",
        "--mode",
        "prune-untouched",
        "--concurrency",
        "0",
        "--yes",
    ])
    .unwrap();
    assert!(cli.verbose);
    match cli.command {
        Commands::Sync(args) => {
            assert_eq!(args.repos, PathBuf::from("repos.json"));
            assert_eq!(args.mode, Some(SyncModeValue::PruneUntouched));
            assert_eq!(args.concurrency, Some(0));
            assert!(args.yes);
        }
        _ => panic!("expected sync command"),
    }
}

#[test]
fn sync_requires_repo_list() {
    assert!(Cli::try_parse_from(["orgsync", "sync"]).is_err());
}

#[test]
fn flags_override_file_config() {
    let cli = Cli::try_parse_from([
        "orgsync",
        "sync",
        "--repos",
        "r.json",
        "--output-dir",
        "/srv/clones",
        "--mode",
        "backup",
        "--branch",
        "develop",
        "--clone-delay",
        "5",
        "--include-submodules",
    ])
    .unwrap();
    let Commands::Sync(args) = cli.command else {
        panic!("expected sync command");
    };
    let mut config = SyncConfig {
        fetch_all: true,
        concurrency: 8,
        ..SyncConfig::default()
    };
    args.apply(&mut config);

    assert_eq!(config.output_dir, PathBuf::from("/srv/clones"));
    assert_eq!(config.mode, SyncMode::Backup);
    assert_eq!(config.branch.as_deref(), Some("develop"));
    assert!(config.fetch_all);
    assert_eq!(config.concurrency, 8);
    assert_eq!(config.clone_delay_secs, Some(5));
    assert!(config.include_submodules);
    assert_eq!(config.worker_count(10), 1);
}

#[test]
fn repo_list_fills_clone_url_and_branch() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("repos.json");
    fs::write(
        &path,
        r#"[
            {"name": "api", "url": "https://example.com/org/api.git", "clone_branch": "main"},
            {"name": "web", "url": "https://example.com/org/web.git", "clone_url": "https://t@example.com/org/web.git"}
        ]"#,
    )
    .unwrap();

    let repos = load_repos(&path, Some("release")).unwrap();
    assert_eq!(repos[0].clone_url, "https://example.com/org/api.git");
    assert_eq!(repos[1].clone_url, "https://t@example.com/org/web.git");
    assert!(repos.iter().all(|repo| repo.clone_branch == "release"));

    let err = load_repos(&path, None).unwrap_err();
    assert!(err.to_string().contains("web"));
}

#[test]
fn duration_formats() {
    assert_eq!(format_duration(0), "0s");
    assert_eq!(format_duration(59), "59s");
    assert_eq!(format_duration(60), "1m");
    assert_eq!(format_duration(125), "2m5s");
}

#[test]
fn summary_line_shows_only_relevant_counters() {
    let mut stats = StatsSnapshot {
        cloned: 3,
        pulled: 2,
        total_duration_secs: 7,
        ..StatsSnapshot::default()
    };
    assert_eq!(
        summary_line(&stats),
        "New clones: 3, existing resources pulled: 2 (completed in 7s)"
    );

    stats.new_commits = 4;
    assert_eq!(
        summary_line(&stats),
        "New clones: 3, existing resources pulled: 2, total new commits: 4 (completed in 7s)"
    );

    stats.new_commits = 0;
    stats.remote_updated = 5;
    stats.total_duration_secs = 90;
    assert_eq!(
        summary_line(&stats),
        "New clones: 3, existing resources pulled: 2, total new commits: 0, remotes updated: 5 (completed in 1m30s)"
    );

    stats.remote_updated = 0;
    stats.untouched_pruned = 2;
    assert!(summary_line(&stats).contains("total prunes: 2"));
}

#[test]
fn confirmation_accepts_yes_only() {
    let mut output = Vec::new();
    assert!(confirm("Remove?", &mut "y\n".as_bytes(), &mut output).unwrap());
    assert!(confirm("Remove?", &mut "YES\n".as_bytes(), &mut output).unwrap());
    assert!(!confirm("Remove?", &mut "\n".as_bytes(), &mut output).unwrap());
    assert!(!confirm("Remove?", &mut "nope\n".as_bytes(), &mut output).unwrap());
    assert!(String::from_utf8(output).unwrap().starts_with("Remove? (y/N) "));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    let init = |force: bool| ConfigArgs {
        command: ConfigCommands::Init(InitArgs {
            output_dir: tmp.path().join("clones"),
            force,
        }),
    };

    handle_config(init(false), &path).unwrap();
    assert!(handle_config(init(false), &path).is_err());
    handle_config(init(true), &path).unwrap();
    assert_eq!(
        SyncConfig::load(&path).unwrap().output_dir,
        tmp.path().join("clones")
    );
}
