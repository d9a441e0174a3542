use crate::collisions::CollisionTable;
use crate::config::SyncConfig;
use crate::git::GitPort;
use crate::model::RepoDescriptor;
use crate::processor::{RepoOutcome, RepositoryProcessor, SignalKind};
use crate::run_lock::RunLock;
use crate::stats::StatsSnapshot;
use anyhow::Context;
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Instant;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{Span, debug, info, info_span, warn};
use uuid::Uuid;

enum RepoSignal {
    Started { index: usize, name: String },
    Finished(RepoResult),
}

/// Terminal result for one repository, in the shape handed to reporting.
#[derive(Clone, Debug, Serialize)]
pub struct RepoResult {
    pub index: usize,
    pub name: String,
    pub host_path: PathBuf,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub kind: SignalKind,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SignalTally {
    pub success: usize,
    pub info: usize,
    pub error: usize,
}

impl SignalTally {
    fn record(&mut self, kind: SignalKind) {
        match kind {
            SignalKind::Success => self.success += 1,
            SignalKind::Info => self.info += 1,
            SignalKind::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.info + self.error
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub mode: &'static str,
    pub stats: StatsSnapshot,
    pub signals: SignalTally,
    pub has_collisions: bool,
    pub collided_names: Vec<String>,
    /// One entry per repository, in input order.
    pub results: Vec<RepoResult>,
}

impl RunReport {
    pub fn record_untouched_pruned(&mut self, count: u32) {
        self.stats.untouched_pruned += count;
    }

    pub fn has_errors(&self) -> bool {
        self.signals.error > 0 || !self.stats.errors.is_empty()
    }
}

/// Runs one synchronization pass over `repos` and waits for every repository
/// to report back.
///
/// Setup failures (destination root, run lock) are returned before any
/// repository is touched. Per-repository failures only show up in the report.
pub fn run_sync<G>(
    git: G,
    config: Arc<SyncConfig>,
    repos: Vec<RepoDescriptor>,
) -> anyhow::Result<RunReport>
where
    G: GitPort + 'static,
{
    let started = Instant::now();
    let started_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format run start time")?;
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("sync_run", run_id = %run_id);
    let _entered = span.enter();

    let _lock = RunLock::acquire(&config.output_dir, &run_id)?;
    let collisions = CollisionTable::detect(&repos, config.preserve_directory_structure);
    if collisions.has_collisions() {
        info!(
            names = ?collisions.collided_names(),
            "repository name collisions detected, colliding clones use their full path"
        );
    }

    let total = repos.len();
    let workers = config.worker_count(total);
    info!(
        repos = total,
        workers,
        mode = config.mode.as_str(),
        root = %config.output_dir.display(),
        "sync run started"
    );

    let processor = Arc::new(RepositoryProcessor::new(
        git,
        Arc::clone(&config),
        collisions,
    ));
    let (signals, mut results) = dispatch(&processor, repos, workers, &span)?;
    results.sort_by_key(|result| result.index);

    processor
        .stats()
        .set_total_duration(started.elapsed().as_secs_f64().round() as u64);
    let stats = processor.stats().snapshot();
    info!(
        cloned = stats.cloned,
        pulled = stats.pulled,
        remote_updated = stats.remote_updated,
        new_commits = stats.new_commits,
        infos = signals.info,
        errors = signals.error,
        duration_secs = stats.total_duration_secs,
        "sync run finished"
    );

    Ok(RunReport {
        run_id,
        started_at,
        mode: config.mode.as_str(),
        stats,
        signals,
        has_collisions: processor.collisions().has_collisions(),
        collided_names: processor.collisions().collided_names(),
        results,
    })
}

fn dispatch<G>(
    processor: &Arc<RepositoryProcessor<G>>,
    repos: Vec<RepoDescriptor>,
    workers: usize,
    span: &Span,
) -> anyhow::Result<(SignalTally, Vec<RepoResult>)>
where
    G: GitPort + 'static,
{
    let total = repos.len();
    let mut tally = SignalTally::default();
    let mut results = Vec::with_capacity(total);
    if total == 0 {
        return Ok((tally, results));
    }

    let queue: Arc<Mutex<VecDeque<(usize, RepoDescriptor)>>> =
        Arc::new(Mutex::new(repos.into_iter().enumerate().collect()));
    let (tx, rx) = mpsc::channel::<RepoSignal>();
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let processor = Arc::clone(processor);
        let span = span.clone();
        let spawned = thread::Builder::new()
            .name(format!("orgsync-worker-{worker}"))
            .spawn(move || {
                let _entered = span.enter();
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some((index, mut repo)) = next else {
                        break;
                    };
                    let _ = tx.send(RepoSignal::Started {
                        index,
                        name: repo.name.clone(),
                    });
                    let result = process_guarded(&processor, &mut repo, index);
                    if tx.send(RepoSignal::Finished(result)).is_err() {
                        break;
                    }
                }
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) if !handles.is_empty() => {
                warn!(worker, error = %err, "could not spawn worker, continuing with fewer");
                break;
            }
            Err(err) => return Err(err).context("spawn sync worker"),
        }
    }
    drop(tx);

    while tally.total() < total {
        match rx.recv() {
            Ok(RepoSignal::Started { index, name }) => {
                debug!(repo = %name, index, "repo started");
            }
            Ok(RepoSignal::Finished(result)) => {
                tally.record(result.kind);
                results.push(result);
            }
            Err(_) => {
                warn!(
                    received = tally.total(),
                    expected = total,
                    "workers exited before every repository reported"
                );
                break;
            }
        }
    }

    for handle in handles {
        if handle.join().is_err() {
            warn!("sync worker exited with a panic");
        }
    }
    Ok((tally, results))
}

/// Every repository produces exactly one result, even when processing panics.
fn process_guarded<G: GitPort>(
    processor: &RepositoryProcessor<G>,
    repo: &mut RepoDescriptor,
    index: usize,
) -> RepoResult {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(repo, index))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = format!(
                "Processing panicked for {}: {}",
                repo.name,
                panic_message(payload.as_ref())
            );
            warn!(repo = %repo.name, error = %message, "repo processing panicked");
            processor.stats().add_error(message.clone());
            RepoOutcome::Failed(message)
        }
    };
    let message = match &outcome {
        RepoOutcome::Info(message) | RepoOutcome::Failed(message) => Some(message.clone()),
        _ => None,
    };
    RepoResult {
        index,
        name: repo.name.clone(),
        host_path: repo.host_path.clone(),
        outcome: outcome.as_str(),
        message,
        kind: outcome.signal(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncMode;
    use crate::test_support::FakeGit;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn config(tmp: &TempDir, concurrency: usize) -> Arc<SyncConfig> {
        Arc::new(SyncConfig {
            output_dir: tmp.path().join("clones"),
            concurrency,
            ..SyncConfig::default()
        })
    }

    fn repos(count: usize) -> Vec<RepoDescriptor> {
        (0..count)
            .map(|i| {
                RepoDescriptor::new(
                    format!("repo-{i}"),
                    format!("https://example.com/org/repo-{i}.git"),
                    "main",
                )
            })
            .collect()
    }

    #[test]
    fn every_repo_reports_exactly_once() {
        let tmp = TempDir::new().unwrap();
        let git = FakeGit::new().failing_repo("repo-3").failing_repo("repo-7");
        let report = run_sync(git, config(&tmp, 4), repos(20)).unwrap();

        assert_eq!(report.signals.total(), 20);
        assert_eq!(report.signals.error, 2);
        assert_eq!(report.signals.success, 18);
        assert_eq!(report.stats.cloned, 18);
        assert_eq!(report.stats.errors.len(), 2);
        assert!(report.has_errors());

        let indexes: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        assert_eq!(indexes, (0..20).collect::<Vec<_>>());
        assert!(report.started_at.contains('T') && report.started_at.ends_with('Z'));
    }

    #[test]
    fn unbounded_concurrency_spawns_worker_per_repo() {
        let tmp = TempDir::new().unwrap();
        let report = run_sync(FakeGit::new(), config(&tmp, 0), repos(12)).unwrap();
        assert_eq!(report.signals.success, 12);
        assert!(!report.has_errors());
    }

    #[test]
    fn panicking_repo_becomes_error_signal() {
        let tmp = TempDir::new().unwrap();
        let git = FakeGit::new().panicking_repo("repo-1");
        let report = run_sync(git, config(&tmp, 2), repos(5)).unwrap();

        assert_eq!(report.signals.total(), 5);
        assert_eq!(report.signals.error, 1);
        assert_eq!(report.stats.cloned, 4);
        assert!(report.stats.errors[0].contains("repo-1"));
        assert_eq!(report.results[1].outcome, "failed");
    }

    #[test]
    fn colliding_names_get_distinct_paths() {
        let tmp = TempDir::new().unwrap();
        let repos = vec![
            RepoDescriptor::new("api", "https://gitlab.example.com/g1/api.git", "main")
                .with_path("g1/api"),
            RepoDescriptor::new("api", "https://gitlab.example.com/g2/api.git", "main")
                .with_path("g2/api"),
            RepoDescriptor::new("web", "https://gitlab.example.com/g1/web.git", "main")
                .with_path("g1/web"),
        ];
        let report = run_sync(FakeGit::new(), config(&tmp, 3), repos).unwrap();

        assert!(report.has_collisions);
        assert_eq!(report.collided_names, vec!["api".to_string()]);
        let paths: HashSet<PathBuf> = report.results.iter().map(|r| r.host_path.clone()).collect();
        assert_eq!(paths.len(), 3);
        let root = tmp.path().join("clones");
        assert_eq!(report.results[0].host_path, root.join("g1_api"));
        assert_eq!(report.results[1].host_path, root.join("g2_api"));
        assert_eq!(report.results[2].host_path, root.join("web"));
    }

    #[test]
    fn concurrent_run_on_same_root_is_refused() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, 1);
        let _held = RunLock::acquire(&config.output_dir, "other-run").unwrap();

        let err = run_sync(FakeGit::new(), config, repos(1)).unwrap_err();
        assert!(err.to_string().contains("already holds"));
    }

    #[test]
    fn empty_input_finishes_immediately() {
        let tmp = TempDir::new().unwrap();
        let report = run_sync(FakeGit::new(), config(&tmp, 4), Vec::new()).unwrap();
        assert_eq!(report.signals.total(), 0);
        assert!(report.results.is_empty());
    }

    #[test]
    fn prune_mode_reports_untouched_clones() {
        let tmp = TempDir::new().unwrap();
        let config = Arc::new(SyncConfig {
            mode: SyncMode::PruneUntouched,
            ..(*config(&tmp, 2)).clone()
        });
        std::fs::create_dir_all(config.output_dir.join("repo-0")).unwrap();

        let report = run_sync(FakeGit::new(), config.clone(), repos(3)).unwrap();
        assert_eq!(report.stats.untouched, vec![config.output_dir.join("repo-0")]);
        assert_eq!(report.stats.cloned, 0);
        assert_eq!(report.signals.success, 3);
    }
}
