use orgsync_core::orchestrator::RunReport;
use orgsync_core::stats::StatsSnapshot;

pub(super) fn format_duration(secs: u64) -> String {
    if secs < 60 {
        return format!("{secs}s");
    }
    let (minutes, seconds) = (secs / 60, secs % 60);
    if seconds == 0 {
        format!("{minutes}m")
    } else {
        format!("{minutes}m{seconds}s")
    }
}

/// One-line run summary. Optional counters only appear when non-zero, except
/// that remote updates always show the commit total alongside.
pub(super) fn summary_line(stats: &StatsSnapshot) -> String {
    let mut line = format!(
        "New clones: {}, existing resources pulled: {}",
        stats.cloned, stats.pulled
    );
    if stats.new_commits > 0 || stats.remote_updated > 0 {
        line.push_str(&format!(", total new commits: {}", stats.new_commits));
    }
    if stats.remote_updated > 0 {
        line.push_str(&format!(", remotes updated: {}", stats.remote_updated));
    }
    if stats.untouched_pruned > 0 {
        line.push_str(&format!(", total prunes: {}", stats.untouched_pruned));
    }
    line.push_str(&format!(
        " (completed in {})",
        format_duration(stats.total_duration_secs)
    ));
    line
}

pub(super) fn print_report(report: &RunReport) {
    if report.has_collisions {
        println!(
            "Name collisions detected for: {}. Those repositories were cloned into directories named after their full path.",
            report.collided_names.join(", ")
        );
    }
    if !report.stats.infos.is_empty() {
        println!();
        println!("Info:");
        for message in &report.stats.infos {
            println!("  {message}");
        }
    }
    if !report.stats.errors.is_empty() {
        println!();
        println!("Errors:");
        for message in &report.stats.errors {
            println!("  {message}");
        }
    }
    println!();
    println!("{}", summary_line(&report.stats));
}
