//! CLI command implementations.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use tramp::core::types::SeverityTotals;
use tramp::io::archive::{list_archives, verify_manifest};

use crate::report::{aggregate, load_archives};

/// List archived sessions, oldest first.
pub fn list_sessions(archive_dir: &Path) -> Result<()> {
    let (archives, warnings) = load_archives(archive_dir)?;
    for archive in &archives {
        let record = &archive.record;
        let name = archive
            .dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "list: {} session={} branch={} targets={} {}",
            name,
            record.session_id,
            record.branch,
            record.targets.len(),
            totals_line(&record.totals)
        );
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

/// Show per-target statistics aggregated across archives.
pub fn report_targets(archive_dir: &Path, only: Option<&str>, json: bool) -> Result<()> {
    let (summary, warnings) = aggregate(archive_dir, only)?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    if json {
        let out = serde_json::to_string_pretty(&summary).context("serialize report")?;
        println!("{out}");
        return Ok(());
    }
    println!(
        "report: archives={} targets={}",
        summary.archives,
        summary.targets.len()
    );
    for (branch, count) in &summary.branches {
        println!("report: branch {branch} sessions={count}");
    }
    for target in summary.targets.values() {
        let averaged = &target.averaged;
        let ratio = averaged
            .return_ratio()
            .map_or_else(|| "n/a".to_string(), |ratio| format!("{ratio:.3}"));
        println!(
            "report: target {} ({}) sessions={} iterations={} avg_secs={:.1} warnings={} errors={} exceptions={} wagered={:.2} returned={:.2} return_ratio={} severity={}",
            target.name,
            target.key,
            target.sessions,
            target.iterations,
            averaged.elapsed_secs(),
            averaged.warnings,
            averaged.errors,
            averaged.exceptions,
            averaged.coins_wagered,
            averaged.coins_returned(),
            ratio,
            averaged.severity_class().label()
        );
    }
    println!("report: {}", totals_line(&summary.totals));
    Ok(())
}

/// Re-hash every archive against its manifest. Fails if any archive is damaged.
pub fn verify_archives(archive_dir: &Path) -> Result<()> {
    let mut damaged = 0;
    let archives = list_archives(archive_dir)?;
    for dir in &archives {
        let problems = verify_manifest(dir)
            .with_context(|| format!("verify {}", dir.display()))?;
        if problems.is_empty() {
            println!("verify: ok {}", dir.display());
            continue;
        }
        damaged += 1;
        for problem in problems {
            println!("verify: damaged {} {}", dir.display(), problem);
        }
    }
    debug!(archives = archives.len(), damaged, "archives verified");
    if damaged > 0 {
        bail!("{damaged} of {} archives failed verification", archives.len());
    }
    Ok(())
}

/// Remove all but the `keep` most recent archives.
pub fn clean_archives(archive_dir: &Path, keep: usize) -> Result<()> {
    let archives = list_archives(archive_dir)?;
    let remove = archives.len().saturating_sub(keep);
    for dir in &archives[..remove] {
        fs::remove_dir_all(dir).with_context(|| format!("remove {}", dir.display()))?;
        info!(archive = %dir.display(), "archive removed");
    }
    println!(
        "clean: removed={} kept={} archive={}",
        remove,
        archives.len() - remove,
        archive_dir.display()
    );
    Ok(())
}

fn totals_line(totals: &SeverityTotals) -> String {
    format!(
        "clean={} warning={} error={} exception={}",
        totals.clean, totals.warning, totals.error, totals.exception
    )
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use tramp::io::paths::SessionPaths;
    use tramp::io::store::SessionStore;
    use tramp::session::Session;
    use tramp::test_support::quick_config;

    use super::*;

    fn archive_empty_session(root: &Path, branch: &str) {
        let mut config = quick_config(1);
        config.session.branch = branch.to_string();
        let session = Session::new(&config, Some(SessionStore::new(SessionPaths::new(root, None))));
        session.checkpoint();
        session.archive().expect("archive");
    }

    #[test]
    fn clean_keeps_most_recent() {
        let temp = tempdir().expect("tempdir");
        for branch in ["a", "b", "c"] {
            archive_empty_session(temp.path(), branch);
        }
        let archive_dir = temp.path().join("archive");
        let before = list_archives(&archive_dir).expect("list");
        assert_eq!(before.len(), 3);

        clean_archives(&archive_dir, 1).expect("clean");
        let after = list_archives(&archive_dir).expect("list");
        assert_eq!(after, before[2..].to_vec());

        clean_archives(&archive_dir, 5).expect("clean no-op");
        assert_eq!(list_archives(&archive_dir).expect("list").len(), 1);
    }

    #[test]
    fn verify_fails_on_damaged_archive() {
        let temp = tempdir().expect("tempdir");
        archive_empty_session(temp.path(), "main");
        let archive_dir = temp.path().join("archive");
        verify_archives(&archive_dir).expect("intact");

        let dir = &list_archives(&archive_dir).expect("list")[0];
        fs::remove_file(dir.join("complete_test_plan.json")).expect("remove");
        let err = verify_archives(&archive_dir).expect_err("damaged");
        assert!(err.to_string().contains("1 of 1 archives"));
    }
}
