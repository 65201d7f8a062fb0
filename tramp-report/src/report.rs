use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use tramp::core::statistics::{RunStatistics, average};
use tramp::core::types::SeverityTotals;
use tramp::io::archive::{list_archives, verify_manifest};
use tramp::io::paths::SESSION_FILE;
use tramp::io::store::{SessionRecord, load_session_file};

/// One target's runs pooled across every archived session.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    pub key: String,
    pub name: String,
    pub sessions: usize,
    pub iterations: usize,
    pub averaged: RunStatistics,
}

#[derive(Debug, Default, Serialize)]
pub struct ReportSummary {
    pub archives: usize,
    pub branches: BTreeMap<String, usize>,
    pub targets: BTreeMap<String, TargetSummary>,
    pub totals: SeverityTotals,
}

/// An archived session that passed its manifest check and parsed.
#[derive(Debug)]
pub struct LoadedArchive {
    pub dir: PathBuf,
    pub record: SessionRecord,
}

/// Load every archived session under `archive_dir`.
///
/// Archives whose manifest reports missing or corrupted files, or whose
/// `session.json` does not parse, are skipped with a warning. An archive
/// without a readable manifest is still loaded, with a warning.
pub fn load_archives(archive_dir: &Path) -> Result<(Vec<LoadedArchive>, Vec<String>)> {
    let mut loaded = Vec::new();
    let mut warnings = Vec::new();

    for dir in list_archives(archive_dir)? {
        match verify_manifest(&dir) {
            Ok(problems) if !problems.is_empty() => {
                let problems: Vec<String> = problems.iter().map(ToString::to_string).collect();
                warnings.push(format!(
                    "skip {}: manifest check failed ({})",
                    dir.display(),
                    problems.join(", ")
                ));
                continue;
            }
            Ok(_) => {}
            Err(err) => warnings.push(format!("{}: unverified ({err:#})", dir.display())),
        }

        match load_session_file(&dir.join(SESSION_FILE)) {
            Ok(record) => loaded.push(LoadedArchive { dir, record }),
            Err(err) => warnings.push(format!(
                "skip {}: {SESSION_FILE} invalid ({err:#})",
                dir.display()
            )),
        }
    }
    Ok((loaded, warnings))
}

/// Aggregate per-target statistics across archived sessions, optionally
/// restricted to one target key.
pub fn aggregate(archive_dir: &Path, only: Option<&str>) -> Result<(ReportSummary, Vec<String>)> {
    let (archives, warnings) = load_archives(archive_dir)?;
    let mut summary = ReportSummary {
        archives: archives.len(),
        ..ReportSummary::default()
    };

    let mut pooled: BTreeMap<String, (String, usize, Vec<RunStatistics>)> = BTreeMap::new();
    for archive in &archives {
        *summary
            .branches
            .entry(archive.record.branch.clone())
            .or_insert(0) += 1;
        for target in archive.record.targets.values() {
            if only.is_some_and(|key| key != target.key) || target.runs.is_empty() {
                continue;
            }
            let entry = pooled
                .entry(target.key.clone())
                .or_insert_with(|| (target.name.clone(), 0, Vec::new()));
            entry.1 += 1;
            entry
                .2
                .extend(target.runs.iter().map(|run| run.statistics.clone()));
        }
    }

    for (key, (name, sessions, runs)) in pooled {
        let Some(averaged) = average(&runs) else {
            continue;
        };
        summary.totals.bump(averaged.severity_class());
        debug!(target_key = %key, sessions, iterations = runs.len(), "target aggregated");
        summary.targets.insert(
            key.clone(),
            TargetSummary {
                key,
                name,
                sessions,
                iterations: runs.len(),
                averaged,
            },
        );
    }
    Ok((summary, warnings))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;
    use tramp::core::mode::Mode;
    use tramp::core::types::Severity;
    use tramp::io::config::TrampConfig;
    use tramp::io::paths::SessionPaths;
    use tramp::io::store::SessionStore;
    use tramp::session::Session;
    use tramp::test_support::{StaticCatalog, quick_config};

    use super::*;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(&[
            ("fortune_reels", "Fortune Reels"),
            ("golden_dragon", "Golden Dragon"),
        ])
    }

    /// Run one finished iteration per `(key, exceptions)` pair and archive
    /// the session under `root`.
    fn archive_session(root: &Path, config: &TrampConfig, runs: &[(&str, u32)]) -> PathBuf {
        let paths = SessionPaths::new(root, None);
        let mut session = Session::new(config, Some(SessionStore::new(paths)));
        for (key, exceptions) in runs {
            session.enqueue(&catalog(), key).expect("queued");
            session.start_next(0).expect("start");
            session.begin_active();
            session.count_spin(2.0, false);
            for _ in 0..*exceptions {
                session.add_log(Mode::BaseGameplay, Severity::Exception, "reel crash", None);
            }
            session.end_active(Mode::BaseGameplay, false);
        }
        session.archive().expect("archive")
    }

    fn config(branch: &str) -> TrampConfig {
        let mut config = quick_config(3);
        config.session.branch = branch.to_string();
        config
    }

    #[test]
    fn pools_runs_across_archives() {
        let temp = tempdir().expect("tempdir");
        archive_session(
            temp.path(),
            &config("main"),
            &[("fortune_reels", 0), ("golden_dragon", 0)],
        );
        archive_session(temp.path(), &config("release"), &[("fortune_reels", 1)]);

        let (summary, warnings) =
            aggregate(&temp.path().join("archive"), None).expect("aggregate");
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(summary.archives, 2);
        assert_eq!(summary.branches.get("main"), Some(&1));
        assert_eq!(summary.branches.get("release"), Some(&1));

        let fortune = &summary.targets["fortune_reels"];
        assert_eq!(fortune.sessions, 2);
        assert_eq!(fortune.iterations, 2);
        // One exception over two runs rounds up.
        assert_eq!(fortune.averaged.exceptions, 1);
        assert_eq!(fortune.averaged.coins_wagered, 2.0);
        assert_eq!(summary.totals.exception, 1);
        assert_eq!(summary.totals.clean, 1);
    }

    #[test]
    fn filters_by_target_key() {
        let temp = tempdir().expect("tempdir");
        archive_session(
            temp.path(),
            &config("main"),
            &[("fortune_reels", 0), ("golden_dragon", 2)],
        );

        let (summary, _) = aggregate(&temp.path().join("archive"), Some("golden_dragon"))
            .expect("aggregate");
        assert_eq!(summary.targets.len(), 1);
        assert_eq!(summary.targets["golden_dragon"].averaged.exceptions, 2);
    }

    #[test]
    fn corrupted_archive_is_skipped() {
        let temp = tempdir().expect("tempdir");
        let dir = archive_session(temp.path(), &config("main"), &[("fortune_reels", 0)]);
        fs::write(dir.join(SESSION_FILE), "{}").expect("truncate");

        let (summary, warnings) =
            aggregate(&temp.path().join("archive"), None).expect("aggregate");
        assert_eq!(summary.archives, 0);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("session.json: checksum mismatch"));
    }

    #[test]
    fn missing_archive_dir_is_empty() {
        let temp = tempdir().expect("tempdir");
        let (summary, warnings) =
            aggregate(&temp.path().join("archive"), None).expect("aggregate");
        assert_eq!(summary.archives, 0);
        assert!(summary.targets.is_empty());
        assert!(warnings.is_empty());
    }
}
