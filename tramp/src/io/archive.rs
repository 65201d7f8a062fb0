//! Session archiving and archive integrity checks.
//!
//! Archiving writes `complete_test_plan.json` and a `manifest.json` of SHA-256
//! digests into the session directory, then moves the directory under
//! `<root>/archive/<YYYYmmdd_HHMMSS>_<branch>`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use super::paths::{COMPLETE_PLAN_FILE, MANIFEST_FILE, SESSION_FILE, SessionPaths};
use super::store::write_json;
use crate::core::types::SeverityClass;

/// Files covered by the manifest when present.
const ARCHIVED_FILES: [&str; 5] = [
    SESSION_FILE,
    COMPLETE_PLAN_FILE,
    "results.txt",
    "summary.txt",
    "other_logs.txt",
];

/// Snapshot of what a finished session executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePlan {
    pub session_id: String,
    pub branch: String,
    pub completed_at: DateTime<Utc>,
    pub targets: Vec<CompletedTarget>,
    /// Target keys still pending when the session was archived.
    pub unfinished: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTarget {
    pub key: String,
    pub name: String,
    pub iterations: usize,
    pub actions_executed: usize,
    pub severity: SeverityClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub session_id: String,
    pub branch: String,
    pub archived_at: DateTime<Utc>,
    /// File name to hex SHA-256 digest.
    pub files: BTreeMap<String, String>,
}

/// Integrity problem found while verifying an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestProblem {
    Missing(String),
    Mismatch(String),
}

impl std::fmt::Display for ManifestProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestProblem::Missing(file) => write!(f, "{file}: missing"),
            ManifestProblem::Mismatch(file) => write!(f, "{file}: checksum mismatch"),
        }
    }
}

/// Directory name for an archive: UTC timestamp plus a path-safe branch.
pub fn archive_name(archived_at: DateTime<Utc>, branch: &str) -> String {
    let branch: String = branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}_{branch}", archived_at.format("%Y%m%d_%H%M%S"))
}

/// Finalize the session directory and move it into the archive.
///
/// Returns the archived directory.
#[instrument(skip_all, fields(session_id = %plan.session_id))]
pub fn archive_session(
    paths: &SessionPaths,
    plan: &CompletePlan,
    archived_at: DateTime<Utc>,
) -> Result<PathBuf> {
    if !paths.session_path.exists() {
        bail!("no session to archive at {}", paths.session_dir.display());
    }
    write_json(&paths.complete_plan_path, plan)?;

    let mut files = BTreeMap::new();
    for name in ARCHIVED_FILES {
        let path = paths.session_dir.join(name);
        if path.exists() {
            files.insert(name.to_string(), file_sha256(&path)?);
        }
    }
    let manifest = Manifest {
        session_id: plan.session_id.clone(),
        branch: plan.branch.clone(),
        archived_at,
        files,
    };
    write_json(&paths.manifest_path, &manifest)?;

    fs::create_dir_all(&paths.archive_dir)
        .with_context(|| format!("create directory {}", paths.archive_dir.display()))?;
    let dest = unused_dir(&paths.archive_dir, &archive_name(archived_at, &plan.branch));
    fs::rename(&paths.session_dir, &dest).with_context(|| {
        format!(
            "move {} to {}",
            paths.session_dir.display(),
            dest.display()
        )
    })?;
    info!(archive = %dest.display(), "session archived");
    Ok(dest)
}

fn unused_dir(parent: &Path, name: &str) -> PathBuf {
    let mut candidate = parent.join(name);
    let mut suffix = 1;
    while candidate.exists() {
        candidate = parent.join(format!("{name}-{suffix}"));
        suffix += 1;
    }
    candidate
}

pub fn load_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Re-hash every file listed in the archive's manifest.
///
/// An empty result means the archive is intact.
pub fn verify_manifest(dir: &Path) -> Result<Vec<ManifestProblem>> {
    let manifest = load_manifest(dir)?;
    let mut problems = Vec::new();
    for (name, expected) in &manifest.files {
        let path = dir.join(name);
        if !path.exists() {
            problems.push(ManifestProblem::Missing(name.clone()));
            continue;
        }
        if &file_sha256(&path)? != expected {
            problems.push(ManifestProblem::Mismatch(name.clone()));
        }
    }
    debug!(dir = %dir.display(), problems = problems.len(), "manifest verified");
    Ok(problems)
}

/// Archived session directories under `archive_dir`, oldest first.
pub fn list_archives(archive_dir: &Path) -> Result<Vec<PathBuf>> {
    if !archive_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(archive_dir)
        .with_context(|| format!("read directory {}", archive_dir.display()))?
    {
        let entry = entry.with_context(|| format!("read entry in {}", archive_dir.display()))?;
        let path = entry.path();
        if path.is_dir() && path.join(SESSION_FILE).exists() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn plan() -> CompletePlan {
        CompletePlan {
            session_id: "release/2.4-20260301_120000".to_string(),
            branch: "release/2.4".to_string(),
            completed_at: Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap(),
            targets: vec![CompletedTarget {
                key: "fortune_reels".to_string(),
                name: "Fortune Reels".to_string(),
                iterations: 2,
                actions_executed: 210,
                severity: SeverityClass::Warning,
            }],
            unfinished: vec!["golden_dragon".to_string()],
        }
    }

    fn seeded_session(root: &Path) -> SessionPaths {
        let paths = SessionPaths::new(root, None);
        fs::create_dir_all(&paths.session_dir).expect("mkdir");
        fs::write(&paths.session_path, "{}\n").expect("write session");
        fs::write(&paths.results_path, "results\n").expect("write results");
        paths
    }

    #[test]
    fn archive_name_sanitizes_branch() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 5, 9).unwrap();
        assert_eq!(archive_name(at, "release/2.4"), "20260301_180509_release-2.4");
    }

    #[test]
    fn archive_moves_session_and_verifies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = seeded_session(temp.path());
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();

        let dest = archive_session(&paths, &plan(), at).expect("archive");
        assert!(!paths.session_dir.exists());
        assert_eq!(dest, paths.archive_dir.join("20260301_180000_release-2.4"));
        assert!(dest.join(COMPLETE_PLAN_FILE).exists());

        let manifest = load_manifest(&dest).expect("manifest");
        assert!(manifest.files.contains_key(SESSION_FILE));
        assert!(manifest.files.contains_key("results.txt"));
        assert!(!manifest.files.contains_key("summary.txt"));
        assert!(verify_manifest(&dest).expect("verify").is_empty());
        assert_eq!(list_archives(&paths.archive_dir).expect("list"), vec![dest]);
    }

    #[test]
    fn tampered_archive_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = seeded_session(temp.path());
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        let dest = archive_session(&paths, &plan(), at).expect("archive");

        fs::write(dest.join("results.txt"), "edited\n").expect("tamper");
        fs::remove_file(dest.join(SESSION_FILE)).expect("remove");

        let problems = verify_manifest(&dest).expect("verify");
        assert_eq!(
            problems,
            vec![
                ManifestProblem::Mismatch("results.txt".to_string()),
                ManifestProblem::Missing(SESSION_FILE.to_string()),
            ]
        );
    }

    #[test]
    fn second_archive_in_same_second_gets_suffix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        let first = archive_session(&seeded_session(temp.path()), &plan(), at).expect("first");
        let second = archive_session(&seeded_session(temp.path()), &plan(), at).expect("second");
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("release-2.4-1"));
    }

    #[test]
    fn missing_session_cannot_be_archived() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path(), None);
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        let err = archive_session(&paths, &plan(), at).expect_err("nothing to archive");
        assert!(err.to_string().contains("no session to archive"));
    }
}
