//! Canonical on-disk layout of a session directory.

use std::path::PathBuf;

/// All canonical paths for one orchestrator instance under a root directory.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub session_dir: PathBuf,
    pub session_path: PathBuf,
    pub current_plan_path: PathBuf,
    pub complete_plan_path: PathBuf,
    pub manifest_path: PathBuf,
    pub results_path: PathBuf,
    pub summary_path: PathBuf,
    pub other_logs_path: PathBuf,
    pub archive_dir: PathBuf,
}

impl SessionPaths {
    /// Layout for `root`; parallel instances get `session-<n>` directories.
    pub fn new(root: impl Into<PathBuf>, instance: Option<u32>) -> Self {
        let root = root.into();
        let session_dir = match instance {
            Some(n) => root.join(format!("session-{n}")),
            None => root.join("session"),
        };
        Self {
            config_path: root.join(super::config::CONFIG_FILE_NAME),
            archive_dir: root.join("archive"),
            session_path: session_dir.join(SESSION_FILE),
            current_plan_path: session_dir.join("current_test_plan.json"),
            complete_plan_path: session_dir.join(COMPLETE_PLAN_FILE),
            manifest_path: session_dir.join(MANIFEST_FILE),
            results_path: session_dir.join("results.txt"),
            summary_path: session_dir.join("summary.txt"),
            other_logs_path: session_dir.join("other_logs.txt"),
            session_dir,
            root,
        }
    }

    pub fn session_exists(&self) -> bool {
        self.session_path.exists()
    }
}

pub const SESSION_FILE: &str = "session.json";
pub const COMPLETE_PLAN_FILE: &str = "complete_test_plan.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_selects_session_directory() {
        let single = SessionPaths::new("/data/tramp", None);
        assert_eq!(single.session_dir, PathBuf::from("/data/tramp/session"));
        assert_eq!(
            single.session_path,
            PathBuf::from("/data/tramp/session/session.json")
        );

        let second = SessionPaths::new("/data/tramp", Some(2));
        assert_eq!(second.session_dir, PathBuf::from("/data/tramp/session-2"));
        assert_eq!(second.archive_dir, PathBuf::from("/data/tramp/archive"));
        assert_eq!(second.config_path, PathBuf::from("/data/tramp/tramp.toml"));
    }
}
