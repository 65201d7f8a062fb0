//! JSON persistence for the session document and its test plan.
//!
//! Every write is atomic (temp file + rename) so a crash mid-checkpoint leaves
//! the previous snapshot readable.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::paths::SessionPaths;
use super::reports::append_text;
use crate::core::action_queue::ActionQueue;
use crate::core::log_record::LogRecord;
use crate::core::types::SeverityTotals;
use crate::target::TestTarget;
use crate::test_run::TestRun;

/// Persisted session document (`session.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub branch: String,
    pub time_scale: f64,
    pub test_memory: bool,
    pub instance: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Finalized targets bucketed by the highest tier of their averaged statistics.
    pub totals: SeverityTotals,
    /// Averaged exception count per target key.
    pub exception_counts: BTreeMap<String, u32>,
    pub targets: BTreeMap<String, TestTarget>,
    /// Records logged while no run was active or the application sat in the lobby.
    pub lobby_logs: Vec<LogRecord>,
    /// The run in progress at the last checkpoint, with everything it has
    /// recorded so far.
    #[serde(default)]
    pub active: Option<TestRun>,
}

/// Work still to do (`current_test_plan.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub pending: Vec<String>,
    pub active: Option<PlannedRun>,
}

/// The interrupted run's progress through its queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRun {
    pub target_key: String,
    pub index: u32,
    pub executed_actions: Vec<String>,
    pub remaining_actions: ActionQueue,
}

/// File-backed persistence for one session directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    paths: SessionPaths,
}

impl SessionStore {
    pub fn new(paths: SessionPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn save_session(&self, record: &SessionRecord) -> Result<()> {
        debug!(
            path = %self.paths.session_path.display(),
            targets = record.targets.len(),
            "writing session"
        );
        write_json(&self.paths.session_path, record)
    }

    /// Load `session.json`, or `None` when no session has been persisted yet.
    pub fn load_session(&self) -> Result<Option<SessionRecord>> {
        read_json_if_exists(&self.paths.session_path)
    }

    pub fn save_plan(&self, plan: &TestPlan) -> Result<()> {
        debug!(
            pending = plan.pending.len(),
            active = ?plan.active.as_ref().map(|run| run.target_key.as_str()),
            "writing test plan"
        );
        write_json(&self.paths.current_plan_path, plan)
    }

    pub fn load_plan(&self) -> Result<Option<TestPlan>> {
        read_json_if_exists(&self.paths.current_plan_path)
    }

    pub fn append_results(&self, text: &str) -> Result<()> {
        append_text(&self.paths.results_path, text)
    }

    pub fn append_summary(&self, text: &str) -> Result<()> {
        append_text(&self.paths.summary_path, text)
    }

    /// Append one timestamped line to `other_logs.txt`.
    pub fn append_other(&self, line: &str) -> Result<()> {
        let stamped = format!("{} {line}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        append_text(&self.paths.other_logs_path, &stamped)
    }
}

/// Load a session document from an explicit path (archived sessions).
pub fn load_session_file(path: &Path) -> Result<SessionRecord> {
    read_json(path)
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}
