//! Session manager: the queue of pending runs, the active run, finished
//! targets and the session-wide severity totals.
//!
//! A `Session` is an explicit value owned by the caller and handed to the
//! driver by `&mut`. Persistence goes through an optional [`SessionStore`];
//! checkpoint failures are logged and never interrupt testing.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::core::action_queue::ActionEntry;
use crate::core::filter::{LogFilter, strip_markup};
use crate::core::log_record::{LogContext, LogRecord};
use crate::core::mode::Mode;
use crate::core::types::{AutoSpinPhase, Severity, SeverityClass, SeverityTotals};
use crate::io::app::Catalog;
use crate::io::archive::{CompletePlan, CompletedTarget, archive_session};
use crate::io::config::TrampConfig;
use crate::io::reports::{render_run_report, render_summary_line, render_totals};
use crate::io::store::{PlannedRun, SessionRecord, SessionStore, TestPlan};
use crate::target::TestTarget;
use crate::test_run::TestRun;

/// Run-level settings derived from configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub policy: Vec<ActionEntry>,
    pub filter: LogFilter,
    pub min_success_secs: f64,
}

impl From<&TrampConfig> for SessionSettings {
    fn from(config: &TrampConfig) -> Self {
        Self {
            policy: config.policy.clone(),
            filter: LogFilter::new(
                config.ignore.warnings.clone(),
                config.ignore.errors.clone(),
            ),
            min_success_secs: config.timing.min_success_secs,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    record: SessionRecord,
    pending: VecDeque<TestRun>,
    /// Display names resolved from the catalog at enqueue time.
    names: BTreeMap<String, String>,
    settings: SessionSettings,
    store: Option<SessionStore>,
    stop_requested: bool,
    restart_request: Option<String>,
}

/// Session id: branch plus the UTC start time.
pub fn session_id(branch: &str, started_at: DateTime<Utc>) -> String {
    format!("{branch}-{}", started_at.format("%Y%m%d_%H%M%S"))
}

impl Session {
    /// Fresh session. Without a store nothing is persisted.
    pub fn new(config: &TrampConfig, store: Option<SessionStore>) -> Self {
        let started_at = Utc::now();
        let record = SessionRecord {
            session_id: session_id(&config.session.branch, started_at),
            branch: config.session.branch.clone(),
            time_scale: config.session.time_scale,
            test_memory: config.session.test_memory,
            instance: config.session.instance,
            started_at,
            ended_at: None,
            totals: SeverityTotals::default(),
            exception_counts: BTreeMap::new(),
            targets: BTreeMap::new(),
            lobby_logs: Vec::new(),
            active: None,
        };
        Self {
            record,
            pending: VecDeque::new(),
            names: BTreeMap::new(),
            settings: SessionSettings::from(config),
            store,
            stop_requested: false,
            restart_request: None,
        }
    }

    /// Rebuild a session from its persisted document and test plan.
    ///
    /// Finalized targets are restored as-is. Pending keys still known to the
    /// catalog are re-enqueued, and an interrupted run goes back to the head
    /// of the queue with its remaining actions and everything it recorded.
    /// Without a persisted run the plan's queue is used with fresh statistics.
    #[instrument(skip_all)]
    pub fn resume(config: &TrampConfig, store: SessionStore, catalog: &dyn Catalog) -> Result<Self> {
        let mut record = store
            .load_session()?
            .ok_or_else(|| anyhow!("no session at {}", store.paths().session_path.display()))?;
        let plan = store
            .load_plan()
            .context("load test plan")?
            .unwrap_or_default();

        let interrupted = record.active.take();
        let mut session = Self::new(config, Some(store));
        session.names = record
            .targets
            .values()
            .map(|target| (target.key.clone(), target.name.clone()))
            .collect();
        session.record = SessionRecord {
            time_scale: config.session.time_scale,
            test_memory: config.session.test_memory,
            ended_at: None,
            ..record
        };

        let interrupted = match (interrupted, plan.active) {
            (Some(run), _) => Some(run.into_resumed()),
            (None, Some(planned)) => Some(TestRun::resumed(
                &planned.target_key,
                planned.index,
                planned.executed_actions,
                planned.remaining_actions,
            )),
            (None, None) => None,
        };
        if let Some(run) = interrupted {
            session.remember_name(catalog, &run.target_key);
            info!(
                target_key = %run.target_key,
                remaining = run.actions.remaining(),
                logs = run.logs.len(),
                "resuming interrupted run"
            );
            session.pending.push_back(run);
        }
        for key in &plan.pending {
            session.enqueue(catalog, key);
        }
        session.note(&format!(
            "session {} resumed with {} pending runs",
            session.record.session_id,
            session.pending.len()
        ));
        session.checkpoint();
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.record.session_id
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn store(&self) -> Option<&SessionStore> {
        self.store.as_ref()
    }

    pub fn time_scale(&self) -> f64 {
        self.record.time_scale
    }

    pub fn test_memory(&self) -> bool {
        self.record.test_memory
    }

    pub fn totals(&self) -> SeverityTotals {
        self.record.totals
    }

    pub fn targets(&self) -> &BTreeMap<String, TestTarget> {
        &self.record.targets
    }

    pub fn lobby_logs(&self) -> &[LogRecord] {
        &self.record.lobby_logs
    }

    pub fn pending(&self) -> impl Iterator<Item = &TestRun> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active(&self) -> Option<&TestRun> {
        self.record.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut TestRun> {
        self.record.active.as_mut()
    }

    /// Queue an auto-generating run for `key` if the catalog knows it.
    pub fn enqueue(&mut self, catalog: &dyn Catalog, key: &str) -> Option<&TestRun> {
        if !self.remember_name(catalog, key) {
            warn!(target_key = %key, "unknown target; not queued");
            self.note(&format!("unknown target {key}; not queued"));
            return None;
        }
        self.pending.push_back(TestRun::new(key));
        self.pending.back()
    }

    fn remember_name(&mut self, catalog: &dyn Catalog, key: &str) -> bool {
        match catalog.target_name(key) {
            Some(name) => {
                self.names.insert(key.to_string(), name);
                true
            }
            None => false,
        }
    }

    fn target_name(&self, key: &str) -> String {
        self.names
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Make the pending run at `index` (0 = head) active.
    ///
    /// Any run still active is force-ended first. Returns `None`, leaving the
    /// active run alone, when `index` is out of range.
    pub fn start_next(&mut self, index: usize) -> Option<(String, &TestRun)> {
        if index >= self.pending.len() {
            return None;
        }
        if self.record.active.is_some() {
            self.end_active(Mode::Lobby, true);
        }
        let mut run = self.pending.remove(index)?;
        run.index = self
            .record
            .targets
            .get(&run.target_key)
            .map_or(0, TestTarget::next_index);
        let key = run.target_key.clone();
        info!(target_key = %key, index = run.index, "run queued for loading");
        self.note(&format!("loading {} iteration #{}", key, run.index));
        self.record.active = Some(run);
        self.checkpoint();
        self.record.active.as_ref().map(|run| (key, run))
    }

    /// Start the active run's clock and action queue once its target loaded.
    pub fn begin_active(&mut self) {
        let Some(run) = self.record.active.as_mut() else {
            return;
        };
        run.start(&self.settings.policy);
        info!(
            target_key = %run.target_key,
            index = run.index,
            actions = run.actions.remaining(),
            "run started"
        );
        self.checkpoint();
    }

    /// Finalize the active run and attach it to its target. No-op without one.
    pub fn end_active(&mut self, mode: Mode, forced: bool) {
        let Some(mut run) = self.record.active.take() else {
            return;
        };
        run.done(mode, forced, self.settings.min_success_secs);
        let name = self.target_name(&run.target_key);
        info!(
            target_key = %run.target_key,
            index = run.index,
            forced,
            %mode,
            warnings = run.statistics.warnings,
            errors = run.statistics.errors,
            exceptions = run.statistics.exceptions,
            "run ended"
        );
        let report = render_run_report(&name, &run, false);
        let key = run.target_key.clone();
        let target = self
            .record
            .targets
            .entry(key.clone())
            .or_insert_with(|| TestTarget::new(&key, &name));
        target.push_run(run);
        let summary = target
            .averaged_statistics()
            .map(|averaged| render_summary_line(target, &averaged));

        self.update_severity_totals();
        self.persist_text(|store| {
            store.append_results(&report)?;
            if let Some(summary) = &summary {
                store.append_summary(summary)?;
            }
            Ok(())
        });
        self.checkpoint();
    }

    /// Record `message` on the active run regardless of mode and force-end it.
    pub fn fail_active(&mut self, mode: Mode, severity: Severity, message: &str) {
        let Some(run) = self.record.active.as_mut() else {
            return;
        };
        warn!(target_key = %run.target_key, %severity, message, "run failed");
        run.record_log(&LogFilter::default(), severity, message, None);
        self.end_active(mode, true);
    }

    /// Route an application log to the active run, or to the lobby logs when
    /// no run is active or the application sits in the lobby.
    ///
    /// Exceptions on the active run flush everything to disk immediately.
    pub fn add_log(
        &mut self,
        mode: Mode,
        severity: Severity,
        message: &str,
        stack: Option<&str>,
    ) -> Option<LogRecord> {
        if !severity.is_retained() {
            return None;
        }
        if mode != Mode::Lobby
            && let Some(run) = self.record.active.as_mut()
        {
            let record = run.record_log(&self.settings.filter, severity, message, stack)?;
            if record.severity == Severity::Exception {
                self.flush();
            }
            return Some(record);
        }

        let message = strip_markup(message);
        if self.settings.filter.is_ignored(severity, &message) {
            return None;
        }
        let context = LogContext {
            logged_at: Utc::now(),
            sequence: self.record.lobby_logs.len() as u64 + 1,
            ..LogContext::default()
        };
        let record = LogRecord::new(severity, &message, stack, &context);
        self.note(&format!("[{}] {}", severity, record.title()));
        self.record.lobby_logs.push(record.clone());
        Some(record)
    }

    /// Append `count` repetitions of `action` to the active run's queue.
    ///
    /// Returns false when no run is active.
    pub fn add_actions(&mut self, action: &str, count: u32) -> bool {
        let Some(run) = self.record.active.as_mut() else {
            return false;
        };
        run.add_action(action, count);
        self.checkpoint();
        true
    }

    /// Change an entry count in the active run's queue. An out-of-range
    /// index is logged on the run as an error.
    pub fn set_action_count(&mut self, index: usize, count: u32) -> bool {
        let Some(run) = self.record.active.as_mut() else {
            return false;
        };
        let changed = run.set_count(index, count).is_ok();
        self.checkpoint();
        changed
    }

    pub fn receive_outcome(&mut self, payload: &str) {
        if let Some(run) = self.record.active.as_mut() {
            run.receive_outcome(payload);
        }
    }

    pub fn count_spin(&mut self, bet: f64, forced: bool) {
        let time_scale = self.record.time_scale;
        if let Some(run) = self.record.active.as_mut() {
            run.count_spin(bet, forced, time_scale);
        }
    }

    pub fn record_spin_result(&mut self, duration_secs: f64, won: f64) {
        if let Some(run) = self.record.active.as_mut() {
            run.statistics.record_spin_duration(duration_secs);
            run.statistics.record_return(won);
            run.touch();
        }
    }

    pub fn record_auto_spin(&mut self, phase: AutoSpinPhase) {
        if let Some(run) = self.record.active.as_mut() {
            run.statistics.record_auto_spin(phase);
        }
    }

    pub fn record_bonus(&mut self, name: &str) {
        if let Some(run) = self.record.active.as_mut() {
            run.statistics.record_bonus(name);
            run.touch();
        }
    }

    pub fn sample_memory(&mut self, mb: f64) {
        if let Some(run) = self.record.active.as_mut() {
            run.statistics.record_memory(mb);
        }
    }

    /// Attach an operator-reported visual bug to the active run.
    ///
    /// Returns false when no run is active.
    pub fn report_visual_bug(&mut self, description: &str) -> bool {
        let Some(run) = self.record.active.as_mut() else {
            warn!("visual bug reported without an active run");
            return false;
        };
        run.add_visual_bug(description);
        self.checkpoint();
        true
    }

    /// Bucket every finalized target by the highest tier of its averaged
    /// statistics and refresh the per-target exception counts.
    pub fn update_severity_totals(&mut self) {
        let mut totals = SeverityTotals::default();
        let mut exception_counts = BTreeMap::new();
        for (key, target) in &self.record.targets {
            let Some(averaged) = target.averaged_statistics() else {
                continue;
            };
            totals.bump(averaged.severity_class());
            exception_counts.insert(key.clone(), averaged.exceptions);
        }
        self.record.totals = totals;
        self.record.exception_counts = exception_counts;
    }

    /// Write the active run's partial report and checkpoint everything.
    pub fn flush(&mut self) {
        if let Some(run) = &self.record.active {
            let report = render_run_report(&self.target_name(&run.target_key), run, true);
            self.persist_text(|store| store.append_results(&report));
        }
        self.checkpoint();
    }

    /// Cooperative stop: the active run stops testing and no new run starts.
    pub fn stop(&mut self) {
        self.stop_requested = true;
        if let Some(run) = self.record.active.as_mut() {
            run.stop();
        }
        self.note("stop requested");
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Ask the driver to abandon the active run and restart its handlers.
    pub fn request_restart(&mut self, reason: &str) {
        self.restart_request = Some(reason.to_string());
    }

    pub fn take_restart_request(&mut self) -> Option<String> {
        self.restart_request.take()
    }

    /// Mark the session finished and persist the closing summary.
    pub fn finish(&mut self) {
        if self.record.ended_at.is_some() {
            return;
        }
        self.record.ended_at = Some(Utc::now());
        let totals = render_totals(&self.record.session_id, &self.record.totals);
        self.persist_text(|store| store.append_summary(&totals));
        self.note("session finished");
        self.checkpoint();
    }

    /// Work still to do, as persisted in `current_test_plan.json`.
    pub fn test_plan(&self) -> TestPlan {
        TestPlan {
            pending: self
                .pending
                .iter()
                .map(|run| run.target_key.clone())
                .collect(),
            active: self.record.active.as_ref().map(|run| PlannedRun {
                target_key: run.target_key.clone(),
                index: run.index,
                executed_actions: run.executed_actions.clone(),
                remaining_actions: run.actions.clone(),
            }),
        }
    }

    pub fn complete_plan(&self, completed_at: DateTime<Utc>) -> CompletePlan {
        let targets = self
            .record
            .targets
            .values()
            .map(|target| CompletedTarget {
                key: target.key.clone(),
                name: target.name.clone(),
                iterations: target.runs.len(),
                actions_executed: target
                    .runs
                    .iter()
                    .map(|run| run.executed_actions.len())
                    .sum(),
                severity: target
                    .averaged_statistics()
                    .map(|averaged| averaged.severity_class())
                    .unwrap_or(SeverityClass::Clean),
            })
            .collect();
        let plan = self.test_plan();
        let mut unfinished: Vec<String> = plan
            .active
            .map(|run| run.target_key)
            .into_iter()
            .collect();
        unfinished.extend(plan.pending);
        CompletePlan {
            session_id: self.record.session_id.clone(),
            branch: self.record.branch.clone(),
            completed_at,
            targets,
            unfinished,
        }
    }

    /// Finish the session and move its directory into the archive.
    pub fn archive(mut self) -> Result<PathBuf> {
        self.finish();
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| anyhow!("session has no store to archive"))?;
        let now = Utc::now();
        archive_session(store.paths(), &self.complete_plan(now), now)
    }

    /// Persist `session.json` and `current_test_plan.json`.
    pub fn checkpoint(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.save_session(&self.record) {
            warn!(error = %format!("{err:#}"), "session checkpoint failed");
        }
        if let Err(err) = store.save_plan(&self.test_plan()) {
            warn!(error = %format!("{err:#}"), "test plan checkpoint failed");
        }
    }

    /// Append a line to the operator-facing other-logs file.
    pub fn note(&self, line: &str) {
        self.persist_text(|store| store.append_other(line));
    }

    fn persist_text(&self, write: impl FnOnce(&SessionStore) -> Result<()>) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = write(store) {
            warn!(error = %format!("{err:#}"), "report write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::io::paths::SessionPaths;
    use crate::test_support::{StaticCatalog, temp_store};

    fn config() -> TrampConfig {
        let mut config = TrampConfig::default();
        config.policy = vec![ActionEntry {
            action: "spin".to_string(),
            count: 3,
        }];
        config.timing.min_success_secs = 0.0;
        config
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(&[
            ("fortune_reels", "Fortune Reels"),
            ("golden_dragon", "Golden Dragon"),
        ])
    }

    fn finish_one(session: &mut Session, exceptions: u32) {
        session.start_next(0).expect("start");
        session.begin_active();
        for _ in 0..exceptions {
            session.add_log(Mode::BaseGameplay, Severity::Exception, "boom", None);
        }
        session.end_active(Mode::BaseGameplay, true);
    }

    #[test]
    fn enqueue_rejects_unknown_keys() {
        let mut session = Session::new(&config(), None);
        assert!(session.enqueue(&catalog(), "fortune_reels").is_some());
        assert!(session.enqueue(&catalog(), "no_such_game").is_none());
        assert_eq!(session.pending_len(), 1);
    }

    #[test]
    fn start_next_takes_from_either_end() {
        let mut session = Session::new(&config(), None);
        session.enqueue(&catalog(), "fortune_reels");
        session.enqueue(&catalog(), "golden_dragon");

        let (key, run) = session.start_next(1).expect("tail");
        assert_eq!(key, "golden_dragon");
        assert_eq!(run.index, 0);
        session.begin_active();

        assert!(session.start_next(5).is_none());
        let active = session.active().expect("still active");
        assert_eq!(active.target_key, "golden_dragon");
        assert!(active.is_testing());
        assert!(session.targets().is_empty());
    }

    #[test]
    fn queue_edits_reach_the_active_run() {
        let mut session = Session::new(&config(), None);
        assert!(!session.add_actions("bet_up", 2));
        session.enqueue(&catalog(), "fortune_reels");
        session.start_next(0).expect("start");
        session.begin_active();

        assert!(session.add_actions("bet_up", 2));
        assert!(session.set_action_count(0, 1));
        assert!(!session.set_action_count(7, 1));
        let run = session.active().expect("active");
        assert_eq!(run.actions.remaining(), 3);
        assert_eq!(run.statistics.errors, 1);
        assert_eq!(run.logs.len(), 1);
    }

    #[test]
    fn start_next_force_ends_previous_run() {
        let mut session = Session::new(&config(), None);
        session.enqueue(&catalog(), "fortune_reels");
        session.enqueue(&catalog(), "fortune_reels");
        session.start_next(0).expect("first");
        session.begin_active();

        let (_, run) = session.start_next(0).expect("second");
        assert_eq!(run.index, 1);
        let target = &session.targets()["fortune_reels"];
        assert_eq!(target.runs.len(), 1);
        assert!(target.runs[0].force_ended);
    }

    #[test]
    fn end_active_without_run_is_noop() {
        let mut session = Session::new(&config(), None);
        session.end_active(Mode::Lobby, false);
        assert!(session.targets().is_empty());
    }

    #[test]
    fn lobby_logs_are_segregated() {
        let mut session = Session::new(&config(), None);
        session.add_log(Mode::Lobby, Severity::Error, "lobby asset missing", None);
        session.enqueue(&catalog(), "fortune_reels");
        session.start_next(0).expect("start");
        session.begin_active();

        session.add_log(Mode::Lobby, Severity::Warning, "lobby banner slow", None);
        session.add_log(Mode::BaseGameplay, Severity::Error, "reel stuck", None);
        session.add_log(Mode::BaseGameplay, Severity::Info, "spin", None);

        assert_eq!(session.lobby_logs().len(), 2);
        let run = session.active().expect("active");
        assert_eq!(run.logs.len(), 1);
        assert_eq!(run.logs[0].message, "reel stuck");
    }

    #[test]
    fn severity_totals_use_averaged_statistics() {
        let mut session = Session::new(&config(), None);
        for _ in 0..3 {
            session.enqueue(&catalog(), "fortune_reels");
        }
        session.enqueue(&catalog(), "golden_dragon");
        finish_one(&mut session, 0);
        finish_one(&mut session, 0);
        finish_one(&mut session, 1);
        finish_one(&mut session, 0);

        let totals = session.totals();
        assert_eq!(totals.exception, 1);
        assert_eq!(totals.clean, 1);
        assert_eq!(session.record().exception_counts["fortune_reels"], 1);
        assert_eq!(session.targets()["fortune_reels"].runs.len(), 3);
    }

    #[test]
    fn stop_halts_active_run() {
        let mut session = Session::new(&config(), None);
        session.enqueue(&catalog(), "fortune_reels");
        session.start_next(0).expect("start");
        session.begin_active();
        session.stop();
        assert!(session.is_stop_requested());
        assert!(!session.active().expect("active").is_testing());
    }

    #[test]
    fn visual_bug_needs_active_run() {
        let mut session = Session::new(&config(), None);
        assert!(!session.report_visual_bug("reel overlaps frame"));
        session.enqueue(&catalog(), "fortune_reels");
        session.start_next(0).expect("start");
        session.begin_active();
        assert!(session.report_visual_bug("reel overlaps frame"));
        assert_eq!(session.active().expect("active").visual_bugs.len(), 1);
    }

    #[test]
    fn checkpoints_write_session_files() {
        let (_temp, store) = temp_store().expect("store");
        let paths = store.paths().clone();
        let mut session = Session::new(&config(), Some(store));
        session.enqueue(&catalog(), "fortune_reels");
        session.enqueue(&catalog(), "golden_dragon");
        finish_one(&mut session, 1);

        let results = fs::read_to_string(&paths.results_path).expect("results");
        assert!(results.contains("Fortune Reels (fortune_reels) iteration #0 [in progress]"));
        assert!(results.contains("Fortune Reels (fortune_reels) iteration #0 [finished]"));
        let summary = fs::read_to_string(&paths.summary_path).expect("summary");
        assert!(summary.starts_with("Fortune Reels (fortune_reels): 1 iterations"));

        let plan: TestPlan =
            serde_json::from_str(&fs::read_to_string(&paths.current_plan_path).expect("plan"))
                .expect("parse plan");
        assert_eq!(plan.pending, vec!["golden_dragon"]);
        assert!(plan.active.is_none());
    }

    #[test]
    fn resume_requeues_interrupted_run_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path(), None);
        {
            let mut session = Session::new(&config(), Some(SessionStore::new(paths.clone())));
            session.enqueue(&catalog(), "fortune_reels");
            session.enqueue(&catalog(), "golden_dragon");
            session.enqueue(&catalog(), "golden_dragon");
            finish_one(&mut session, 0);
            session.start_next(0).expect("start");
            session.begin_active();
            session.active_mut().expect("active").pop_next().expect("pop");
            session.checkpoint();
        }

        let session = Session::resume(&config(), SessionStore::new(paths), &catalog())
            .expect("resume");
        assert_eq!(session.targets().len(), 1);
        assert!(session.active().is_none());
        let pending: Vec<&TestRun> = session.pending().collect();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].target_key, "golden_dragon");
        assert!(!pending[0].auto_generate);
        assert_eq!(pending[0].executed_actions, vec!["spin"]);
        assert_eq!(pending[0].actions.remaining(), 2);
        assert!(pending[1].auto_generate);
    }

    #[test]
    fn resume_keeps_findings_of_interrupted_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path(), None);
        {
            let mut session = Session::new(&config(), Some(SessionStore::new(paths.clone())));
            session.enqueue(&catalog(), "fortune_reels");
            session.start_next(0).expect("start");
            session.begin_active();
            session.active_mut().expect("active").pop_next().expect("pop");
            session.count_spin(1.0, false);
            session.add_log(Mode::BaseGameplay, Severity::Exception, "reel crash", None);
            session.report_visual_bug("win banner clipped");
        }

        let mut session = Session::resume(&config(), SessionStore::new(paths), &catalog())
            .expect("resume");
        let run = session.pending().next().expect("requeued");
        assert_eq!(run.statistics.exceptions, 1);
        assert_eq!(run.statistics.normal_spins, 1);
        assert_eq!(run.logs[0].message, "reel crash");
        assert_eq!(run.visual_bugs.len(), 1);
        assert_eq!(run.actions.remaining(), 2);

        finish_one(&mut session, 0);
        assert_eq!(session.totals().exception, 1);
    }

    #[test]
    fn resume_falls_back_to_plan_queue() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path(), None);
        let store = SessionStore::new(paths.clone());
        {
            let mut session = Session::new(&config(), Some(store.clone()));
            session.enqueue(&catalog(), "fortune_reels");
            session.start_next(0).expect("start");
            session.begin_active();
            session.active_mut().expect("active").pop_next().expect("pop");
            session.checkpoint();
        }
        let mut record = store.load_session().expect("load").expect("saved");
        assert!(record.active.is_some());
        record.active = None;
        store.save_session(&record).expect("save");

        let session = Session::resume(&config(), store, &catalog()).expect("resume");
        let run = session.pending().next().expect("requeued");
        assert_eq!(run.executed_actions, vec!["spin"]);
        assert_eq!(run.actions.remaining(), 2);
        assert_eq!(run.statistics.total_spins(), 0);
    }

    #[test]
    fn resume_without_session_fails() {
        let (_temp, store) = temp_store().expect("store");
        let err = Session::resume(&config(), store, &catalog()).expect_err("nothing to resume");
        assert!(err.to_string().contains("no session"));
    }

    #[test]
    fn archive_moves_session_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path(), None);
        let mut session = Session::new(&config(), Some(SessionStore::new(paths.clone())));
        session.enqueue(&catalog(), "fortune_reels");
        finish_one(&mut session, 0);

        let dest = session.archive().expect("archive");
        assert!(!paths.session_dir.exists());
        let plan: CompletePlan = serde_json::from_str(
            &fs::read_to_string(dest.join("complete_test_plan.json")).expect("plan"),
        )
        .expect("parse");
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.targets[0].iterations, 1);
        assert!(plan.unfinished.is_empty());
    }
}
