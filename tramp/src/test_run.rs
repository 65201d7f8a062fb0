//! One execution attempt ("iteration") against a test target.
//!
//! A run owns its action queue, statistics, log records and visual-bug reports.
//! It refers to its target by key only; the session moves the finished run into
//! the target's history.

use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::action_queue::{ActionEntry, ActionQueue, QueueError};
use crate::core::filter::{LogFilter, strip_markup};
use crate::core::log_record::{LogContext, LogRecord};
use crate::core::mode::Mode;
use crate::core::statistics::RunStatistics;
use crate::core::types::{DEFAULT_TIME_SCALE, Severity, VisualBug};

/// Lines kept per severity in the rolling spin-context buffers.
pub const ROLLING_LINES_PER_SEVERITY: usize = 20;

const INACTIVE_TIMER: f64 = -1.0;

/// Which watchdog budget a run exceeded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunTimeout {
    /// No action was dispatched for longer than the per-action limit.
    Action { elapsed: f64, limit: f64 },
    /// The whole run exceeded its action-proportional budget.
    Run { elapsed: f64, limit: f64 },
}

/// Bounded per-severity buffers of log lines surrounding recent spins.
#[derive(Debug, Clone, Default)]
pub struct SpinContext {
    warning: VecDeque<String>,
    error: VecDeque<String>,
    exception: VecDeque<String>,
}

impl SpinContext {
    fn push(&mut self, severity: Severity, line: String) {
        let buffer = match severity {
            Severity::Info => return,
            Severity::Warning => &mut self.warning,
            Severity::Error => &mut self.error,
            Severity::Exception => &mut self.exception,
        };
        if buffer.len() == ROLLING_LINES_PER_SEVERITY {
            buffer.pop_front();
        }
        buffer.push_back(line);
    }

    pub fn lines(&self, severity: Severity) -> impl Iterator<Item = &str> {
        let buffer = match severity {
            Severity::Warning => Some(&self.warning),
            Severity::Error => Some(&self.error),
            Severity::Exception => Some(&self.exception),
            Severity::Info => None,
        };
        buffer.into_iter().flatten().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub index: u32,
    pub target_key: String,
    pub statistics: RunStatistics,
    pub executed_actions: Vec<String>,
    #[serde(rename = "remaining_actions")]
    pub actions: ActionQueue,
    pub logs: Vec<LogRecord>,
    pub visual_bugs: Vec<VisualBug>,
    pub loaded_successfully: bool,
    pub force_ended: bool,
    pub end_mode: Option<Mode>,

    /// Populate the queue from the action policy on `start`.
    #[serde(skip)]
    pub auto_generate: bool,
    #[serde(skip)]
    is_testing: bool,
    #[serde(skip, default = "inactive_timer")]
    since_last_action: f64,
    #[serde(skip, default = "inactive_timer")]
    total_elapsed: f64,
    #[serde(skip)]
    last_action: Option<String>,
    #[serde(skip)]
    previous_outcome: Option<String>,
    #[serde(skip)]
    current_outcome: Option<String>,
    /// Indices into `logs` of desync records awaiting the next outcome.
    #[serde(skip)]
    pending_desync: Vec<usize>,
    #[serde(skip)]
    log_sequence: u64,
    /// Lines logged since the last counted spin.
    #[serde(skip)]
    spin_lines: Vec<(Severity, String)>,
    #[serde(skip)]
    spin_context: SpinContext,
}

fn inactive_timer() -> f64 {
    INACTIVE_TIMER
}

impl TestRun {
    /// Empty run that generates its actions from policy when started.
    pub fn new(target_key: &str) -> Self {
        Self {
            index: 0,
            target_key: target_key.to_string(),
            statistics: RunStatistics::new(Utc::now()),
            executed_actions: Vec::new(),
            actions: ActionQueue::new(),
            logs: Vec::new(),
            visual_bugs: Vec::new(),
            loaded_successfully: false,
            force_ended: false,
            end_mode: None,
            auto_generate: true,
            is_testing: false,
            since_last_action: INACTIVE_TIMER,
            total_elapsed: INACTIVE_TIMER,
            last_action: None,
            previous_outcome: None,
            current_outcome: None,
            pending_desync: Vec::new(),
            log_sequence: 0,
            spin_lines: Vec::new(),
            spin_context: SpinContext::default(),
        }
    }

    /// Prepare a run restored from `session.json` to be loaded again.
    ///
    /// Statistics, logs, visual bugs and the remaining queue carry over; the
    /// load and the timers start over. Desync records still missing their
    /// outcomes wait for the next one.
    pub fn into_resumed(mut self) -> Self {
        self.auto_generate = false;
        self.loaded_successfully = false;
        self.force_ended = false;
        self.end_mode = None;
        self.is_testing = false;
        self.since_last_action = INACTIVE_TIMER;
        self.total_elapsed = INACTIVE_TIMER;
        self.last_action = self.executed_actions.last().cloned();
        self.log_sequence = self.logs.iter().map(|log| log.sequence).max().unwrap_or(0);
        self.pending_desync = self
            .logs
            .iter()
            .enumerate()
            .filter(|(_, log)| log.awaits_back_fill() && log.current_outcome.is_none())
            .map(|(index, _)| index)
            .collect();
        self
    }

    /// Run rebuilt from the test plan alone; continues its remaining queue
    /// with fresh statistics.
    pub fn resumed(
        target_key: &str,
        index: u32,
        executed_actions: Vec<String>,
        actions: ActionQueue,
    ) -> Self {
        let mut run = Self::new(target_key);
        run.index = index;
        run.last_action = executed_actions.last().cloned();
        run.executed_actions = executed_actions;
        run.actions = actions;
        run.auto_generate = false;
        run
    }

    /// Activate the run: fill the queue from `policy` if requested and start
    /// both timers.
    pub fn start(&mut self, policy: &[ActionEntry]) {
        if self.auto_generate && self.actions.is_empty() {
            for entry in policy {
                self.add_action(&entry.action, entry.count);
            }
        }
        self.statistics.started_at = Utc::now();
        self.statistics.active = true;
        self.statistics.ended_at = None;
        self.loaded_successfully = true;
        self.is_testing = true;
        self.since_last_action = 0.0;
        self.total_elapsed = 0.0;
        debug!(
            target_key = %self.target_key,
            index = self.index,
            remaining = self.actions.remaining(),
            "run started"
        );
    }

    pub fn is_testing(&self) -> bool {
        self.is_testing
    }

    /// Cooperative stop: in-flight handlers observe it on their next step.
    pub fn stop(&mut self) {
        self.is_testing = false;
    }

    pub fn has_remaining_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    pub fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    pub fn since_last_action(&self) -> f64 {
        self.since_last_action
    }

    pub fn total_elapsed(&self) -> f64 {
        self.total_elapsed
    }

    pub fn spin_context(&self) -> &SpinContext {
        &self.spin_context
    }

    pub fn pending_desync(&self) -> usize {
        self.pending_desync.len()
    }

    pub fn add_action(&mut self, action: &str, count: u32) {
        self.actions.add_action(action, count);
    }

    /// Change the count of the queue entry at `index`. An out-of-range index
    /// is recorded as an error on the run.
    pub fn set_count(&mut self, index: usize, count: u32) -> Result<(), QueueError> {
        self.actions
            .set_count(index, count)
            .inspect_err(|err| self.queue_error(err))
    }

    /// Consume the next queued action and restart the per-action timer.
    ///
    /// Popping an empty queue is recorded as an error on the run.
    pub fn pop_next(&mut self) -> Result<String, QueueError> {
        let action = self
            .actions
            .pop_next()
            .inspect_err(|err| self.queue_error(err))?;
        self.executed_actions.push(action.clone());
        self.last_action = Some(action.clone());
        self.since_last_action = 0.0;
        Ok(action)
    }

    fn queue_error(&mut self, err: &QueueError) {
        self.retain(Severity::Error, &format!("action queue: {err}"), None);
    }

    /// Restart the per-action timer without consuming an action.
    pub fn touch(&mut self) {
        if self.since_last_action >= 0.0 {
            self.since_last_action = 0.0;
        }
    }

    pub fn advance_timers(&mut self, dt: f64) {
        if self.since_last_action >= 0.0 {
            self.since_last_action += dt;
        }
        if self.total_elapsed >= 0.0 {
            self.total_elapsed += dt;
        }
    }

    /// Evaluate both watchdog budgets.
    ///
    /// The run budget scales with the number of actions already executed plus
    /// those still queued.
    pub fn timeout(&self, max_secs_per_action: f64) -> Option<RunTimeout> {
        if !self.is_testing {
            return None;
        }
        if self.since_last_action > max_secs_per_action {
            return Some(RunTimeout::Action {
                elapsed: self.since_last_action,
                limit: max_secs_per_action,
            });
        }
        let actions = self.executed_actions.len() as f64 + 1.0 + self.actions.remaining() as f64;
        let limit = actions * max_secs_per_action;
        if self.total_elapsed > limit {
            return Some(RunTimeout::Run {
                elapsed: self.total_elapsed,
                limit,
            });
        }
        None
    }

    /// Build a record for an observed log event and retain it unless it is
    /// below warning or matches the severity's ignore list.
    ///
    /// Desync records are held for back-fill by the next outcome.
    pub fn record_log(
        &mut self,
        filter: &LogFilter,
        severity: Severity,
        message: &str,
        stack: Option<&str>,
    ) -> Option<LogRecord> {
        let message = strip_markup(message);
        if !severity.is_retained() || filter.is_ignored(severity, &message) {
            return None;
        }
        Some(self.retain(severity, &message, stack))
    }

    fn retain(&mut self, severity: Severity, message: &str, stack: Option<&str>) -> LogRecord {
        self.log_sequence += 1;
        let context = LogContext {
            logged_at: Utc::now(),
            sequence: self.log_sequence,
            action: self.last_action.as_deref(),
            spin_index: self.statistics.total_spins(),
            previous_outcome: self.previous_outcome.as_deref(),
            current_outcome: self.current_outcome.as_deref(),
        };
        let record = LogRecord::new(severity, message, stack, &context);
        self.statistics.count_log(severity);
        self.spin_lines
            .push((severity, format!("[{}] {}", severity, record.title())));
        if record.awaits_back_fill() {
            self.pending_desync.push(self.logs.len());
        }
        self.logs.push(record.clone());
        record
    }

    /// Shift the outcome snapshots and back-fill every pending desync record.
    ///
    /// Returns how many records were back-filled.
    pub fn receive_outcome(&mut self, payload: &str) -> usize {
        self.previous_outcome = self.current_outcome.take();
        self.current_outcome = Some(payload.to_string());
        let pending = std::mem::take(&mut self.pending_desync);
        for index in &pending {
            if let Some(record) = self.logs.get_mut(*index) {
                record.back_fill(self.previous_outcome.as_deref(), payload);
            }
        }
        pending.len()
    }

    /// Count a spin and roll the lines logged during the previous spin into
    /// the bounded per-severity context buffers.
    pub fn count_spin(&mut self, bet: f64, forced: bool, time_scale: f64) {
        for (severity, line) in self.spin_lines.drain(..) {
            self.spin_context.push(severity, line);
        }
        let fast = time_scale != DEFAULT_TIME_SCALE;
        self.statistics.count_spin(bet, forced, fast);
    }

    pub fn add_visual_bug(&mut self, description: &str) {
        self.visual_bugs.push(VisualBug {
            description: description.to_string(),
            action: self.last_action.clone(),
            spin_index: self.statistics.total_spins(),
            reported_at: Utc::now(),
        });
    }

    /// Finalize the run: check invariants, freeze statistics, deactivate.
    ///
    /// Disagreeing auto-spin counters produce an error record; a run shorter
    /// than `min_success_secs` that was not force-ended produces an exception
    /// record ("likely crash").
    pub fn done(&mut self, mode: Mode, forced: bool, min_success_secs: f64) {
        if !self.statistics.auto_spins_consistent() {
            let message = format!(
                "auto-spin counters disagree: requested={} received={} finished={}",
                self.statistics.auto_spins_requested,
                self.statistics.auto_spins_received,
                self.statistics.auto_spins_finished
            );
            self.retain(Severity::Error, &message, None);
        }
        if !forced && self.total_elapsed < min_success_secs {
            let message = format!(
                "run ended after {:.1}s in {mode} (minimum {:.1}s): likely crash",
                self.total_elapsed.max(0.0),
                min_success_secs
            );
            self.retain(Severity::Exception, &message, None);
        }
        for (severity, line) in self.spin_lines.drain(..) {
            self.spin_context.push(severity, line);
        }
        self.force_ended = forced;
        self.end_mode = Some(mode);
        self.is_testing = false;
        self.statistics.freeze(Utc::now());
        debug!(
            target_key = %self.target_key,
            index = self.index,
            forced,
            logs = self.logs.len(),
            "run finalized"
        );
    }
}
