//! Shared deterministic types for orchestrator core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Time-scale at which spins count as "normal" rather than "fast".
pub const DEFAULT_TIME_SCALE: f64 = 1.0;

/// Severity tier of a log event observed in the application.
///
/// Ordering is meaningful: `Info < Warning < Error < Exception`. Only
/// `Warning` and above are retained by the log pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Exception,
}

impl Severity {
    /// True for tiers the log pipeline keeps (`warning` and above).
    pub fn is_retained(self) -> bool {
        self >= Severity::Warning
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Exception => "exception",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Highest severity tier present in a set of statistics.
///
/// Used to bucket finalized targets into the session-wide totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityClass {
    Clean,
    Warning,
    Error,
    Exception,
}

impl SeverityClass {
    pub fn label(self) -> &'static str {
        match self {
            SeverityClass::Clean => "clean",
            SeverityClass::Warning => "warning",
            SeverityClass::Error => "error",
            SeverityClass::Exception => "exception",
        }
    }
}

/// Cumulative per-class target counts across all finalized targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityTotals {
    pub clean: u32,
    pub warning: u32,
    pub error: u32,
    pub exception: u32,
}

impl SeverityTotals {
    pub fn bump(&mut self, class: SeverityClass) {
        match class {
            SeverityClass::Clean => self.clean += 1,
            SeverityClass::Warning => self.warning += 1,
            SeverityClass::Error => self.error += 1,
            SeverityClass::Exception => self.exception += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.clean + self.warning + self.error + self.exception
    }
}

/// Auto-spin lifecycle phase reported by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoSpinPhase {
    Requested,
    Received,
    Finished,
}

/// An operator-reported rendering problem attached to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualBug {
    pub description: String,
    pub action: Option<String>,
    pub spin_index: u32,
    pub reported_at: chrono::DateTime<chrono::Utc>,
}
