//! Structured record of one warning/error/exception observed during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::filter::is_desync;
use crate::core::types::Severity;

/// Maximum characters shown in a record title.
pub const TITLE_MAX_CHARS: usize = 80;

/// Correlation data captured alongside a log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogContext<'a> {
    pub logged_at: DateTime<Utc>,
    pub sequence: u64,
    pub action: Option<&'a str>,
    pub spin_index: u32,
    pub previous_outcome: Option<&'a str>,
    pub current_outcome: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    pub stack: Option<String>,
    pub logged_at: DateTime<Utc>,
    pub sequence: u64,
    pub action: Option<String>,
    pub spin_index: u32,
    pub previous_outcome: Option<String>,
    pub current_outcome: Option<String>,
}

impl LogRecord {
    /// Build a record. Warnings never carry outcome snapshots; desync records
    /// start without them and are back-filled once the next outcome arrives.
    pub fn new(
        severity: Severity,
        message: &str,
        stack: Option<&str>,
        context: &LogContext<'_>,
    ) -> Self {
        let with_outcomes = severity > Severity::Warning && !is_desync(message);
        let outcome = |value: Option<&str>| {
            if with_outcomes {
                value.map(str::to_string)
            } else {
                None
            }
        };
        Self {
            severity,
            message: message.to_string(),
            stack: stack.filter(|s| !s.is_empty()).map(str::to_string),
            logged_at: context.logged_at,
            sequence: context.sequence,
            action: context.action.map(str::to_string),
            spin_index: context.spin_index,
            previous_outcome: outcome(context.previous_outcome),
            current_outcome: outcome(context.current_outcome),
        }
    }

    /// First line of the message, truncated to `TITLE_MAX_CHARS` characters.
    pub fn title(&self) -> String {
        let first_line = self.message.lines().next().unwrap_or("");
        first_line.chars().take(TITLE_MAX_CHARS).collect()
    }

    pub fn is_desync(&self) -> bool {
        is_desync(&self.message)
    }

    /// Desync errors and exceptions get their outcomes from the next
    /// outcome event; warnings never do.
    pub fn awaits_back_fill(&self) -> bool {
        self.severity > Severity::Warning && self.is_desync()
    }

    /// Populate the outcome snapshots of a pending desync record.
    pub fn back_fill(&mut self, previous: Option<&str>, current: &str) {
        self.previous_outcome = previous.map(str::to_string);
        self.current_outcome = Some(current.to_string());
    }
}
