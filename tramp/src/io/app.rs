//! Boundary between the orchestrator and the application under test.
//!
//! The driver never talks to the game directly. It polls an [`Application`]
//! for observations and queued events, and asks it to perform actions.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::mode::Observation;
use crate::core::types::{AutoSpinPhase, Severity};

/// Signal emitted by the application between two driver ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    Log {
        severity: Severity,
        message: String,
        #[serde(default)]
        stack: Option<String>,
    },
    /// Opaque outcome payload describing the result of the latest spin.
    Outcome { payload: String },
    SpinStarted {
        bet: f64,
        #[serde(default)]
        forced: bool,
    },
    SpinFinished {
        duration_secs: f64,
        #[serde(default)]
        won: f64,
    },
    AutoSpin { phase: AutoSpinPhase },
    BonusEntered { name: String },
}

/// Resolves target keys against the application's catalog.
pub trait Catalog {
    /// Display name for `key`, or `None` if the catalog does not know it.
    fn target_name(&self, key: &str) -> Option<String>;
}

/// Control surface of the running application.
pub trait Application {
    /// Sample the flags the driver derives its mode from.
    fn observe(&mut self) -> Observation;

    /// Take every event emitted since the previous call.
    fn drain_events(&mut self) -> Vec<AppEvent>;

    /// Perform one named gameplay action (spin, bet change, ...).
    fn perform(&mut self, action: &str) -> Result<()>;

    fn load_target(&mut self, key: &str) -> Result<()>;

    fn return_to_lobby(&mut self) -> Result<()>;

    /// Full reset of external state after a stall.
    fn reset(&mut self) -> Result<()>;

    /// Dismiss popups or dialogs that block input.
    fn clear_blocking_ui(&mut self) -> Result<()>;

    /// Resident memory of the application process, if it can be measured.
    fn memory_usage_mb(&mut self) -> Option<f64>;

    /// False once the application has exited; the driver stops ticking.
    fn is_running(&self) -> bool {
        true
    }
}
