//! Exploratory-test orchestrator for slot-style game clients.
//!
//! The orchestrator drives a running application through queued test runs,
//! collects warnings, errors and exceptions with their outcome context, and
//! persists per-target statistics. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (action queue, log records,
//!   statistics and averaging, severity bands, mode classification).
//! - **[`io`]**: Side effects (configuration, session files, text reports,
//!   archiving) and the [`io::app::Application`] boundary.
//!
//! [`test_run`], [`target`] and [`session`] hold the orchestration state;
//! [`driver`] is the tick-driven scheduler that moves it forward.

pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
pub mod target;
pub mod test_run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
