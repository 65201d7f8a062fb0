//! Tick-driven scheduler that steers the application through test runs.
//!
//! Every tick the driver observes the application, derives the current mode,
//! pumps queued events into the session, runs the watchdog and the memory
//! sampler, and then advances the mode's handler if its wait is satisfied.
//!
//! Timeouts, expired waits and restart requests surface as [`Fatal`] values.
//! [`Driver::run`] handles them in one place: the active run is force-ended
//! and persisted and the handler state starts over.

mod handlers;
mod wait;

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, instrument, warn};

pub use handlers::{BONUS_ADVANCE_ACTION, BonusPhase, Handler, LobbyPhase, StallPhase};
pub use wait::{Wait, WaitState};

use crate::core::mode::{Mode, classify};
use crate::core::types::Severity;
use crate::io::app::{AppEvent, Application};
use crate::io::config::TimingConfig;
use crate::session::Session;
use crate::test_run::RunTimeout;
use handlers::{Step, StepContext};

/// Condition that abandons the active run and restarts the handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum Fatal {
    ActionTimeout {
        target_key: String,
        action: Option<String>,
        elapsed: f64,
        limit: f64,
    },
    RunTimeout {
        target_key: String,
        elapsed: f64,
        limit: f64,
    },
    /// A load or a return to the lobby never completed.
    WaitExpired {
        waiting_for: &'static str,
        limit: f64,
    },
    RestartRequested {
        reason: String,
    },
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::ActionTimeout {
                target_key,
                action,
                elapsed,
                limit,
            } => write!(
                f,
                "{target_key}: no progress for {elapsed:.1}s after action {} (limit {limit:.1}s)",
                action.as_deref().unwrap_or("<none>")
            ),
            Fatal::RunTimeout {
                target_key,
                elapsed,
                limit,
            } => write!(
                f,
                "{target_key}: run took {elapsed:.1}s, over its {limit:.1}s budget"
            ),
            Fatal::WaitExpired { waiting_for, limit } => {
                write!(f, "gave up waiting for {waiting_for} after {limit:.1}s")
            }
            Fatal::RestartRequested { reason } => write!(f, "restart requested: {reason}"),
        }
    }
}

impl std::error::Error for Fatal {}

/// Why the driver loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStop {
    /// Back in the lobby with nothing left to run.
    QueueEmpty,
    /// The operator asked to stop.
    Stopped,
    ApplicationExited,
    TickLimit,
    TooManyRestarts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOutcome {
    pub stop: DriverStop,
    pub ticks: u64,
    pub restarts: u32,
}

/// Samples application memory on a fixed interval while the active run
/// still has queued actions.
#[derive(Debug, Clone)]
struct MemorySampler {
    until_next: f64,
}

impl MemorySampler {
    fn new(interval: f64) -> Self {
        Self {
            until_next: interval,
        }
    }

    fn tick(&mut self, session: &mut Session, app: &mut dyn Application, dt: f64, interval: f64) {
        let sampling = session.test_memory()
            && session
                .active()
                .is_some_and(|run| run.is_testing() && run.has_remaining_actions());
        if !sampling {
            self.until_next = interval;
            return;
        }
        self.until_next -= dt;
        if self.until_next > 0.0 {
            return;
        }
        self.until_next = interval;
        if let Some(mb) = app.memory_usage_mb() {
            session.sample_memory(mb);
        }
    }
}

pub struct Driver {
    timing: TimingConfig,
    handler: Option<Handler>,
    wait: Wait,
    last_mode: Option<Mode>,
    sampler: MemorySampler,
    ticks: u64,
    restarts: u32,
}

impl Driver {
    pub fn new(timing: TimingConfig) -> Self {
        let sampler = MemorySampler::new(timing.memory_sample_interval_secs);
        Self {
            timing,
            handler: None,
            wait: Wait::Ready,
            last_mode: None,
            sampler,
            ticks: 0,
            restarts: 0,
        }
    }

    /// Mode seen on the previous tick. Only used to detect transitions.
    pub fn mode(&self) -> Option<Mode> {
        self.last_mode
    }

    pub fn handler(&self) -> Option<Handler> {
        self.handler
    }

    pub fn wait(&self) -> Wait {
        self.wait
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Advance the whole system by one tick of `dt` seconds.
    ///
    /// Returns `Ok(Some(stop))` when a handler finished the session.
    pub fn tick(
        &mut self,
        session: &mut Session,
        app: &mut dyn Application,
        dt: f64,
    ) -> Result<Option<DriverStop>, Fatal> {
        self.ticks += 1;
        let observation = app.observe();
        let mode = classify(&observation);

        for event in app.drain_events() {
            apply_event(session, mode, event);
        }
        if let Some(reason) = session.take_restart_request() {
            return Err(Fatal::RestartRequested { reason });
        }
        self.watchdog(session, dt)?;
        self.sampler
            .tick(session, app, dt, self.timing.memory_sample_interval_secs);

        if self.last_mode != Some(mode) {
            info!(
                from = %self.last_mode.map_or("-".to_string(), |m| m.to_string()),
                to = %mode,
                "mode changed"
            );
            self.last_mode = Some(mode);
            self.handler = Some(Handler::for_mode(mode));
            self.wait = Wait::Ready;
        }
        match self.wait.poll(&observation, dt) {
            WaitState::Pending => return Ok(None),
            WaitState::Expired => {
                return Err(Fatal::WaitExpired {
                    waiting_for: self.wait.describe(),
                    limit: self.timing.max_secs_per_action,
                });
            }
            WaitState::Satisfied => {}
        }

        let handler = self.handler.get_or_insert_with(|| Handler::for_mode(mode));
        let mut ctx = StepContext {
            session,
            app,
            timing: &self.timing,
        };
        match handler.step(&mut ctx) {
            Step::Suspend(wait) => {
                self.wait = wait;
                Ok(None)
            }
            Step::Finish(stop) => Ok(Some(stop)),
        }
    }

    fn watchdog(&self, session: &mut Session, dt: f64) -> Result<(), Fatal> {
        let Some(run) = session.active_mut() else {
            return Ok(());
        };
        if !run.is_testing() {
            return Ok(());
        }
        run.advance_timers(dt);
        match run.timeout(self.timing.max_secs_per_action) {
            None => Ok(()),
            Some(RunTimeout::Action { elapsed, limit }) => Err(Fatal::ActionTimeout {
                target_key: run.target_key.clone(),
                action: run.last_action().map(str::to_string),
                elapsed,
                limit,
            }),
            Some(RunTimeout::Run { elapsed, limit }) => Err(Fatal::RunTimeout {
                target_key: run.target_key.clone(),
                elapsed,
                limit,
            }),
        }
    }

    /// Tick until a handler finishes, the application exits, `max_ticks` is
    /// reached or recoveries exceed `timing.max_restarts`.
    ///
    /// The session is finished (and persisted) before returning.
    #[instrument(skip_all, fields(session_id = %session.session_id()))]
    pub fn run(
        &mut self,
        session: &mut Session,
        app: &mut dyn Application,
        dt: f64,
        max_ticks: Option<u64>,
    ) -> DriverOutcome {
        session.note("driver started");
        let stop = loop {
            if !app.is_running() {
                break DriverStop::ApplicationExited;
            }
            if max_ticks.is_some_and(|max| self.ticks >= max) {
                break DriverStop::TickLimit;
            }
            match self.tick(session, app, dt) {
                Ok(None) => {}
                Ok(Some(stop)) => break stop,
                Err(fatal) => {
                    self.recover(session, app, &fatal);
                    if self.restarts > self.timing.max_restarts {
                        break DriverStop::TooManyRestarts;
                    }
                }
            }
        };

        let mode = self.last_mode.unwrap_or(Mode::None);
        if stop == DriverStop::ApplicationExited {
            session.fail_active(mode, Severity::Exception, "application exited during run");
        } else {
            session.end_active(mode, true);
        }
        info!(?stop, ticks = self.ticks, restarts = self.restarts, "driver stopped");
        session.note(&format!("driver stopped: {stop:?}"));
        session.finish();
        DriverOutcome {
            stop,
            ticks: self.ticks,
            restarts: self.restarts,
        }
    }

    /// [`Driver::run`] with a guard against panics in the application or a
    /// handler. A panic force-ends the active run with an exception and
    /// finishes the session before it is returned as an error.
    pub fn run_guarded(
        &mut self,
        session: &mut Session,
        app: &mut dyn Application,
        dt: f64,
        max_ticks: Option<u64>,
    ) -> Result<DriverOutcome> {
        let result = catch_unwind(AssertUnwindSafe(|| {
            self.run(session, app, dt, max_ticks)
        }));
        result.map_err(|payload| {
            let message = format!("driver panicked: {}", panic_message(&*payload));
            error!(%message, ticks = self.ticks, "abnormal exit");
            let mode = self.last_mode.unwrap_or(Mode::None);
            session.fail_active(mode, Severity::Exception, &message);
            session.note(&message);
            session.finish();
            anyhow!(message)
        })
    }

    fn recover(&mut self, session: &mut Session, app: &mut dyn Application, fatal: &Fatal) {
        self.restarts += 1;
        error!(%fatal, restarts = self.restarts, "fatal condition; restarting handlers");
        session.note(&format!("fatal: {fatal}"));
        let mode = self.last_mode.unwrap_or(Mode::None);
        session.fail_active(mode, Severity::Exception, &fatal.to_string());
        session.checkpoint();
        if let Err(err) = app.return_to_lobby() {
            warn!(error = %format!("{err:#}"), "return to lobby after fatal failed");
        }
        self.handler = None;
        self.wait = Wait::Ready;
        self.last_mode = None;
        self.sampler = MemorySampler::new(self.timing.memory_sample_interval_secs);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message;
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message;
    }
    "unknown panic"
}

fn apply_event(session: &mut Session, mode: Mode, event: AppEvent) {
    match event {
        AppEvent::Log {
            severity,
            message,
            stack,
        } => {
            session.add_log(mode, severity, &message, stack.as_deref());
        }
        AppEvent::Outcome { payload } => session.receive_outcome(&payload),
        AppEvent::SpinStarted { bet, forced } => session.count_spin(bet, forced),
        AppEvent::SpinFinished { duration_secs, won } => {
            session.record_spin_result(duration_secs, won);
        }
        AppEvent::AutoSpin { phase } => session.record_auto_spin(phase),
        AppEvent::BonusEntered { name } => {
            debug!(%name, "bonus entered");
            session.record_bonus(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_messages_name_the_target() {
        let fatal = Fatal::ActionTimeout {
            target_key: "fortune_reels".to_string(),
            action: Some("spin".to_string()),
            elapsed: 130.0,
            limit: 120.0,
        };
        assert_eq!(
            fatal.to_string(),
            "fortune_reels: no progress for 130.0s after action spin (limit 120.0s)"
        );
        let fatal = Fatal::RunTimeout {
            target_key: "fortune_reels".to_string(),
            elapsed: 500.0,
            limit: 480.0,
        };
        assert!(fatal.to_string().contains("over its 480.0s budget"));
        let fatal = Fatal::WaitExpired {
            waiting_for: Wait::UntilLobby { remaining: 0.0 }.describe(),
            limit: 120.0,
        };
        assert_eq!(
            fatal.to_string(),
            "gave up waiting for the lobby after 120.0s"
        );
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("reel index out of bounds");
        assert_eq!(panic_message(&*payload), "reel index out of bounds");
        let payload: Box<dyn Any + Send> = Box::new(format!("spin {}", 3));
        assert_eq!(panic_message(&*payload), "spin 3");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
