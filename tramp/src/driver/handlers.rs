//! Per-mode handlers.
//!
//! Each mode maps to one handler. A handler is a small state machine: the
//! driver steps it until it returns a [`Wait`], then polls that wait on later
//! ticks. A mode change discards the handler and starts a fresh one.

use tracing::{debug, info, warn};

use super::DriverStop;
use super::wait::Wait;
use crate::core::mode::Mode;
use crate::core::types::Severity;
use crate::io::app::Application;
use crate::io::config::TimingConfig;
use crate::session::Session;

/// Action sent to advance bonus gameplay (pick screens, free-spin intros).
pub const BONUS_ADVANCE_ACTION: &str = "bonus_advance";

pub(crate) struct StepContext<'a> {
    pub session: &'a mut Session,
    pub app: &'a mut dyn Application,
    pub timing: &'a TimingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Step {
    Suspend(Wait),
    Finish(DriverStop),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyPhase {
    /// Close out the previous run and request the next target.
    Enter,
    /// A target was requested; still in the lobby when the grace period ends.
    AwaitingLoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusPhase {
    Enter,
    Advance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallPhase {
    /// First tick without a recognizable mode; may be a transition.
    Observe,
    Reset,
    Recover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Lobby(LobbyPhase),
    Loading,
    Base,
    Bonus(BonusPhase),
    Stalled(StallPhase),
}

impl Handler {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::None => Handler::Stalled(StallPhase::Observe),
            Mode::Lobby => Handler::Lobby(LobbyPhase::Enter),
            Mode::Loading => Handler::Loading,
            Mode::BaseGameplay => Handler::Base,
            Mode::BonusGameplay => Handler::Bonus(BonusPhase::Enter),
        }
    }

    pub(crate) fn step(&mut self, ctx: &mut StepContext<'_>) -> Step {
        match self {
            Handler::Lobby(phase) => lobby(phase, ctx),
            Handler::Loading => Step::Suspend(Wait::UntilLoaded {
                remaining: ctx.timing.max_secs_per_action,
            }),
            Handler::Base => base(ctx),
            Handler::Bonus(phase) => bonus(phase, ctx),
            Handler::Stalled(phase) => stalled(phase, ctx),
        }
    }
}

fn lobby(phase: &mut LobbyPhase, ctx: &mut StepContext<'_>) -> Step {
    match phase {
        LobbyPhase::Enter => {
            if let Some(loaded) = ctx.session.active().map(|run| run.loaded_successfully) {
                if loaded {
                    ctx.session.end_active(Mode::Lobby, false);
                } else {
                    ctx.session.fail_active(
                        Mode::Lobby,
                        Severity::Error,
                        "target returned to the lobby before it finished loading",
                    );
                }
            }
            if ctx.session.is_stop_requested() {
                return Step::Finish(DriverStop::Stopped);
            }
            let Some((key, _)) = ctx.session.start_next(0) else {
                return Step::Finish(DriverStop::QueueEmpty);
            };
            if let Err(err) = ctx.app.load_target(&key) {
                ctx.session.fail_active(
                    Mode::Lobby,
                    Severity::Error,
                    &format!("loading {key} failed: {err:#}"),
                );
                return Step::Suspend(Wait::NextTick);
            }
            *phase = LobbyPhase::AwaitingLoad;
            Step::Suspend(Wait::Seconds(ctx.timing.load_grace_secs))
        }
        LobbyPhase::AwaitingLoad => {
            ctx.session.fail_active(
                Mode::Lobby,
                Severity::Error,
                "target did not start loading",
            );
            *phase = LobbyPhase::Enter;
            Step::Suspend(Wait::NextTick)
        }
    }
}

fn base(ctx: &mut StepContext<'_>) -> Step {
    let Some((loaded, testing, remaining)) = ctx.session.active().map(|run| {
        (
            run.loaded_successfully,
            run.is_testing(),
            run.has_remaining_actions(),
        )
    }) else {
        return return_to_lobby(ctx);
    };

    if !loaded {
        ctx.session.begin_active();
        return Step::Suspend(Wait::NextTick);
    }
    if ctx.session.is_stop_requested() || !testing {
        ctx.session.end_active(Mode::BaseGameplay, true);
        return return_to_lobby(ctx);
    }
    if !remaining {
        ctx.session.end_active(Mode::BaseGameplay, false);
        return return_to_lobby(ctx);
    }

    // A failed pop is already logged on the run.
    let next = ctx.session.active_mut().map(|run| run.pop_next());
    if let Some(Ok(action)) = next {
        debug!(%action, "performing action");
        if let Err(err) = ctx.app.perform(&action) {
            ctx.session.add_log(
                Mode::BaseGameplay,
                Severity::Error,
                &format!("action {action} failed: {err:#}"),
                None,
            );
        }
    }
    Step::Suspend(Wait::Seconds(ctx.timing.action_delay_secs))
}

fn return_to_lobby(ctx: &mut StepContext<'_>) -> Step {
    if let Err(err) = ctx.app.return_to_lobby() {
        warn!(error = %format!("{err:#}"), "return to lobby failed");
        ctx.session.note(&format!("return to lobby failed: {err:#}"));
        return Step::Suspend(Wait::Seconds(ctx.timing.recovery_delay_secs));
    }
    Step::Suspend(Wait::UntilLobby {
        remaining: ctx.timing.max_secs_per_action,
    })
}

fn bonus(phase: &mut BonusPhase, ctx: &mut StepContext<'_>) -> Step {
    if let Some(run) = ctx.session.active_mut() {
        run.touch();
    }
    match phase {
        BonusPhase::Enter => {
            info!("bonus gameplay entered");
            *phase = BonusPhase::Advance;
            Step::Suspend(Wait::NextTick)
        }
        BonusPhase::Advance => {
            if let Err(err) = ctx.app.perform(BONUS_ADVANCE_ACTION) {
                ctx.session.add_log(
                    Mode::BonusGameplay,
                    Severity::Error,
                    &format!("advancing bonus failed: {err:#}"),
                    None,
                );
            }
            Step::Suspend(Wait::Seconds(ctx.timing.action_delay_secs))
        }
    }
}

fn stalled(phase: &mut StallPhase, ctx: &mut StepContext<'_>) -> Step {
    match phase {
        StallPhase::Observe => {
            *phase = StallPhase::Reset;
            Step::Suspend(Wait::NextTick)
        }
        StallPhase::Reset => {
            warn!("no recognizable mode; resetting application");
            ctx.session.note("stall detected; resetting application");
            if let Err(err) = ctx.app.reset() {
                warn!(error = %format!("{err:#}"), "reset failed");
            }
            *phase = StallPhase::Recover;
            Step::Suspend(Wait::Seconds(ctx.timing.recovery_delay_secs))
        }
        StallPhase::Recover => {
            debug!("clearing blocking ui");
            if let Err(err) = ctx.app.clear_blocking_ui() {
                warn!(error = %format!("{err:#}"), "clearing blocking ui failed");
            }
            Step::Suspend(Wait::Seconds(ctx.timing.recovery_delay_secs))
        }
    }
}
