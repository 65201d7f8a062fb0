//! Typed suspension points for mode handlers.

use crate::core::mode::Observation;

/// What a suspended handler is waiting for before its next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Wait {
    /// Step on the next poll. Used for freshly entered handlers.
    Ready,
    /// Step on the tick after the one that suspended.
    NextTick,
    /// Step once this many seconds have elapsed.
    Seconds(f64),
    /// Step once loading finishes; give up after `remaining` seconds.
    UntilLoaded { remaining: f64 },
    /// Step once the lobby shows; give up after `remaining` seconds.
    UntilLobby { remaining: f64 },
}

/// Result of polling a [`Wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Pending,
    Satisfied,
    /// The awaited state never showed within its deadline.
    Expired,
}

impl Wait {
    /// Advance the wait by one tick of `dt` seconds.
    pub fn poll(&mut self, observation: &Observation, dt: f64) -> WaitState {
        match self {
            Wait::Ready | Wait::NextTick => WaitState::Satisfied,
            Wait::Seconds(remaining) => {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    WaitState::Satisfied
                } else {
                    WaitState::Pending
                }
            }
            Wait::UntilLoaded { remaining } => until(!observation.loading, remaining, dt),
            Wait::UntilLobby { remaining } => until(observation.lobby, remaining, dt),
        }
    }

    /// What a state wait is waiting for, for fatal messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Wait::Ready | Wait::NextTick | Wait::Seconds(_) => "the next step",
            Wait::UntilLoaded { .. } => "the target to finish loading",
            Wait::UntilLobby { .. } => "the lobby",
        }
    }
}

fn until(reached: bool, remaining: &mut f64, dt: f64) -> WaitState {
    if reached {
        return WaitState::Satisfied;
    }
    *remaining -= dt;
    if *remaining <= 0.0 {
        WaitState::Expired
    } else {
        WaitState::Pending
    }
}
