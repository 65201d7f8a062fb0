//! Driver modes derived from the application's observable state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of gameplay object currently active in the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameplayKind {
    Base,
    Bonus,
}

/// Snapshot of the flags the driver polls every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    pub loading: bool,
    pub bonus_active: bool,
    pub gameplay: Option<GameplayKind>,
    pub lobby: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    None,
    Lobby,
    Loading,
    BaseGameplay,
    BonusGameplay,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::None => write!(f, "none"),
            Mode::Lobby => write!(f, "lobby"),
            Mode::Loading => write!(f, "loading"),
            Mode::BaseGameplay => write!(f, "base_gameplay"),
            Mode::BonusGameplay => write!(f, "bonus_gameplay"),
        }
    }
}

/// Derive the mode purely from an observation.
///
/// Precedence: loading, then bonus, then the active gameplay object, then the
/// lobby flag. Anything else is `None`.
pub fn classify(observation: &Observation) -> Mode {
    if observation.loading {
        return Mode::Loading;
    }
    if observation.bonus_active {
        return Mode::BonusGameplay;
    }
    match observation.gameplay {
        Some(GameplayKind::Base) => Mode::BaseGameplay,
        Some(GameplayKind::Bonus) => Mode::BonusGameplay,
        None if observation.lobby => Mode::Lobby,
        None => Mode::None,
    }
}
