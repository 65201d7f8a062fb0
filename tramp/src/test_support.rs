//! Test-only helpers: a fixed catalog, a scripted application that behaves
//! like a small slot game, and fast timing fixtures.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::action_queue::ActionEntry;
use crate::core::mode::{GameplayKind, Observation};
use crate::core::types::{AutoSpinPhase, Severity};
use crate::io::app::{AppEvent, Application, Catalog};
use crate::io::config::TrampConfig;
use crate::io::paths::SessionPaths;
use crate::io::store::SessionStore;

/// Catalog backed by a fixed key to name table.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    names: BTreeMap<String, String>,
}

impl StaticCatalog {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            names: entries
                .iter()
                .map(|(key, name)| (key.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl Catalog for StaticCatalog {
    fn target_name(&self, key: &str) -> Option<String> {
        self.names.get(key).cloned()
    }
}

/// Config with a `spin` policy of `spins` actions and one-second timings.
pub fn quick_config(spins: u32) -> TrampConfig {
    let mut config = TrampConfig::default();
    config.policy = vec![ActionEntry {
        action: "spin".to_string(),
        count: spins,
    }];
    config.timing.max_secs_per_action = 10.0;
    config.timing.min_success_secs = 0.0;
    config.timing.action_delay_secs = 1.0;
    config.timing.load_grace_secs = 5.0;
    config.timing.recovery_delay_secs = 1.0;
    config.timing.memory_sample_interval_secs = 2.0;
    config.timing.max_restarts = 2;
    config
}

/// Session store rooted in a fresh temporary directory. Keep the `TempDir`
/// alive for as long as the store is used.
pub fn temp_store() -> Result<(TempDir, SessionStore)> {
    let dir = tempfile::tempdir().context("create temp root")?;
    let store = SessionStore::new(SessionPaths::new(dir.path(), None));
    Ok((dir, store))
}

#[derive(Debug, Clone, PartialEq)]
enum SimState {
    Lobby,
    Loading { ticks_left: u32 },
    Base,
    Bonus { ticks_left: u32 },
    Blank,
}

/// What happens after a given number of spins.
#[derive(Debug, Clone)]
enum Trigger {
    Crash,
    Stall { recoverable: bool },
    Bonus { name: String, ticks: u32 },
}

/// Deterministic stand-in for a slot game.
///
/// Loading takes `load_ticks` observations. Each `spin` action emits spin,
/// outcome and finish events that the driver drains on the next tick.
#[derive(Debug, Clone)]
pub struct ScriptedApp {
    state: SimState,
    load_ticks: u32,
    bet: f64,
    win_per_spin: f64,
    spins: u32,
    events: Vec<AppEvent>,
    logs_on_spin: Vec<(u32, Severity, String)>,
    triggers: Vec<(u32, Trigger)>,
    stall_recoverable: bool,
    memory_mb: Option<f64>,
    fail_loads: bool,
    ignore_lobby_requests: bool,
    panic_on_spin: Option<u32>,
    exit_after_ticks: Option<u64>,
    ticks: u64,
    pub performed: Vec<String>,
    pub loads: Vec<String>,
    pub resets: u32,
}

impl Default for ScriptedApp {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedApp {
    pub fn new() -> Self {
        Self {
            state: SimState::Lobby,
            load_ticks: 2,
            bet: 1.0,
            win_per_spin: 0.0,
            spins: 0,
            events: Vec::new(),
            logs_on_spin: Vec::new(),
            triggers: Vec::new(),
            stall_recoverable: true,
            memory_mb: None,
            fail_loads: false,
            ignore_lobby_requests: false,
            panic_on_spin: None,
            exit_after_ticks: None,
            ticks: 0,
            performed: Vec::new(),
            loads: Vec::new(),
            resets: 0,
        }
    }

    pub fn load_ticks(mut self, ticks: u32) -> Self {
        self.load_ticks = ticks;
        self
    }

    pub fn bet(mut self, bet: f64) -> Self {
        self.bet = bet;
        self
    }

    pub fn win_per_spin(mut self, win: f64) -> Self {
        self.win_per_spin = win;
        self
    }

    /// Emit a log event right after the `spin`-th spin (1-based).
    pub fn log_on_spin(mut self, spin: u32, severity: Severity, message: &str) -> Self {
        self.logs_on_spin.push((spin, severity, message.to_string()));
        self
    }

    /// Drop back to the lobby without being asked after the `spin`-th spin.
    pub fn crash_after_spins(mut self, spin: u32) -> Self {
        self.triggers.push((spin, Trigger::Crash));
        self
    }

    /// Show nothing recognizable after the `spin`-th spin. An unrecoverable
    /// stall ignores resets and only a return to the lobby clears it.
    pub fn stall_after_spins(mut self, spin: u32, recoverable: bool) -> Self {
        self.triggers.push((spin, Trigger::Stall { recoverable }));
        self
    }

    pub fn bonus_after_spins(mut self, spin: u32, name: &str, ticks: u32) -> Self {
        self.triggers.push((
            spin,
            Trigger::Bonus {
                name: name.to_string(),
                ticks,
            },
        ));
        self
    }

    pub fn memory_mb(mut self, mb: f64) -> Self {
        self.memory_mb = Some(mb);
        self
    }

    pub fn fail_loads(mut self) -> Self {
        self.fail_loads = true;
        self
    }

    /// Accept `return_to_lobby` without ever leaving the current screen.
    pub fn ignore_lobby_requests(mut self) -> Self {
        self.ignore_lobby_requests = true;
        self
    }

    /// Panic while performing the `spin`-th spin.
    pub fn panic_on_spin(mut self, spin: u32) -> Self {
        self.panic_on_spin = Some(spin);
        self
    }

    pub fn exit_after_ticks(mut self, ticks: u64) -> Self {
        self.exit_after_ticks = Some(ticks);
        self
    }

    pub fn spins(&self) -> u32 {
        self.spins
    }

    fn spin(&mut self, auto: bool) {
        self.spins += 1;
        let spin = self.spins;
        if self.panic_on_spin == Some(spin) {
            panic!("reel strip missing for spin {spin}");
        }
        if auto {
            self.events.push(AppEvent::AutoSpin {
                phase: AutoSpinPhase::Requested,
            });
            self.events.push(AppEvent::AutoSpin {
                phase: AutoSpinPhase::Received,
            });
        }
        self.events.push(AppEvent::SpinStarted {
            bet: self.bet,
            forced: false,
        });
        self.events.push(AppEvent::Outcome {
            payload: format!("{{\"spin\":{spin}}}"),
        });
        for (at, severity, message) in &self.logs_on_spin {
            if *at == spin {
                self.events.push(AppEvent::Log {
                    severity: *severity,
                    message: message.clone(),
                    stack: None,
                });
            }
        }
        self.events.push(AppEvent::SpinFinished {
            duration_secs: 0.8,
            won: self.win_per_spin,
        });
        if auto {
            self.events.push(AppEvent::AutoSpin {
                phase: AutoSpinPhase::Finished,
            });
        }

        let fired: Vec<Trigger> = self
            .triggers
            .iter()
            .filter(|(at, _)| *at == spin)
            .map(|(_, trigger)| trigger.clone())
            .collect();
        for trigger in fired {
            match trigger {
                Trigger::Crash => self.state = SimState::Lobby,
                Trigger::Stall { recoverable } => {
                    self.stall_recoverable = recoverable;
                    self.state = SimState::Blank;
                }
                Trigger::Bonus { name, ticks } => {
                    self.events.push(AppEvent::BonusEntered { name });
                    self.state = SimState::Bonus { ticks_left: ticks };
                }
            }
        }
    }
}

impl Application for ScriptedApp {
    fn observe(&mut self) -> Observation {
        self.ticks += 1;
        self.state = match std::mem::replace(&mut self.state, SimState::Lobby) {
            SimState::Loading { ticks_left } if ticks_left > 0 => SimState::Loading {
                ticks_left: ticks_left - 1,
            },
            SimState::Bonus { ticks_left } if ticks_left > 0 => SimState::Bonus {
                ticks_left: ticks_left - 1,
            },
            SimState::Loading { .. } | SimState::Bonus { .. } => SimState::Base,
            other => other,
        };
        let mut observation = Observation::default();
        match self.state {
            SimState::Lobby => observation.lobby = true,
            SimState::Loading { .. } => observation.loading = true,
            SimState::Base => observation.gameplay = Some(GameplayKind::Base),
            SimState::Bonus { .. } => observation.bonus_active = true,
            SimState::Blank => {}
        }
        observation
    }

    fn drain_events(&mut self) -> Vec<AppEvent> {
        std::mem::take(&mut self.events)
    }

    fn perform(&mut self, action: &str) -> Result<()> {
        self.performed.push(action.to_string());
        if self.state != SimState::Base {
            return Ok(());
        }
        match action {
            "spin" => self.spin(false),
            "auto_spin" => self.spin(true),
            "bet_up" => self.bet += 1.0,
            _ => {}
        }
        Ok(())
    }

    fn load_target(&mut self, key: &str) -> Result<()> {
        self.loads.push(key.to_string());
        if self.fail_loads {
            return Err(anyhow!("catalog entry {key} has no bundle"));
        }
        self.state = SimState::Loading {
            ticks_left: self.load_ticks,
        };
        Ok(())
    }

    fn return_to_lobby(&mut self) -> Result<()> {
        if self.ignore_lobby_requests {
            return Ok(());
        }
        self.state = SimState::Lobby;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.resets += 1;
        if self.state != SimState::Blank || self.stall_recoverable {
            self.state = SimState::Lobby;
        }
        Ok(())
    }

    fn clear_blocking_ui(&mut self) -> Result<()> {
        Ok(())
    }

    fn memory_usage_mb(&mut self) -> Option<f64> {
        self.memory_mb
    }

    fn is_running(&self) -> bool {
        self.exit_after_ticks.is_none_or(|limit| self.ticks < limit)
    }
}
