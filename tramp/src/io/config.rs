//! Orchestrator configuration stored in `tramp.toml` at the session root.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::action_queue::ActionEntry;
use crate::core::types::DEFAULT_TIME_SCALE;

pub const CONFIG_FILE_NAME: &str = "tramp.toml";

/// Orchestrator configuration (TOML).
///
/// Edited by hand between sessions. Missing fields fall back to defaults that
/// suit an unattended overnight soak of a single build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrampConfig {
    pub session: SessionConfig,
    pub timing: TimingConfig,
    pub ignore: IgnoreConfig,
    /// Actions queued into every auto-generated run, in order.
    pub policy: Vec<ActionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Build branch under test; part of the session id and archive name.
    pub branch: String,
    /// Application time-scale. Anything other than 1.0 counts spins as fast.
    pub time_scale: f64,
    /// Sample process memory while runs have queued actions.
    pub test_memory: bool,
    /// Parallel instance index; selects `session-<n>` as the session directory.
    pub instance: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            time_scale: DEFAULT_TIME_SCALE,
            test_memory: false,
            instance: None,
        }
    }
}

/// Watchdog budgets and scheduler delays, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub max_secs_per_action: f64,
    /// Unforced runs ending sooner than this are reported as likely crashes.
    pub min_success_secs: f64,
    pub action_delay_secs: f64,
    /// How long the lobby handler waits for a requested target to start loading.
    pub load_grace_secs: f64,
    pub recovery_delay_secs: f64,
    pub memory_sample_interval_secs: f64,
    /// Fatal recoveries allowed before the driver gives up.
    pub max_restarts: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_secs_per_action: 120.0,
            min_success_secs: 60.0,
            action_delay_secs: 1.0,
            load_grace_secs: 30.0,
            recovery_delay_secs: 5.0,
            memory_sample_interval_secs: 10.0,
            max_restarts: 5,
        }
    }
}

/// Substring ignore lists per severity. Exceptions are never ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IgnoreConfig {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for TrampConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            timing: TimingConfig::default(),
            ignore: IgnoreConfig::default(),
            policy: vec![
                ActionEntry {
                    action: "spin".to_string(),
                    count: 100,
                },
                ActionEntry {
                    action: "bet_up".to_string(),
                    count: 1,
                },
                ActionEntry {
                    action: "auto_spin".to_string(),
                    count: 5,
                },
            ],
        }
    }
}

impl TrampConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session.branch.trim().is_empty() {
            return Err(anyhow!("session.branch must be non-empty"));
        }
        if !positive(self.session.time_scale) {
            return Err(anyhow!("session.time_scale must be > 0"));
        }
        let timing = &self.timing;
        for (name, value) in [
            ("timing.max_secs_per_action", timing.max_secs_per_action),
            ("timing.action_delay_secs", timing.action_delay_secs),
            ("timing.load_grace_secs", timing.load_grace_secs),
            ("timing.recovery_delay_secs", timing.recovery_delay_secs),
            (
                "timing.memory_sample_interval_secs",
                timing.memory_sample_interval_secs,
            ),
        ] {
            if !positive(value) {
                return Err(anyhow!("{name} must be > 0"));
            }
        }
        if timing.min_success_secs < 0.0 {
            return Err(anyhow!("timing.min_success_secs must be >= 0"));
        }
        if self.policy.is_empty() {
            return Err(anyhow!("policy must contain at least one action"));
        }
        for entry in &self.policy {
            if entry.action.trim().is_empty() {
                return Err(anyhow!("policy action names must be non-empty"));
            }
            if entry.count == 0 {
                return Err(anyhow!("policy action {} has a zero count", entry.action));
            }
        }
        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TrampConfig::default()`.
pub fn load_config(path: &Path) -> Result<TrampConfig> {
    if !path.exists() {
        let cfg = TrampConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TrampConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TrampConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
