//! Offline application backed by a recorded JSON trace.
//!
//! A trace holds the catalog and one frame per driver tick. Each `observe`
//! advances to the next frame; commands issued by the driver are recorded so
//! a replay can be inspected afterwards.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::app::{AppEvent, Application, Catalog};
use crate::core::mode::Observation;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    /// Target key to display name.
    pub catalog: BTreeMap<String, String>,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    #[serde(flatten)]
    pub observation: Observation,
    #[serde(default)]
    pub events: Vec<AppEvent>,
    #[serde(default)]
    pub memory_mb: Option<f64>,
}

/// Command the driver issued during a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Perform(String),
    LoadTarget(String),
    ReturnToLobby,
    Reset,
    ClearBlockingUi,
}

#[derive(Debug, Clone)]
pub struct ReplayApp {
    catalog: BTreeMap<String, String>,
    frames: VecDeque<Frame>,
    current: Frame,
    commands: Vec<Command>,
    running: bool,
}

impl ReplayApp {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read trace {}", path.display()))?;
        let trace: Trace = serde_json::from_str(&contents)
            .with_context(|| format!("parse trace {}", path.display()))?;
        debug!(
            path = %path.display(),
            frames = trace.frames.len(),
            targets = trace.catalog.len(),
            "trace loaded"
        );
        Ok(Self::from_trace(trace))
    }

    pub fn from_trace(trace: Trace) -> Self {
        let running = !trace.frames.is_empty();
        Self {
            catalog: trace.catalog,
            frames: trace.frames.into(),
            current: Frame::default(),
            commands: Vec::new(),
            running,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn remaining_frames(&self) -> usize {
        self.frames.len()
    }
}

impl Catalog for ReplayApp {
    fn target_name(&self, key: &str) -> Option<String> {
        self.catalog.get(key).cloned()
    }
}

impl Application for ReplayApp {
    fn observe(&mut self) -> Observation {
        match self.frames.pop_front() {
            Some(frame) => self.current = frame,
            None => {
                self.running = false;
                self.current.events.clear();
            }
        }
        if self.frames.is_empty() {
            self.running = false;
        }
        self.current.observation.clone()
    }

    fn drain_events(&mut self) -> Vec<AppEvent> {
        std::mem::take(&mut self.current.events)
    }

    fn perform(&mut self, action: &str) -> Result<()> {
        self.commands.push(Command::Perform(action.to_string()));
        Ok(())
    }

    fn load_target(&mut self, key: &str) -> Result<()> {
        self.commands.push(Command::LoadTarget(key.to_string()));
        Ok(())
    }

    fn return_to_lobby(&mut self) -> Result<()> {
        self.commands.push(Command::ReturnToLobby);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.commands.push(Command::Reset);
        Ok(())
    }

    fn clear_blocking_ui(&mut self) -> Result<()> {
        self.commands.push(Command::ClearBlockingUi);
        Ok(())
    }

    fn memory_usage_mb(&mut self) -> Option<f64> {
        self.current.memory_mb
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mode::GameplayKind;

    const TRACE: &str = r#"{
        "catalog": {"fortune_reels": "Fortune Reels"},
        "frames": [
            {"lobby": true},
            {"gameplay": "base", "events": [{"type": "outcome", "payload": "p1"}], "memory_mb": 512.5}
        ]
    }"#;

    #[test]
    fn frames_advance_per_observation() {
        let trace: Trace = serde_json::from_str(TRACE).expect("parse");
        let mut app = ReplayApp::from_trace(trace);
        assert!(app.is_running());
        assert_eq!(app.target_name("fortune_reels").as_deref(), Some("Fortune Reels"));
        assert_eq!(app.target_name("unknown"), None);

        assert!(app.observe().lobby);
        assert!(app.drain_events().is_empty());

        let observation = app.observe();
        assert_eq!(observation.gameplay, Some(GameplayKind::Base));
        assert_eq!(app.drain_events().len(), 1);
        assert!(app.drain_events().is_empty());
        assert_eq!(app.memory_usage_mb(), Some(512.5));
        assert!(!app.is_running());
    }

    #[test]
    fn commands_are_recorded_in_order() {
        let mut app = ReplayApp::from_trace(Trace::default());
        assert!(!app.is_running());
        app.load_target("fortune_reels").expect("load");
        app.perform("spin").expect("perform");
        app.return_to_lobby().expect("lobby");
        assert_eq!(
            app.commands(),
            &[
                Command::LoadTarget("fortune_reels".to_string()),
                Command::Perform("spin".to_string()),
                Command::ReturnToLobby,
            ]
        );
    }

    #[test]
    fn load_reports_trace_path_on_parse_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("trace.json");
        fs::write(&path, "[]").expect("write");
        let err = ReplayApp::load(&path).expect_err("bad trace");
        assert!(format!("{err:#}").contains("trace.json"));
    }
}
