//! A named subject of testing and the history of runs executed against it.

use serde::{Deserialize, Serialize};

use crate::core::statistics::{RunStatistics, average};
use crate::test_run::TestRun;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestTarget {
    pub key: String,
    pub name: String,
    #[serde(rename = "iterations")]
    pub runs: Vec<TestRun>,
}

impl TestTarget {
    pub fn new(key: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            runs: Vec::new(),
        }
    }

    /// Index the next appended run will receive.
    pub fn next_index(&self) -> u32 {
        u32::try_from(self.runs.len()).unwrap_or(u32::MAX)
    }

    pub fn push_run(&mut self, run: TestRun) {
        self.runs.push(run);
    }

    /// Statistics averaged over every run, recomputed on each call.
    pub fn averaged_statistics(&self) -> Option<RunStatistics> {
        let stats: Vec<RunStatistics> = self.runs.iter().map(|run| run.statistics.clone()).collect();
        average(&stats)
    }
}
