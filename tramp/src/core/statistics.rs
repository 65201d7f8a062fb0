//! Per-run statistics and cross-run averaging.
//!
//! A [`RunStatistics`] is accumulate-only while its run is active: counters are
//! incremented, running maxima raised, sums extended. Once frozen, elapsed-time
//! queries use the frozen end timestamp instead of "now".
//!
//! Averaging works on the *derived* scalars for elapsed time and coins
//! returned: each is averaged directly, then a record is rebuilt whose
//! start/end pair reproduces it under the ordinary formulas
//! (see [`RunStatistics::from_averaged_scalars`]).

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::core::severity::{Rgb, classify, severity_color};
use crate::core::types::{AutoSpinPhase, Severity, SeverityClass};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub warnings: u32,
    pub errors: u32,
    pub exceptions: u32,

    /// Spins triggered by the orchestrator outside normal play.
    pub forced_spins: u32,
    /// Spins played at the default time-scale.
    pub normal_spins: u32,
    /// Spins played with an accelerated time-scale.
    pub fast_spins: u32,

    pub auto_spins_requested: u32,
    pub auto_spins_received: u32,
    pub auto_spins_finished: u32,

    pub max_spin_secs: f64,
    pub spin_secs_sum: f64,
    pub spin_secs_count: u32,

    pub max_memory_mb: f64,
    pub memory_mb_sum: f64,
    pub memory_samples: u32,

    pub coins_wagered: f64,
    /// Payout meter reading when the run started.
    pub credits_start: f64,
    /// Latest payout meter reading.
    pub credits_end: f64,

    pub bonus_entries: BTreeMap<String, u32>,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl RunStatistics {
    /// Fresh, active statistics starting at `started_at`.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            warnings: 0,
            errors: 0,
            exceptions: 0,
            forced_spins: 0,
            normal_spins: 0,
            fast_spins: 0,
            auto_spins_requested: 0,
            auto_spins_received: 0,
            auto_spins_finished: 0,
            max_spin_secs: 0.0,
            spin_secs_sum: 0.0,
            spin_secs_count: 0,
            max_memory_mb: 0.0,
            memory_mb_sum: 0.0,
            memory_samples: 0,
            coins_wagered: 0.0,
            credits_start: 0.0,
            credits_end: 0.0,
            bonus_entries: BTreeMap::new(),
            started_at,
            ended_at: None,
            active: true,
        }
    }

    /// Frozen statistics whose generic elapsed-time and return formulas yield
    /// exactly `seconds` and `coins_returned`.
    ///
    /// Start is the zero epoch and end is `epoch + seconds`; the credit meter
    /// runs from zero to `coins_returned`.
    pub fn from_averaged_scalars(seconds: f64, coins_returned: f64) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let micros = (seconds * 1_000_000.0).round() as i64;
        let mut stats = Self::new(epoch);
        stats.ended_at = Some(epoch + Duration::microseconds(micros));
        stats.active = false;
        stats.credits_start = 0.0;
        stats.credits_end = coins_returned;
        stats
    }

    pub fn total_logs(&self) -> u32 {
        self.warnings + self.errors + self.exceptions
    }

    pub fn total_spins(&self) -> u32 {
        self.forced_spins + self.normal_spins + self.fast_spins
    }

    /// Increment the counter for a retained severity tier.
    pub fn count_log(&mut self, severity: Severity) {
        match severity {
            Severity::Info => {}
            Severity::Warning => self.warnings += 1,
            Severity::Error => self.errors += 1,
            Severity::Exception => self.exceptions += 1,
        }
    }

    pub fn count_spin(&mut self, bet: f64, forced: bool, fast: bool) {
        self.coins_wagered += bet;
        if forced {
            self.forced_spins += 1;
        } else if fast {
            self.fast_spins += 1;
        } else {
            self.normal_spins += 1;
        }
    }

    pub fn record_spin_duration(&mut self, secs: f64) {
        self.max_spin_secs = self.max_spin_secs.max(secs);
        self.spin_secs_sum += secs;
        self.spin_secs_count += 1;
    }

    pub fn record_memory(&mut self, mb: f64) {
        self.max_memory_mb = self.max_memory_mb.max(mb);
        self.memory_mb_sum += mb;
        self.memory_samples += 1;
    }

    /// Advance the payout meter by a win amount.
    pub fn record_return(&mut self, amount: f64) {
        self.credits_end += amount;
    }

    pub fn record_bonus(&mut self, name: &str) {
        *self.bonus_entries.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn record_auto_spin(&mut self, phase: AutoSpinPhase) {
        match phase {
            AutoSpinPhase::Requested => self.auto_spins_requested += 1,
            AutoSpinPhase::Received => self.auto_spins_received += 1,
            AutoSpinPhase::Finished => self.auto_spins_finished += 1,
        }
    }

    /// Requested, received and finished auto-spins must agree once nothing is in flight.
    pub fn auto_spins_consistent(&self) -> bool {
        self.auto_spins_requested == self.auto_spins_received
            && self.auto_spins_received == self.auto_spins_finished
    }

    /// Mean spin duration, `-1.0` without samples.
    pub fn mean_spin_secs(&self) -> f64 {
        mean(self.spin_secs_sum, self.spin_secs_count)
    }

    /// Mean sampled memory, `-1.0` without samples.
    pub fn mean_memory_mb(&self) -> f64 {
        mean(self.memory_mb_sum, self.memory_samples)
    }

    pub fn coins_returned(&self) -> f64 {
        self.credits_end - self.credits_start
    }

    /// Returned over wagered; `None` when nothing was wagered.
    pub fn return_ratio(&self) -> Option<f64> {
        if self.coins_wagered == 0.0 {
            return None;
        }
        Some(self.coins_returned() / self.coins_wagered)
    }

    /// Elapsed seconds between start and end (or now while active).
    pub fn elapsed_secs(&self) -> f64 {
        let end = if self.active {
            Utc::now()
        } else {
            self.ended_at.unwrap_or(self.started_at)
        };
        duration_secs(end - self.started_at)
    }

    /// Seconds per spin, `-1.0` before the first spin.
    pub fn mean_secs_per_spin(&self) -> f64 {
        mean(self.elapsed_secs(), self.total_spins())
    }

    /// Stop the clock. Later elapsed-time queries use `at`.
    pub fn freeze(&mut self, at: DateTime<Utc>) {
        if !self.active {
            return;
        }
        self.active = false;
        self.ended_at = Some(at);
    }

    pub fn severity_class(&self) -> SeverityClass {
        classify(self.warnings, self.errors, self.exceptions)
    }

    pub fn severity_color(&self) -> Rgb {
        severity_color(self.warnings, self.errors, self.exceptions)
    }
}

/// Average statistics across runs.
///
/// Additive counters are summed and divided by the run count: log counters
/// round up so a single exception in any run stays visible, other integer
/// counters truncate, floating values divide exactly. Returns `None` (and logs
/// an error) for an empty slice.
///
/// The averaged return ratio is the mean returned over the mean wagered, not
/// the mean of per-run ratios.
pub fn average(runs: &[RunStatistics]) -> Option<RunStatistics> {
    if runs.is_empty() {
        error!("cannot average an empty list of run statistics");
        return None;
    }
    let n = runs.len() as u64;
    let nf = runs.len() as f64;

    let seconds = runs.iter().map(RunStatistics::elapsed_secs).sum::<f64>() / nf;
    let returned = runs.iter().map(RunStatistics::coins_returned).sum::<f64>() / nf;
    let mut avg = RunStatistics::from_averaged_scalars(seconds, returned);

    let sum = |field: fn(&RunStatistics) -> u32| -> u64 {
        runs.iter().map(|run| u64::from(field(run))).sum()
    };
    let round_up = |total: u64| to_u32(total.div_ceil(n));
    let truncate = |total: u64| to_u32(total / n);
    let fsum = |field: fn(&RunStatistics) -> f64| -> f64 {
        runs.iter().map(field).sum::<f64>() / nf
    };

    avg.warnings = round_up(sum(|r| r.warnings));
    avg.errors = round_up(sum(|r| r.errors));
    avg.exceptions = round_up(sum(|r| r.exceptions));

    avg.forced_spins = truncate(sum(|r| r.forced_spins));
    avg.normal_spins = truncate(sum(|r| r.normal_spins));
    avg.fast_spins = truncate(sum(|r| r.fast_spins));
    avg.auto_spins_requested = truncate(sum(|r| r.auto_spins_requested));
    avg.auto_spins_received = truncate(sum(|r| r.auto_spins_received));
    avg.auto_spins_finished = truncate(sum(|r| r.auto_spins_finished));
    avg.spin_secs_count = truncate(sum(|r| r.spin_secs_count));
    avg.memory_samples = truncate(sum(|r| r.memory_samples));

    avg.max_spin_secs = fsum(|r| r.max_spin_secs);
    avg.spin_secs_sum = fsum(|r| r.spin_secs_sum);
    avg.max_memory_mb = fsum(|r| r.max_memory_mb);
    avg.memory_mb_sum = fsum(|r| r.memory_mb_sum);
    avg.coins_wagered = fsum(|r| r.coins_wagered);

    let mut bonus_totals: BTreeMap<String, u64> = BTreeMap::new();
    for run in runs {
        for (name, count) in &run.bonus_entries {
            *bonus_totals.entry(name.clone()).or_insert(0) += u64::from(*count);
        }
    }
    avg.bonus_entries = bonus_totals
        .into_iter()
        .map(|(name, total)| (name, truncate(total)))
        .collect();

    Some(avg)
}

fn mean(sum: f64, count: u32) -> f64 {
    if count == 0 {
        return -1.0;
    }
    sum / f64::from(count)
}

fn duration_secs(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => duration.num_seconds() as f64,
    }
}

fn to_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen(seconds: i64, wagered: f64, returned: f64) -> RunStatistics {
        let start = DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000);
        let mut stats = RunStatistics::new(start);
        stats.coins_wagered = wagered;
        stats.credits_start = 1_000.0;
        stats.credits_end = 1_000.0 + returned;
        stats.freeze(start + Duration::seconds(seconds));
        stats
    }

    #[test]
    fn averaging_single_run_is_exact() {
        let start = DateTime::<Utc>::UNIX_EPOCH + Duration::days(19_000);
        let mut stats = RunStatistics::new(start);
        stats.coins_wagered = 37.25;
        stats.credits_start = 512.5;
        stats.credits_end = 531.125;
        stats.freeze(start + Duration::microseconds(123_456_789));

        let avg = average(std::slice::from_ref(&stats)).expect("average");
        assert_eq!(avg.elapsed_secs(), stats.elapsed_secs());
        assert_eq!(avg.return_ratio(), stats.return_ratio());
        assert_eq!(avg.coins_returned(), stats.coins_returned());
    }

    #[test]
    fn averaging_two_runs_uses_scalar_means() {
        let runs = [frozen(100, 10.0, 5.0), frozen(300, 30.0, 15.0)];
        let avg = average(&runs).expect("average");

        assert_eq!(avg.elapsed_secs(), 200.0);
        assert_eq!(avg.coins_wagered, 20.0);
        assert_eq!(avg.coins_returned(), 10.0);
        assert_eq!(avg.return_ratio(), Some(0.5));
        assert_eq!(avg.started_at, DateTime::<Utc>::UNIX_EPOCH);
        assert!(!avg.active);
    }

    #[test]
    fn averaging_rounds_logs_up_and_counters_down() {
        let mut a = frozen(10, 0.0, 0.0);
        let mut b = frozen(10, 0.0, 0.0);
        a.exceptions = 1;
        a.warnings = 3;
        b.warnings = 2;
        a.normal_spins = 3;
        b.normal_spins = 2;
        a.record_bonus("free_spins");

        let avg = average(&[a, b]).expect("average");
        assert_eq!(avg.exceptions, 1);
        assert_eq!(avg.warnings, 3);
        assert_eq!(avg.normal_spins, 2);
        assert_eq!(avg.bonus_entries.get("free_spins"), Some(&0));
    }

    #[test]
    fn averaging_empty_list_returns_none() {
        assert!(average(&[]).is_none());
    }

    #[test]
    fn return_ratio_undefined_without_wager() {
        let stats = frozen(5, 0.0, 3.0);
        assert_eq!(stats.return_ratio(), None);
    }

    #[test]
    fn means_are_negative_without_samples() {
        let mut stats = frozen(5, 0.0, 0.0);
        assert_eq!(stats.mean_spin_secs(), -1.0);
        assert_eq!(stats.mean_memory_mb(), -1.0);
        assert_eq!(stats.mean_secs_per_spin(), -1.0);

        stats.record_spin_duration(2.0);
        stats.record_spin_duration(4.0);
        assert_eq!(stats.mean_spin_secs(), 3.0);
        assert_eq!(stats.max_spin_secs, 4.0);
    }

    #[test]
    fn freeze_is_idempotent() {
        let mut stats = frozen(5, 0.0, 0.0);
        let first_end = stats.ended_at;
        stats.freeze(Utc::now());
        assert_eq!(stats.ended_at, first_end);
        assert_eq!(stats.elapsed_secs(), 5.0);
    }

    #[test]
    fn spin_counters_partition_by_cause() {
        let mut stats = RunStatistics::new(Utc::now());
        stats.count_spin(1.0, true, false);
        stats.count_spin(1.0, false, true);
        stats.count_spin(2.0, false, false);
        assert_eq!(
            (stats.forced_spins, stats.fast_spins, stats.normal_spins),
            (1, 1, 1)
        );
        assert_eq!(stats.total_spins(), 3);
        assert_eq!(stats.coins_wagered, 4.0);
    }

    #[test]
    fn auto_spin_consistency() {
        let mut stats = RunStatistics::new(Utc::now());
        assert!(stats.auto_spins_consistent());
        stats.record_auto_spin(AutoSpinPhase::Requested);
        assert!(!stats.auto_spins_consistent());
        stats.record_auto_spin(AutoSpinPhase::Received);
        stats.record_auto_spin(AutoSpinPhase::Finished);
        assert!(stats.auto_spins_consistent());
    }
}
