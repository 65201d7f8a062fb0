//! Human-readable text reports appended to the session directory.
//!
//! `results.txt` gets one block per finished (or flushed) run, `summary.txt`
//! one line per finished run with the target's running average.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::log_record::LogRecord;
use crate::core::statistics::RunStatistics;
use crate::core::types::{Severity, SeverityTotals};
use crate::test_run::TestRun;
use crate::target::TestTarget;

/// Append `text` to `path`, creating the file and its parent as needed.
pub fn append_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    Ok(())
}

/// Render the results block for one run.
///
/// `in_progress` marks a partial report written by an operator flush.
pub fn render_run_report(target_name: &str, run: &TestRun, in_progress: bool) -> String {
    let stats = &run.statistics;
    let mut out = String::new();
    let state = if in_progress { "in progress" } else { "finished" };
    let _ = writeln!(
        out,
        "=== {target_name} ({}) iteration #{} [{state}] ===",
        run.target_key, run.index
    );
    if let Some(mode) = run.end_mode {
        let how = if run.force_ended { "forced" } else { "normal" };
        let _ = writeln!(out, "ended in {mode} ({how})");
    }
    let _ = writeln!(
        out,
        "elapsed {:.1}s | spins {} (normal {}, fast {}, forced {}) | {}",
        stats.elapsed_secs(),
        stats.total_spins(),
        stats.normal_spins,
        stats.fast_spins,
        stats.forced_spins,
        per_spin(stats)
    );
    let _ = writeln!(
        out,
        "logs {} warnings, {} errors, {} exceptions | severity {} {}",
        stats.warnings,
        stats.errors,
        stats.exceptions,
        stats.severity_class().label(),
        stats.severity_color().to_hex()
    );
    let _ = writeln!(out, "{}", money_line(stats));
    if stats.spin_secs_count > 0 {
        let _ = writeln!(
            out,
            "spin duration mean {:.2}s max {:.2}s",
            stats.mean_spin_secs(),
            stats.max_spin_secs
        );
    }
    if stats.memory_samples > 0 {
        let _ = writeln!(
            out,
            "memory mean {:.1}MB max {:.1}MB ({} samples)",
            stats.mean_memory_mb(),
            stats.max_memory_mb,
            stats.memory_samples
        );
    }
    if !stats.bonus_entries.is_empty() {
        let bonuses: Vec<String> = stats
            .bonus_entries
            .iter()
            .map(|(name, count)| format!("{name} x{count}"))
            .collect();
        let _ = writeln!(out, "bonuses {}", bonuses.join(", "));
    }
    let _ = writeln!(
        out,
        "actions executed {}, remaining {}",
        run.executed_actions.len(),
        run.actions.remaining()
    );

    for record in &run.logs {
        render_record(&mut out, record);
    }
    for bug in &run.visual_bugs {
        let _ = writeln!(
            out,
            "-- visual bug [spin {}, action {}] {}",
            bug.spin_index,
            bug.action.as_deref().unwrap_or("-"),
            bug.description
        );
    }
    for severity in [Severity::Exception, Severity::Error] {
        let lines: Vec<&str> = run.spin_context().lines(severity).collect();
        if lines.is_empty() {
            continue;
        }
        let _ = writeln!(out, "recent {severity} context:");
        for line in lines {
            let _ = writeln!(out, "   {line}");
        }
    }
    out.push('\n');
    out
}

fn render_record(out: &mut String, record: &LogRecord) {
    let _ = writeln!(
        out,
        "-- {} #{} [spin {}, action {}] {}",
        record.severity,
        record.sequence,
        record.spin_index,
        record.action.as_deref().unwrap_or("-"),
        record.title()
    );
    if let Some(previous) = &record.previous_outcome {
        let _ = writeln!(out, "   previous outcome: {previous}");
    }
    if let Some(current) = &record.current_outcome {
        let _ = writeln!(out, "   current outcome: {current}");
    }
    if let Some(stack) = &record.stack {
        let _ = writeln!(out, "   stack:");
        for line in stack.lines() {
            let _ = writeln!(out, "     {line}");
        }
    }
}

fn per_spin(stats: &RunStatistics) -> String {
    if stats.total_spins() == 0 {
        return "no spins".to_string();
    }
    format!("{:.2}s/spin", stats.mean_secs_per_spin())
}

fn money_line(stats: &RunStatistics) -> String {
    let ratio = match stats.return_ratio() {
        Some(ratio) => format!("{ratio:.3}"),
        None => "n/a".to_string(),
    };
    format!(
        "wagered {:.2} | returned {:.2} | return ratio {ratio}",
        stats.coins_wagered,
        stats.coins_returned()
    )
}

/// One summary line for a target after a run finished, using its averages.
pub fn render_summary_line(target: &TestTarget, averaged: &RunStatistics) -> String {
    format!(
        "{} ({}): {} iterations | avg {:.1}s | {}w {}e {}x | {} | {}\n",
        target.name,
        target.key,
        target.runs.len(),
        averaged.elapsed_secs(),
        averaged.warnings,
        averaged.errors,
        averaged.exceptions,
        money_line(averaged),
        averaged.severity_class().label()
    )
}

/// Closing summary block with the session-wide severity totals.
pub fn render_totals(session_id: &str, totals: &SeverityTotals) -> String {
    format!(
        "session {session_id}: {} targets | clean {} | warning {} | error {} | exception {}\n",
        totals.total(),
        totals.clean,
        totals.warning,
        totals.error,
        totals.exception
    )
}
