//! Reads problem logs back from JSON trace files.

use crate::types::{ProblemLog, Trace, TraceSummary};
use std::path::{Path, PathBuf};

/// Static methods for reading trace logs.
pub struct TraceReader;

impl TraceReader {
    /// Read all problem logs from a trace file.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<ProblemLog>> {
        let contents = std::fs::read_to_string(path)?;
        let logs: Vec<ProblemLog> = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid trace log {}: {e}", path.display()))?;
        tracing::debug!(count = logs.len(), path = %path.display(), "Read trace log");
        Ok(logs)
    }

    /// Read problem logs from multiple trace files, concatenated in argument order.
    pub fn read_multiple(paths: &[PathBuf]) -> anyhow::Result<Vec<ProblemLog>> {
        let mut all_logs = Vec::new();
        for path in paths {
            let mut logs = Self::read_all(path)?;
            all_logs.append(&mut logs);
        }
        Ok(all_logs)
    }

    /// Compute summary statistics from a trace file.
    pub fn read_summary(path: &Path) -> anyhow::Result<TraceSummary> {
        let logs = Self::read_all(path)?;
        Ok(summarize(&logs))
    }

    /// Read only the log for a specific problem.
    pub fn read_for_problem(path: &Path, problem: &str) -> anyhow::Result<Option<ProblemLog>> {
        let logs = Self::read_all(path)?;
        Ok(logs.into_iter().find(|l| l.problem == problem))
    }
}

/// Aggregate statistics over a slice of problem logs.
pub fn summarize(logs: &[ProblemLog]) -> TraceSummary {
    let mut summary = TraceSummary {
        total_problems: logs.len(),
        ..TraceSummary::default()
    };
    let mut accuracy_sum = 0.0;

    for log in logs {
        if log.solved() {
            summary.solved_problems += 1;
        }
        if log.error.is_some() {
            summary.errored_problems += 1;
        }
        accuracy_sum += log.accuracy();
        match &log.trace {
            Trace::Steps(steps) => summary.total_steps += steps.len(),
            Trace::Iterations(iters) => summary.total_iterations += iters.len(),
        }
        summary.total_oracle_calls +=
            u64::from(log.stats.generate_calls) + u64::from(log.stats.evaluate_calls);
        summary.total_cache_hits += u64::from(log.stats.cache_hits);
    }

    if !logs.is_empty() {
        let n = logs.len() as f64;
        summary.avg_accuracy = accuracy_sum / n;
        summary.any_accuracy = summary.solved_problems as f64 / n;
    }
    summary
}
