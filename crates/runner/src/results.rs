//! Batch result aggregation.

use serde::{Deserialize, Serialize};
use trajectory::ProblemLog;

/// Aggregate results from one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of problems attempted.
    pub total: usize,
    /// Problems with at least one passing output.
    pub solved: usize,
    /// Problems whose solve aborted.
    pub errored: usize,
    /// Mean of per-problem success fractions.
    pub avg_accuracy: f64,
    /// Fraction of problems with any passing output.
    pub any_accuracy: f64,
    pub avg_wall_time_secs: f64,
    pub median_wall_time_secs: f64,
    /// Oracle generate + evaluate calls over the whole batch.
    pub total_oracle_calls: u64,
    pub per_problem: Vec<ProblemResult>,
}

/// Result for a single problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemResult {
    pub problem: String,
    pub solved: bool,
    pub accuracy: f64,
    pub wall_time_secs: f64,
    /// Abort reason, if any.
    pub error: Option<String>,
}

impl BatchSummary {
    /// Build the summary from the logs written during a batch.
    pub fn from_logs(logs: &[ProblemLog]) -> Self {
        let per_problem: Vec<ProblemResult> = logs
            .iter()
            .map(|log| ProblemResult {
                problem: log.problem.clone(),
                solved: log.solved(),
                accuracy: log.accuracy(),
                wall_time_secs: log.stats.wall_time_ms as f64 / 1000.0,
                error: log.error.clone(),
            })
            .collect();

        let total = per_problem.len();
        let solved = per_problem.iter().filter(|p| p.solved).count();
        let errored = per_problem.iter().filter(|p| p.error.is_some()).count();
        let mut times: Vec<f64> = per_problem.iter().map(|p| p.wall_time_secs).collect();
        let total_oracle_calls = logs
            .iter()
            .map(|l| u64::from(l.stats.generate_calls) + u64::from(l.stats.evaluate_calls))
            .sum();

        let (avg_accuracy, any_accuracy, avg_wall_time_secs) = if total == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let n = total as f64;
            (
                per_problem.iter().map(|p| p.accuracy).sum::<f64>() / n,
                solved as f64 / n,
                times.iter().sum::<f64>() / n,
            )
        };

        Self {
            total,
            solved,
            errored,
            avg_accuracy,
            any_accuracy,
            avg_wall_time_secs,
            median_wall_time_secs: median(&mut times),
            total_oracle_calls,
            per_problem,
        }
    }
}

/// Compute the median of a slice of f64 values.
///
/// Returns 0.0 for empty slices.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
