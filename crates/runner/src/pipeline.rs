/// Batch solving pipeline and trace log utilities.
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use search::{
    naive_solve, BeamSearchEngine, CancelToken, Oracle, RefinementEngine, RetryingOracle, Task,
    ValueCache,
};
use trajectory::{now_ms, ProblemLog, SolveMethod, Trace, TraceReader, TraceWriter};

use crate::config::{load_run_toml, RunOverrides, RunToml};
use crate::results::BatchSummary;

/// A problem instance paired with the identifier it is logged under.
pub struct NamedTask {
    pub id: String,
    pub task: Box<dyn Task>,
}

impl NamedTask {
    pub fn new(id: impl Into<String>, task: impl Task + 'static) -> Self {
        Self {
            id: id.into(),
            task: Box::new(task),
        }
    }
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    /// Path to the trace log JSON file.
    pub input: PathBuf,
    /// Output as JSON instead of human-readable text.
    pub json: bool,
}

/// Arguments for the `compare` subcommand.
#[derive(Debug)]
pub struct CompareArgs {
    /// Trace logs to compare, one column each.
    pub logs: Vec<PathBuf>,
}

/// Arguments for the `check-config` subcommand.
#[derive(Debug)]
pub struct CheckConfigArgs {
    pub config: PathBuf,
    pub method: Option<String>,
    pub timeout_per_problem: Option<u64>,
    pub n_select: Option<usize>,
    pub max_iterations: Option<usize>,
    pub seed: Option<u64>,
}

/// Solve one problem with the configured method and build its log.
///
/// A terminal failure does not propagate: the log carries the error message
/// together with the partial trace and statistics gathered before it.
pub async fn solve_one(named: &NamedTask, oracle: &dyn Oracle, config: &RunToml) -> ProblemLog {
    let task = named.task.as_ref();
    let input = task.initial_input();
    let cancel = match config.run.timeout() {
        Some(limit) => CancelToken::with_timeout(limit),
        None => CancelToken::new(),
    };

    let (outputs, iterations, trace, stats, error) = match config.run.method {
        SolveMethod::Bfs => {
            let cache = ValueCache::new();
            let engine = BeamSearchEngine::new(config.beam.clone());
            match engine.run(task, oracle, &cache, &cancel).await {
                Ok(out) => (out.outputs(), 0, Trace::Steps(out.steps), out.stats, None),
                Err(aborted) => (Vec::new(), 0, aborted.trace, aborted.stats, Some(aborted.error.to_string())),
            }
        }
        SolveMethod::Naive => match naive_solve(task, oracle, &config.beam, &cancel).await {
            Ok(out) => (out.outputs(), 0, Trace::Steps(out.steps), out.stats, None),
            Err(aborted) => (Vec::new(), 0, aborted.trace, aborted.stats, Some(aborted.error.to_string())),
        },
        SolveMethod::Refine => {
            let engine = RefinementEngine::new(config.refine.clone());
            match engine.run(task, oracle, &cancel).await {
                Ok(out) => (
                    vec![out.best_attempt],
                    out.iterations,
                    Trace::Iterations(out.records),
                    out.stats,
                    None,
                ),
                Err(aborted) => {
                    let iterations = aborted.trace.len();
                    (Vec::new(), iterations, aborted.trace, aborted.stats, Some(aborted.error.to_string()))
                }
            }
        }
    };

    let results = outputs.iter().map(|o| task.test(input, o)).collect();

    ProblemLog {
        problem: named.id.clone(),
        input: input.to_string(),
        method: config.run.method,
        outputs,
        results,
        iterations,
        error,
        trace,
        stats,
        timestamp_ms: now_ms(),
    }
}

/// Solve every task in order, persisting the log after each problem.
///
/// The oracle is wrapped in a [`RetryingOracle`] built from `config.retry`;
/// a problem whose retries are exhausted is recorded with its error and the
/// batch moves on.
pub async fn solve_batch(
    tasks: &[NamedTask],
    oracle: Arc<dyn Oracle>,
    config: &RunToml,
    writer: &mut TraceWriter,
) -> anyhow::Result<BatchSummary> {
    config.validate()?;
    let oracle = RetryingOracle::new(oracle, config.retry.clone());
    let start = Instant::now();
    let total = tasks.len();

    tracing::info!(problems = total, method = %config.run.method, "Starting batch");

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .expect("valid progress bar template")
            .progress_chars("=> "),
    );

    let mut solved_count = 0usize;
    for named in tasks {
        pb.set_message(named.id.clone());

        let log = solve_one(named, &oracle, config).await;
        match &log.error {
            Some(error) => {
                tracing::warn!(problem = named.id, error = %error, records = log.trace.len(), "Solve failed, continuing");
            }
            None if log.solved() => {
                solved_count += 1;
                tracing::info!(
                    problem = named.id,
                    accuracy = log.accuracy(),
                    wall_ms = log.stats.wall_time_ms,
                    "Solved"
                );
            }
            None => {
                tracing::info!(problem = named.id, wall_ms = log.stats.wall_time_ms, "Not solved");
            }
        }

        writer.record(log);
        writer.flush()?;
        pb.inc(1);
    }

    pb.finish_with_message("done");

    let summary = BatchSummary::from_logs(writer.logs());
    tracing::info!(
        solved = solved_count,
        total,
        avg_accuracy = summary.avg_accuracy,
        any_accuracy = summary.any_accuracy,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Batch complete"
    );
    Ok(summary)
}

/// Print statistics from a trace log.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let summary = TraceReader::read_summary(&args.input)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Trace Summary ---");
    println!("File: {}", args.input.display());
    println!("Problems: {}", summary.total_problems);
    println!("Solved: {}", summary.solved_problems);
    println!("Errored: {}", summary.errored_problems);
    println!("Avg accuracy: {:.3}", summary.avg_accuracy);
    println!("Any accuracy: {:.3}", summary.any_accuracy);
    println!("Beam steps: {}", summary.total_steps);
    println!("Refine iterations: {}", summary.total_iterations);
    println!("Oracle calls: {}", summary.total_oracle_calls);
    println!("Cache hits: {}", summary.total_cache_hits);
    Ok(())
}

/// Compare solve rates across several trace logs.
pub fn run_compare(args: CompareArgs) -> anyhow::Result<()> {
    if args.logs.len() < 2 {
        anyhow::bail!("compare needs at least two logs, got {}", args.logs.len());
    }

    let mut solved_sets: Vec<BTreeSet<String>> = Vec::with_capacity(args.logs.len());
    println!("{:<40} {:>8} {:>8} {:>10} {:>10}", "log", "total", "solved", "avg_acc", "any_acc");
    for path in &args.logs {
        let logs = TraceReader::read_all(path)?;
        let summary = BatchSummary::from_logs(&logs);
        println!(
            "{:<40} {:>8} {:>8} {:>10.3} {:>10.3}",
            path.display(),
            summary.total,
            summary.solved,
            summary.avg_accuracy,
            summary.any_accuracy
        );
        solved_sets.push(logs.iter().filter(|l| l.solved()).map(|l| l.problem.clone()).collect());
    }

    let (by_some, by_all) = solved_overlap(&solved_sets);
    let partial: Vec<&String> = by_some.difference(&by_all).collect();
    println!("\nSolved by all: {}", by_all.len());
    println!("Solved by some but not all: {}", partial.len());
    for problem in partial {
        let which: Vec<String> = args
            .logs
            .iter()
            .zip(&solved_sets)
            .filter(|(_, set)| set.contains(problem))
            .map(|(p, _)| p.display().to_string())
            .collect();
        println!("  {problem}: {}", which.join(", "));
    }
    Ok(())
}

/// Union and intersection of per-log solved sets.
fn solved_overlap(sets: &[BTreeSet<String>]) -> (BTreeSet<String>, BTreeSet<String>) {
    let union: BTreeSet<String> = sets.iter().flatten().cloned().collect();
    let intersection = union
        .iter()
        .filter(|p| sets.iter().all(|s| s.contains(*p)))
        .cloned()
        .collect();
    (union, intersection)
}

/// Load, override and validate a run config, then print the effective TOML.
pub fn run_check_config(args: CheckConfigArgs) -> anyhow::Result<()> {
    let config = effective_config(args)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// The config a batch would run with: file values, then CLI overrides.
fn effective_config(args: CheckConfigArgs) -> anyhow::Result<RunToml> {
    let mut config = load_run_toml(&args.config)?;
    config.apply_overrides(&RunOverrides {
        method: args.method,
        timeout_per_problem: args.timeout_per_problem,
        n_select: args.n_select,
        max_iterations: args.max_iterations,
        seed: args.seed,
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_solved_overlap() {
        let (union, inter) = solved_overlap(&[set(&["a", "b"]), set(&["b", "c"])]);
        assert_eq!(union, set(&["a", "b", "c"]));
        assert_eq!(inter, set(&["b"]));
    }

    #[test]
    fn test_solved_overlap_empty() {
        let (union, inter) = solved_overlap(&[]);
        assert!(union.is_empty());
        assert!(inter.is_empty());
    }

    fn check_args(config: PathBuf) -> CheckConfigArgs {
        CheckConfigArgs {
            config,
            method: None,
            timeout_per_problem: None,
            n_select: None,
            max_iterations: None,
            seed: None,
        }
    }

    #[test]
    fn test_effective_config_applies_cli_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.toml");
        std::fs::write(&path, "[run]\nmethod = \"refine\"\n[beam]\nn_select = 5\n").unwrap();

        let config = effective_config(CheckConfigArgs {
            method: Some("bfs".to_string()),
            n_select: Some(2),
            max_iterations: Some(7),
            seed: Some(11),
            ..check_args(path)
        })
        .unwrap();
        assert_eq!(config.run.method, SolveMethod::Bfs);
        assert_eq!(config.beam.n_select, 2);
        assert_eq!(config.refine.max_iterations, 7);
        assert_eq!(config.beam.seed, Some(11));
    }

    #[test]
    fn test_effective_config_rejects_invalid_override() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.toml");
        std::fs::write(&path, "").unwrap();
        let result = effective_config(CheckConfigArgs {
            n_select: Some(0),
            ..check_args(path)
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_compare_needs_two_logs() {
        let err = run_compare(CompareArgs {
            logs: vec![PathBuf::from("a.json")],
        })
        .unwrap_err();
        assert!(err.to_string().contains("at least two"));
    }
}
