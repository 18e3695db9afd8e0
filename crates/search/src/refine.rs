//! Reflect-and-refine loop over whole-solution attempts.
//!
//! Iteration 0 asks for unguided attempts. Each later iteration refines the
//! most promising failure of the previous batch using the latest critique and
//! the running history. The loop stops on the first passing attempt or when
//! the iteration budget is spent, in which case the best failure over all
//! iterations is returned.

use std::time::Instant;

use trajectory::{AttemptRecord, IterationRecord, RunStats, Trace};

use crate::cancel::CancelToken;
use crate::config::RefineConfig;
use crate::engine::{Oracle, RunAborted, SearchError, Task};
use crate::scorer::AttemptScorer;

/// Result of a completed refinement run.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    /// Passing attempt, or the best-scoring failure when exhausted.
    pub best_attempt: String,
    /// Whether `best_attempt` passed the task's test.
    pub success: bool,
    /// Iterations actually run.
    pub iterations: usize,
    /// Attempts generated across all iterations.
    pub total_attempts: usize,
    pub records: Vec<IterationRecord>,
    pub stats: RunStats,
}

/// Render accumulated iteration summaries as `Iteration i: ...` lines.
pub fn render_history(summaries: &[String]) -> String {
    summaries
        .iter()
        .enumerate()
        .map(|(i, s)| format!("Iteration {i}: {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn iteration_summary(attempts: usize, succeeded: bool) -> String {
    format!(
        "Tried {attempts} attempts. {}",
        if succeeded { "SUCCESS!" } else { "All failed." }
    )
}

/// Drives generate, test, critique, regenerate.
pub struct RefinementEngine {
    config: RefineConfig,
}

impl RefinementEngine {
    pub fn new(config: RefineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Run until an attempt passes or `max_iterations` iterations have failed.
    ///
    /// On abort the error carries every iteration tested so far.
    pub async fn run(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cancel: &CancelToken,
    ) -> Result<RefineOutcome, RunAborted> {
        let start = Instant::now();
        let mut records = Vec::new();
        let mut stats = RunStats::default();

        let result = self
            .run_iterations(task, oracle, cancel, &mut records, &mut stats)
            .await;
        stats.wall_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok((best_attempt, success, total_attempts)) => {
                tracing::info!(
                    success,
                    iterations = records.len(),
                    total_attempts,
                    critiques = stats.critiques,
                    wall_ms = stats.wall_time_ms,
                    "Refinement complete"
                );
                Ok(RefineOutcome {
                    best_attempt,
                    success,
                    iterations: records.len(),
                    total_attempts,
                    records,
                    stats,
                })
            }
            Err(error) => {
                tracing::warn!(completed_iterations = records.len(), error = %error, "Refinement aborted");
                Err(RunAborted {
                    error,
                    trace: Trace::Iterations(records),
                    stats,
                })
            }
        }
    }

    /// Returns (best attempt, success, total attempts).
    async fn run_iterations(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cancel: &CancelToken,
        records: &mut Vec<IterationRecord>,
        stats: &mut RunStats,
    ) -> Result<(String, bool, usize), SearchError> {
        self.config.validate()?;

        let input = task.initial_input();
        let scorer = AttemptScorer::for_task(task);
        let max_iterations = self.config.max_iterations;

        let mut all_attempts: Vec<String> = Vec::new();
        let mut summaries: Vec<String> = Vec::new();
        let mut best_failed: Option<String> = None;
        let mut critique = String::new();

        for iteration in 0..max_iterations {
            cancel.check()?;

            let prompt = match &best_failed {
                None => task.render_natural_attempt_prompt(input),
                Some(seed) => {
                    let history = render_history(&summaries);
                    task.render_refine_prompt(input, seed, &critique, &history)
                }
            };

            let gen_start = Instant::now();
            let attempts = oracle
                .generate(
                    &prompt,
                    self.config.attempts_per_iteration,
                    None,
                    self.config.attempt_max_tokens,
                )
                .await
                .map_err(SearchError::Oracle)?;
            stats.generate_calls += 1;
            stats.total_generate_time_ms += gen_start.elapsed().as_millis() as u64;

            let outcomes: Vec<_> = attempts.iter().map(|a| task.test(input, a)).collect();
            let first_success = outcomes.iter().position(|o| o.success);
            let num_successes = outcomes.iter().filter(|o| o.success).count();
            let summary = scorer.summarize_attempts(&attempts);
            summaries.push(iteration_summary(attempts.len(), first_success.is_some()));

            tracing::info!(
                iteration,
                attempts = attempts.len(),
                successes = num_successes,
                "Refinement iteration tested"
            );

            records.push(IterationRecord {
                iteration,
                attempts: attempts
                    .iter()
                    .cloned()
                    .zip(outcomes)
                    .map(|(text, outcome)| AttemptRecord { text, outcome })
                    .collect(),
                num_successes,
                summary: summary.clone(),
                refined_from: best_failed.clone(),
                critique: None,
            });
            all_attempts.extend(attempts.iter().cloned());

            if let Some(index) = first_success {
                return Ok((attempts[index].clone(), true, all_attempts.len()));
            }

            if iteration + 1 == max_iterations {
                break;
            }

            best_failed = Some(
                scorer
                    .best_index(task, input, &attempts)
                    .map(|i| attempts[i].clone())
                    .unwrap_or_default(),
            );

            cancel.check()?;
            let critique_prompt = task.render_critique_prompt(input, &summary);
            let gen_start = Instant::now();
            let responses = oracle
                .generate(&critique_prompt, 1, None, self.config.critique_max_tokens)
                .await
                .map_err(SearchError::Oracle)?;
            stats.generate_calls += 1;
            stats.critiques += 1;
            stats.total_generate_time_ms += gen_start.elapsed().as_millis() as u64;

            critique = responses.into_iter().next().unwrap_or_default();
            tracing::debug!(iteration, critique_len = critique.len(), "Received critique");
            if let Some(record) = records.last_mut() {
                record.critique = Some(critique.clone());
            }
        }

        let best = scorer
            .best_index(task, input, &all_attempts)
            .map(|i| all_attempts[i].clone())
            .unwrap_or_default();
        Ok((best, false, all_attempts.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockOracle, MockTask};

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn config(max_iterations: usize, attempts: usize) -> RefineConfig {
        RefineConfig {
            max_iterations,
            attempts_per_iteration: attempts,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_history() {
        let summaries = strings(&["Tried 1 attempts. All failed.", "Tried 1 attempts. SUCCESS!"]);
        assert_eq!(
            render_history(&summaries),
            "Iteration 0: Tried 1 attempts. All failed.\nIteration 1: Tried 1 attempts. SUCCESS!"
        );
        assert_eq!(render_history(&[]), "");
    }

    #[tokio::test]
    async fn test_success_on_first_iteration() {
        let task = MockTask::new("5 5 5 9");
        let mut oracle = MockOracle::new();
        oracle.add_generation_contains("Solve", strings(&["5+5+5+9", "5+5+5+8"]));

        let out = RefinementEngine::new(config(5, 2))
            .run(&task, &oracle, &CancelToken::new())
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.best_attempt, "5+5+5+9");
        assert_eq!(out.iterations, 1);
        assert_eq!(out.total_attempts, 2);
        assert_eq!(out.records[0].num_successes, 1);
        assert!(out.records[0].critique.is_none());
        assert_eq!(out.stats.critiques, 0);
    }

    #[tokio::test]
    async fn test_success_after_refinement() {
        let task = MockTask::new("4 6 4 8");
        let mut oracle = MockOracle::new();
        oracle.add_generation_contains("Solve", strings(&["Answer: 4 + 6 + 4 + 8"]));
        // Refine prompts embed the critique text, so match them first.
        oracle.add_generation_contains("Refine", strings(&["Answer: (4 + 8) * (6 - 4) = 24"]));
        oracle.add_generation_contains("Critique", strings(&["Addition alone cannot reach 24."]));

        let out = RefinementEngine::new(config(5, 1))
            .run(&task, &oracle, &CancelToken::new())
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.iterations, 2);
        assert_eq!(out.stats.critiques, 1);
        assert_eq!(out.records[0].critique.as_deref(), Some("Addition alone cannot reach 24."));
        assert_eq!(out.records[1].refined_from.as_deref(), Some("Answer: 4 + 6 + 4 + 8"));

        let refine_prompt = oracle
            .prompts()
            .into_iter()
            .find(|p| p.starts_with("Refine"))
            .unwrap();
        assert!(refine_prompt.contains("Iteration 0: Tried 1 attempts. All failed."));
        assert!(refine_prompt.contains("Critique: Addition alone cannot reach 24."));
    }

    #[tokio::test]
    async fn test_exhaustion_returns_global_best_and_skips_last_critique() {
        let task = MockTask::new("1 2 3 4");
        let mut oracle = MockOracle::new();
        oracle.add_generation_contains("Solve", strings(&["Answer: (1 + 2) * (3 + 4)"]));
        oracle.add_generation_contains("Refine", strings(&["Answer: 1 + 2 + 3 + 4"]));
        oracle.add_generation_contains("Critique", strings(&["try again"]));

        let out = RefinementEngine::new(config(3, 1))
            .run(&task, &oracle, &CancelToken::new())
            .await
            .unwrap();

        assert!(!out.success);
        assert_eq!(out.iterations, 3);
        assert_eq!(out.total_attempts, 3);
        // 21 from iteration 0 beats the later 10s.
        assert_eq!(out.best_attempt, "Answer: (1 + 2) * (3 + 4)");
        assert_eq!(out.stats.critiques, 2);
        assert!(out.records[2].critique.is_none());
        // 3 attempt batches + 2 critiques.
        assert_eq!(oracle.generate_calls(), 5);
    }

    #[tokio::test]
    async fn test_summary_recorded_per_iteration() {
        let task = MockTask::new("1 2 3 4");
        let oracle = MockOracle::with_default_generation(strings(&["Answer: 1 + 2 + 3 + 4"]));

        let out = RefinementEngine::new(config(1, 1))
            .run(&task, &oracle, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(out.records[0].summary, "1. 1 + 2 + 3 + 4 = 10");
        assert_eq!(out.stats.critiques, 0);
    }

    #[tokio::test]
    async fn test_critique_failure_keeps_tested_iteration() {
        let task = MockTask::new("1 2 3 4");
        let oracle =
            MockOracle::with_default_generation(strings(&["Answer: 1 + 2 + 3 + 4"])).failing_after(1);

        let err = RefinementEngine::new(config(3, 1))
            .run(&task, &oracle, &CancelToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err.error, SearchError::Oracle(_)));
        assert_eq!(err.trace.len(), 1);
        assert_eq!(err.stats.generate_calls, 1);
    }

    #[tokio::test]
    async fn test_timeout_aborts_between_iterations() {
        let task = MockTask::new("1 2 3 4");
        let oracle = MockOracle::with_default_generation(strings(&["nope"]))
            .with_latency(std::time::Duration::from_millis(30));
        let cancel = CancelToken::with_timeout(std::time::Duration::from_millis(10));

        let err = RefinementEngine::new(config(5, 1))
            .run(&task, &oracle, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err.error, SearchError::TimedOut { .. }));
        assert_eq!(err.trace.len(), 1);
    }
}
