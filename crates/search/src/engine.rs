//! Collaborator contracts shared by both engines: the pluggable [`Task`],
//! the external [`Oracle`], and the error types a run can end with.

use async_trait::async_trait;

use trajectory::{RunStats, TestOutcome, Trace};

use crate::parse;

/// Errors that can end a solve.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The oracle failed terminally (its own retries exhausted).
    #[error("Oracle error: {0}")]
    Oracle(#[source] anyhow::Error),
    /// The run was cancelled externally.
    #[error("Run cancelled")]
    Cancelled,
    /// The run exceeded its deadline.
    #[error("Run timed out after {elapsed_ms} ms")]
    TimedOut { elapsed_ms: u64 },
    /// A task produced a score the selection policy cannot use.
    #[error("Invalid score {score} for candidate {index}: scores must be finite and non-negative")]
    InvalidScore { index: usize, score: f64 },
    /// Engine configuration is unusable.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// A solve that stopped before producing a result.
///
/// Carries whatever trace and statistics were accumulated up to the abort.
#[derive(Debug, thiserror::Error)]
#[error("run aborted after {} trace records: {error}", .trace.len())]
pub struct RunAborted {
    /// Why the run stopped.
    #[source]
    pub error: SearchError,
    /// Records completed before the abort.
    pub trace: Trace,
    /// Statistics up to the abort.
    pub stats: RunStats,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Problem definition consumed by both engines.
///
/// One instance describes one problem: it knows its input, how to render
/// every prompt, how to read oracle output, and how to judge a solution.
pub trait Task: Send + Sync {
    /// Raw problem input.
    fn initial_input(&self) -> &str;

    /// Number of beam search steps for this problem.
    fn step_count(&self) -> usize;

    /// Stop sequence bounding a sampled continuation at `step`.
    fn stop_tokens(&self, _step: usize) -> Option<String> {
        None
    }

    /// Prompt asking for a free-form continuation of `thought`.
    fn render_continuation_prompt(&self, input: &str, thought: &str) -> String;

    /// Prompt asking for several structured next-step proposals.
    fn render_proposal_prompt(&self, input: &str, thought: &str) -> String;

    /// Syntactic validity predicate for one trimmed proposal line.
    fn is_valid_proposal(&self, _line: &str) -> bool {
        true
    }

    /// Extract valid proposal lines from a raw proposal response, in order.
    fn parse_proposal_lines(&self, raw: &str) -> Vec<String> {
        parse::proposal_lines(raw, |line| self.is_valid_proposal(line))
    }

    /// Prompt asking the evaluator to score `thought`. Also the cache key.
    fn render_evaluation_prompt(&self, input: &str, thought: &str) -> String;

    /// Reduce evaluator responses to one score; `None` if nothing parses.
    fn reduce_evaluation_responses(&self, responses: &[String]) -> Option<f64> {
        parse::mean_score(responses)
    }

    /// Joint prompt listing every candidate for a vote.
    fn render_vote_prompt(&self, input: &str, thoughts: &[&str]) -> String {
        format!("{input}\n\n{}", parse::numbered_choices(thoughts))
    }

    /// One score per candidate from vote responses.
    fn reduce_votes(&self, responses: &[String], n_candidates: usize) -> Vec<f64> {
        parse::tally_votes(responses, n_candidates)
    }

    /// Prompt for a first, unguided whole-solution attempt.
    fn render_natural_attempt_prompt(&self, input: &str) -> String;

    /// Prompt asking why a batch of attempts failed.
    fn render_critique_prompt(&self, input: &str, attempts_summary: &str) -> String;

    /// Prompt for an improved attempt given the best failure, critique and history.
    fn render_refine_prompt(
        &self,
        input: &str,
        best_failed: &str,
        critique: &str,
        history: &str,
    ) -> String;

    /// Binary correctness test plus auxiliary metrics.
    fn test(&self, input: &str, candidate: &str) -> TestOutcome;

    /// Numeric value a correct expression should evaluate to, if any.
    ///
    /// Only used to rank failed refinement attempts.
    fn numeric_target(&self) -> Option<f64> {
        None
    }
}

/// External stochastic text generator and evaluator.
///
/// Implementations own retry/backoff; an `Err` is terminal for the run.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generate `n` completions of `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        n: usize,
        stop: Option<&[String]>,
        max_tokens: usize,
    ) -> anyhow::Result<Vec<String>>;

    /// Produce `n` evaluation responses for `prompt`.
    async fn evaluate(&self, prompt: &str, n: usize) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
impl<O: Oracle + ?Sized> Oracle for std::sync::Arc<O> {
    async fn generate(
        &self,
        prompt: &str,
        n: usize,
        stop: Option<&[String]>,
        max_tokens: usize,
    ) -> anyhow::Result<Vec<String>> {
        (**self).generate(prompt, n, stop, max_tokens).await
    }

    async fn evaluate(&self, prompt: &str, n: usize) -> anyhow::Result<Vec<String>> {
        (**self).evaluate(prompt, n).await
    }
}
