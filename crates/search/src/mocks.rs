//! Mock implementations of the search traits for testing without a model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use trajectory::TestOutcome;

use crate::engine::{Oracle, Task};
use crate::expr;
use crate::scorer::AttemptScorer;

// ---------------------------------------------------------------------------
// MockOracle
// ---------------------------------------------------------------------------

/// Canned responses keyed by prompt: exact match, then substring, then default.
#[derive(Default)]
struct CannedResponses {
    exact: HashMap<String, Vec<String>>,
    contains: Vec<(String, Vec<String>)>,
    default: Vec<String>,
}

impl CannedResponses {
    /// Responses for `prompt`, cycled or truncated to exactly `n` items.
    fn lookup(&self, prompt: &str, n: usize) -> Vec<String> {
        let base = self
            .exact
            .get(prompt)
            .or_else(|| {
                self.contains
                    .iter()
                    .find(|(pattern, _)| prompt.contains(pattern.as_str()))
                    .map(|(_, r)| r)
            })
            .unwrap_or(&self.default);
        base.iter().cycle().take(if base.is_empty() { 0 } else { n }).cloned().collect()
    }
}

/// Mock oracle returning canned text for generation and evaluation prompts.
///
/// Counts calls, records every prompt it sees, and can be scripted to fail.
#[derive(Default)]
pub struct MockOracle {
    generation: CannedResponses,
    evaluation: CannedResponses,
    generate_calls: AtomicUsize,
    evaluate_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
    always_fail: AtomicBool,
    fail_after: Option<usize>,
    total_calls: AtomicUsize,
    latency: Option<Duration>,
}

impl MockOracle {
    /// An oracle with no responses: every call returns an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// An oracle answering every generation prompt with `responses`.
    pub fn with_default_generation(responses: Vec<String>) -> Self {
        let mut oracle = Self::new();
        oracle.generation.default = responses;
        oracle
    }

    /// Add generation responses for an exact prompt.
    pub fn add_generation(&mut self, prompt: &str, responses: Vec<String>) {
        self.generation.exact.insert(prompt.to_string(), responses);
    }

    /// Add generation responses for any prompt containing `pattern`.
    ///
    /// Checked after exact matches, in insertion order.
    pub fn add_generation_contains(&mut self, pattern: &str, responses: Vec<String>) {
        self.generation.contains.push((pattern.to_string(), responses));
    }

    pub fn set_default_generation(&mut self, responses: Vec<String>) {
        self.generation.default = responses;
    }

    /// Add evaluation responses for an exact prompt.
    pub fn add_evaluation(&mut self, prompt: &str, responses: Vec<String>) {
        self.evaluation.exact.insert(prompt.to_string(), responses);
    }

    /// Add evaluation responses for any prompt containing `pattern`.
    pub fn add_evaluation_contains(&mut self, pattern: &str, responses: Vec<String>) {
        self.evaluation.contains.push((pattern.to_string(), responses));
    }

    pub fn set_default_evaluation(&mut self, responses: Vec<String>) {
        self.evaluation.default = responses;
    }

    /// Fail the first `n` calls (generate or evaluate), then behave normally.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Succeed for the first `n` calls, then fail every later call.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Fail every call.
    pub fn always_failing(self) -> Self {
        self.always_fail.store(true, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn evaluate_calls(&self) -> usize {
        self.evaluate_calls.load(Ordering::SeqCst)
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn begin_call(&self, prompt: &str) -> anyhow::Result<()> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let call_no = self.total_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.always_fail.load(Ordering::SeqCst) || self.fail_after.is_some_and(|n| call_no > n) {
            anyhow::bail!("mock oracle unavailable");
        }
        let scripted = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if scripted.is_ok() {
            anyhow::bail!("mock oracle transient failure");
        }
        Ok(())
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn generate(
        &self,
        prompt: &str,
        n: usize,
        _stop: Option<&[String]>,
        _max_tokens: usize,
    ) -> anyhow::Result<Vec<String>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.begin_call(prompt).await?;
        Ok(self.generation.lookup(prompt, n))
    }

    async fn evaluate(&self, prompt: &str, n: usize) -> anyhow::Result<Vec<String>> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        self.begin_call(prompt).await?;
        Ok(self.evaluation.lookup(prompt, n))
    }
}

// ---------------------------------------------------------------------------
// MockTask
// ---------------------------------------------------------------------------

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("Invalid number regex"));

/// Arithmetic puzzle task: combine the input numbers to reach a target.
///
/// Prompts are short fixed formats so tests can match them. A proposal line
/// is valid when it contains `=`, `(left:` and an operator. The test passes
/// when the extracted expression uses exactly the input numbers and
/// evaluates to the target.
pub struct MockTask {
    input: String,
    steps: usize,
    target: f64,
    stop: Option<String>,
}

impl MockTask {
    /// A 24-game style task over `input` with 3 steps.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            steps: 3,
            target: 24.0,
            stop: None,
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = target;
        self
    }

    pub fn with_stop(mut self, stop: &str) -> Self {
        self.stop = Some(stop.to_string());
        self
    }

    fn numbers(text: &str) -> Vec<u64> {
        let mut nums: Vec<u64> = NUMBER
            .find_iter(text)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        nums.sort_unstable();
        nums
    }
}

impl Task for MockTask {
    fn initial_input(&self) -> &str {
        &self.input
    }

    fn step_count(&self) -> usize {
        self.steps
    }

    fn stop_tokens(&self, _step: usize) -> Option<String> {
        self.stop.clone()
    }

    fn render_continuation_prompt(&self, input: &str, thought: &str) -> String {
        format!("Continue\nInput: {input}\nSteps:\n{thought}")
    }

    fn render_proposal_prompt(&self, input: &str, thought: &str) -> String {
        format!("Propose\nInput: {input}\nSteps:\n{thought}")
    }

    fn is_valid_proposal(&self, line: &str) -> bool {
        line.contains('=')
            && line.contains("(left:")
            && line.contains(['+', '-', '*', '/'])
    }

    fn render_evaluation_prompt(&self, input: &str, thought: &str) -> String {
        format!("Evaluate\nInput: {input}\nSteps:\n{thought}")
    }

    fn render_natural_attempt_prompt(&self, input: &str) -> String {
        format!("Solve\nInput: {input}")
    }

    fn render_critique_prompt(&self, input: &str, attempts_summary: &str) -> String {
        format!("Critique\nInput: {input}\nAttempts:\n{attempts_summary}")
    }

    fn render_refine_prompt(
        &self,
        input: &str,
        best_failed: &str,
        critique: &str,
        history: &str,
    ) -> String {
        format!(
            "Refine\nInput: {input}\nBest failed: {best_failed}\nCritique: {critique}\nHistory:\n{history}"
        )
    }

    fn test(&self, input: &str, candidate: &str) -> TestOutcome {
        let scorer = AttemptScorer::new(Some(self.target));
        let Some(expression) = scorer.extract_expression(candidate) else {
            return TestOutcome::fail();
        };
        if Self::numbers(&expression) != Self::numbers(input) {
            return TestOutcome::fail().with_metric("numbers_match", 0.0);
        }
        match expr::evaluate(&expression) {
            Ok(value) if (value - self.target).abs() < 1e-6 => {
                TestOutcome::pass().with_metric("value", value)
            }
            Ok(value) => TestOutcome::fail().with_metric("value", value),
            Err(_) => TestOutcome::fail(),
        }
    }

    fn numeric_target(&self) -> Option<f64> {
        Some(self.target)
    }
}
