//! Data types for search traces, problem logs, and run statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which solver produced a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveMethod {
    /// Breadth-bounded tree search over stepwise thoughts.
    Bfs,
    /// Whole-solution generate/test/critique loop.
    Refine,
    /// Plain sampling with no search (baseline).
    Naive,
}

impl fmt::Display for SolveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bfs => write!(f, "bfs"),
            Self::Refine => write!(f, "refine"),
            Self::Naive => write!(f, "naive"),
        }
    }
}

impl SolveMethod {
    /// Parse from string. Returns `None` for unrecognized values.
    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s {
            "bfs" => Some(Self::Bfs),
            "refine" => Some(Self::Refine),
            "naive" => Some(Self::Naive),
            _ => None,
        }
    }
}

/// Binary correctness verdict plus task-defined auxiliary metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Whether the candidate solves the problem.
    pub success: bool,
    /// Task-specific metrics (e.g. letter accuracy on a grid).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl TestOutcome {
    /// A successful outcome with no metrics.
    pub fn pass() -> Self {
        Self {
            success: true,
            metrics: BTreeMap::new(),
        }
    }

    /// A failed outcome with no metrics.
    pub fn fail() -> Self {
        Self::default()
    }

    /// Attach a named metric.
    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }
}

/// One expanded candidate within a search step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Full thought text after expansion.
    pub text: String,
    /// Index of the frontier member this candidate was expanded from.
    pub parent: usize,
    /// Score assigned during evaluation.
    pub score: f64,
    /// Earlier pool index with identical text, if this candidate reused its score.
    #[serde(default)]
    pub duplicate_of: Option<usize>,
    /// Whether the score came from the value cache instead of a fresh oracle call.
    #[serde(default)]
    pub cached: bool,
}

/// Immutable log entry for one generate/score/select step of the beam search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Zero-based step index.
    pub step: usize,
    /// Frontier thoughts that were expanded in this step.
    pub frontier: Vec<String>,
    /// All candidates pooled in canonical order.
    pub candidates: Vec<CandidateRecord>,
    /// Pool indices chosen by the selection policy (may repeat under sampling).
    pub selected: Vec<usize>,
    /// Recovered conditions (empty expansions, unparseable scores).
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StepRecord {
    /// Texts of the selected candidates, in selection order.
    ///
    /// Indices with no matching candidate (a hand-edited log) are skipped.
    pub fn selected_texts(&self) -> Vec<&str> {
        self.selected
            .iter()
            .filter_map(|&i| self.candidates.get(i))
            .map(|c| c.text.as_str())
            .collect()
    }
}

/// One whole-solution attempt produced by the refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Raw attempt text from the oracle.
    pub text: String,
    /// Result of the task's correctness test.
    pub outcome: TestOutcome,
}

/// Immutable log entry for one generate/test(/critique) iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// Attempts generated in this iteration, in oracle order.
    pub attempts: Vec<AttemptRecord>,
    /// Number of attempts that passed the test.
    pub num_successes: usize,
    /// Human-readable per-attempt summary (numbered lines).
    pub summary: String,
    /// Failed attempt this iteration's prompt refined, `None` for iteration 0.
    #[serde(default)]
    pub refined_from: Option<String>,
    /// Critique requested after this iteration failed, if any.
    #[serde(default)]
    pub critique: Option<String>,
}

/// Ordered trace of a single problem solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "lowercase")]
pub enum Trace {
    /// Beam search steps.
    Steps(Vec<StepRecord>),
    /// Refinement iterations.
    Iterations(Vec<IterationRecord>),
}

impl Trace {
    /// Number of records in the trace.
    pub fn len(&self) -> usize {
        match self {
            Self::Steps(s) => s.len(),
            Self::Iterations(i) => i.len(),
        }
    }

    /// Whether the trace has no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::Steps(Vec::new())
    }
}

/// Counters and timings collected during one problem solve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Number of oracle `generate` calls.
    pub generate_calls: u32,
    /// Number of oracle `evaluate` calls.
    pub evaluate_calls: u32,
    /// Evaluations answered by the value cache or in-step dedup.
    pub cache_hits: u32,
    /// Evaluations that required an oracle call.
    pub cache_misses: u32,
    /// Expansions that produced no valid proposal and kept the parent thought.
    pub fallback_expansions: u32,
    /// Evaluations whose responses yielded no parseable score.
    pub unparsed_scores: u32,
    /// Number of critiques requested by the refinement loop.
    pub critiques: u32,
    /// Wall-clock time of the whole solve in milliseconds.
    pub wall_time_ms: u64,
    /// Cumulative time spent in generation calls.
    pub total_generate_time_ms: u64,
    /// Cumulative time spent in evaluation calls.
    pub total_evaluate_time_ms: u64,
}

/// Persisted record of one problem in a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemLog {
    /// Caller-assigned problem identifier.
    pub problem: String,
    /// Raw problem input.
    pub input: String,
    /// Solver that produced this log.
    pub method: SolveMethod,
    /// Final thoughts or attempts.
    pub outputs: Vec<String>,
    /// Test outcome for each output, in the same order.
    pub results: Vec<TestOutcome>,
    /// Number of refinement iterations used (0 for beam and naive runs).
    #[serde(default)]
    pub iterations: usize,
    /// Terminal error message if the solve aborted.
    #[serde(default)]
    pub error: Option<String>,
    /// Full or partial trace.
    pub trace: Trace,
    /// Run statistics.
    #[serde(default)]
    pub stats: RunStats,
    /// Unix timestamp in milliseconds when the log was created.
    pub timestamp_ms: u64,
}

impl ProblemLog {
    /// Whether any output passed the task's test.
    pub fn solved(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }

    /// Fraction of outputs that passed (0.0 when there are no outputs).
    pub fn accuracy(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let passed = self.results.iter().filter(|r| r.success).count();
        passed as f64 / self.results.len() as f64
    }
}

/// Quick statistics from a trace log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceSummary {
    /// Number of problems in the log.
    pub total_problems: usize,
    /// Problems with at least one passing output.
    pub solved_problems: usize,
    /// Problems whose solve aborted.
    pub errored_problems: usize,
    /// Sum of per-problem accuracy divided by problem count.
    pub avg_accuracy: f64,
    /// Fraction of problems with any passing output.
    pub any_accuracy: f64,
    /// Total beam steps across all problems.
    pub total_steps: usize,
    /// Total refinement iterations across all problems.
    pub total_iterations: usize,
    /// Total oracle calls (generate + evaluate).
    pub total_oracle_calls: u64,
    /// Total cache hits.
    pub total_cache_hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log(results: Vec<bool>) -> ProblemLog {
        ProblemLog {
            problem: "p0".to_string(),
            input: "4 9 10 13".to_string(),
            method: SolveMethod::Bfs,
            outputs: results.iter().map(|_| "out".to_string()).collect(),
            results: results
                .into_iter()
                .map(|ok| if ok { TestOutcome::pass() } else { TestOutcome::fail() })
                .collect(),
            iterations: 0,
            error: None,
            trace: Trace::default(),
            stats: RunStats::default(),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_method_display() {
        assert_eq!(SolveMethod::Bfs.to_string(), "bfs");
        assert_eq!(SolveMethod::Refine.to_string(), "refine");
        assert_eq!(SolveMethod::Naive.to_string(), "naive");
    }

    #[test]
    fn test_method_from_str_lossy() {
        assert_eq!(SolveMethod::from_str_lossy("bfs"), Some(SolveMethod::Bfs));
        assert_eq!(SolveMethod::from_str_lossy("refine"), Some(SolveMethod::Refine));
        assert_eq!(SolveMethod::from_str_lossy("dfs"), None);
    }

    #[test]
    fn test_outcome_with_metric() {
        let o = TestOutcome::fail().with_metric("r_letter", 0.6);
        assert!(!o.success);
        assert!((o.metrics["r_letter"] - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_outcome_deserialize_without_metrics() {
        let o: TestOutcome = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(o.success);
        assert!(o.metrics.is_empty());
    }

    #[test]
    fn test_trace_tagged_serialization() {
        let trace = Trace::Iterations(vec![IterationRecord {
            iteration: 0,
            attempts: vec![],
            num_successes: 0,
            summary: String::new(),
            refined_from: None,
            critique: Some("use multiplication".to_string()),
        }]);
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["kind"], "iterations");
        assert_eq!(json["records"][0]["critique"], "use multiplication");
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn test_selected_texts_allows_repeats() {
        let step = StepRecord {
            step: 0,
            frontier: vec![String::new()],
            candidates: vec![
                CandidateRecord {
                    text: "a\n".to_string(),
                    parent: 0,
                    score: 1.0,
                    duplicate_of: None,
                    cached: false,
                },
                CandidateRecord {
                    text: "b\n".to_string(),
                    parent: 0,
                    score: 3.0,
                    duplicate_of: None,
                    cached: false,
                },
            ],
            selected: vec![1, 1],
            warnings: vec![],
        };
        assert_eq!(step.selected_texts(), vec!["b\n", "b\n"]);
    }

    #[test]
    fn test_selected_texts_skips_out_of_range() {
        let json = r#"{
            "step": 0,
            "frontier": [""],
            "candidates": [
                {"text": "a\n", "parent": 0, "score": 2.0, "duplicate_of": null, "cached": false}
            ],
            "selected": [0, 7],
            "warnings": []
        }"#;
        let step: StepRecord = serde_json::from_str(json).unwrap();
        assert_eq!(step.selected_texts(), vec!["a\n"]);
    }

    #[test]
    fn test_problem_log_accuracy() {
        assert!((make_log(vec![true, false]).accuracy() - 0.5).abs() < 1e-9);
        assert!(make_log(vec![true, false]).solved());
        assert!(!make_log(vec![false]).solved());
        assert_eq!(make_log(vec![]).accuracy(), 0.0);
    }
}
