//! Search configuration loaded from TOML.

use serde::{Deserialize, Serialize};

use crate::engine::SearchError;

/// How a frontier thought is expanded into candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerateMode {
    /// Request `n_generate` raw continuations and append each verbatim.
    Sample,
    /// Request one structured response and append each valid proposal line.
    Propose,
}

/// How pooled candidates are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluateMode {
    /// Score each candidate independently (cached by evaluation prompt).
    Value,
    /// Score all candidates jointly from vote tallies.
    Vote,
}

/// Which selection policy picks the next frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectMode {
    /// Deterministic top-K by score, ties in pool order.
    Greedy,
    /// Score-proportional sampling with replacement.
    Sample,
}

/// Beam search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamConfig {
    /// Expansion strategy.
    #[serde(default = "default_generate_mode")]
    pub generate_mode: GenerateMode,

    /// Scoring strategy.
    #[serde(default = "default_evaluate_mode")]
    pub evaluate_mode: EvaluateMode,

    /// Selection policy.
    #[serde(default = "default_select_mode")]
    pub select_mode: SelectMode,

    /// Continuations requested per frontier thought (sample mode).
    #[serde(default = "default_one")]
    pub n_generate: usize,

    /// Evaluation responses requested per scoring call.
    #[serde(default = "default_one")]
    pub n_evaluate: usize,

    /// Frontier size carried between steps.
    #[serde(default = "default_one")]
    pub n_select: usize,

    /// Override for the task's step count.
    #[serde(default)]
    pub steps: Option<usize>,

    /// Text appended after each proposal line.
    #[serde(default = "default_step_separator")]
    pub step_separator: String,

    /// Token limit for the proposal request.
    #[serde(default = "default_propose_max_tokens")]
    pub propose_max_tokens: usize,

    /// Token limit for each sampled continuation.
    #[serde(default = "default_sample_max_tokens")]
    pub sample_max_tokens: usize,

    /// Neutral score used when no number can be parsed from evaluations.
    #[serde(default = "default_score")]
    pub default_score: f64,

    /// Maximum oracle evaluations in flight within one step (1 = sequential).
    #[serde(default = "default_one")]
    pub max_concurrency: usize,

    /// Seed for sampling selection. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Whether value evaluations go through the per-problem cache.
    #[serde(default = "default_true")]
    pub cache_values: bool,
}

fn default_generate_mode() -> GenerateMode {
    GenerateMode::Propose
}
fn default_evaluate_mode() -> EvaluateMode {
    EvaluateMode::Value
}
fn default_select_mode() -> SelectMode {
    SelectMode::Greedy
}
fn default_one() -> usize {
    1
}
fn default_step_separator() -> String {
    "\n".to_string()
}
fn default_propose_max_tokens() -> usize {
    400
}
fn default_sample_max_tokens() -> usize {
    1000
}
fn default_score() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}

impl BeamConfig {
    /// Reject unusable settings and warn about suspicious ones.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.n_select == 0 {
            return Err(SearchError::InvalidConfig("n_select must be > 0".into()));
        }
        if self.generate_mode == GenerateMode::Sample && self.n_generate == 0 {
            return Err(SearchError::InvalidConfig(
                "n_generate must be > 0 in sample mode".into(),
            ));
        }
        if self.n_evaluate == 0 {
            return Err(SearchError::InvalidConfig("n_evaluate must be > 0".into()));
        }
        if self.default_score < 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "default_score must be non-negative, got {}",
                self.default_score
            )));
        }
        if self.max_concurrency == 0 {
            tracing::warn!("max_concurrency = 0, treating as sequential dispatch");
        }
        if self.select_mode == SelectMode::Sample && self.seed.is_none() {
            tracing::debug!("sampling selection without a seed; runs are not reproducible");
        }
        Ok(())
    }
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            generate_mode: default_generate_mode(),
            evaluate_mode: default_evaluate_mode(),
            select_mode: default_select_mode(),
            n_generate: default_one(),
            n_evaluate: default_one(),
            n_select: default_one(),
            steps: None,
            step_separator: default_step_separator(),
            propose_max_tokens: default_propose_max_tokens(),
            sample_max_tokens: default_sample_max_tokens(),
            default_score: default_score(),
            max_concurrency: default_one(),
            seed: None,
            cache_values: default_true(),
        }
    }
}

/// Refinement loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Iteration budget.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Attempts requested per iteration.
    #[serde(default = "default_one")]
    pub attempts_per_iteration: usize,

    /// Token limit for each attempt.
    #[serde(default = "default_attempt_max_tokens")]
    pub attempt_max_tokens: usize,

    /// Token limit for the critique.
    #[serde(default = "default_critique_max_tokens")]
    pub critique_max_tokens: usize,
}

fn default_max_iterations() -> usize {
    5
}
fn default_attempt_max_tokens() -> usize {
    400
}
fn default_critique_max_tokens() -> usize {
    300
}

impl RefineConfig {
    /// Reject unusable settings.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_iterations == 0 {
            return Err(SearchError::InvalidConfig("max_iterations must be > 0".into()));
        }
        if self.attempts_per_iteration == 0 {
            return Err(SearchError::InvalidConfig(
                "attempts_per_iteration must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            attempts_per_iteration: default_one(),
            attempt_max_tokens: default_attempt_max_tokens(),
            critique_max_tokens: default_critique_max_tokens(),
        }
    }
}

/// Backoff parameters for [`RetryingOracle`](crate::oracle::RetryingOracle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total tries per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first retry; doubled for each further retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> usize {
    5
}
fn default_base_delay_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = BeamConfig::default();
        assert_eq!(cfg.generate_mode, GenerateMode::Propose);
        assert_eq!(cfg.evaluate_mode, EvaluateMode::Value);
        assert_eq!(cfg.select_mode, SelectMode::Greedy);
        assert_eq!(cfg.n_generate, 1);
        assert_eq!(cfg.n_select, 1);
        assert!(cfg.steps.is_none());
        assert_eq!(cfg.step_separator, "\n");
        assert_eq!(cfg.propose_max_tokens, 400);
        assert!((cfg.default_score - 1.0).abs() < 1e-9);
        assert!(cfg.cache_values);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
            generate_mode = "sample"
            select_mode = "sample"
            n_generate = 5
            n_select = 3
            seed = 7
        "#;
        let cfg: BeamConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.generate_mode, GenerateMode::Sample);
        assert_eq!(cfg.select_mode, SelectMode::Sample);
        assert_eq!(cfg.n_generate, 5);
        assert_eq!(cfg.n_select, 3);
        assert_eq!(cfg.seed, Some(7));
        // Defaults for unspecified fields
        assert_eq!(cfg.evaluate_mode, EvaluateMode::Value);
        assert_eq!(cfg.n_evaluate, 1);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let toml_str = r#"generate_mode = "dfs""#;
        assert!(toml::from_str::<BeamConfig>(toml_str).is_err());
    }

    #[test]
    fn test_validate_zero_select() {
        let cfg = BeamConfig {
            n_select: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(SearchError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_negative_default_score() {
        let cfg = BeamConfig {
            default_score: -1.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_refine_defaults_and_toml() {
        let cfg = RefineConfig::default();
        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.attempts_per_iteration, 1);
        assert_eq!(cfg.critique_max_tokens, 300);

        let cfg: RefineConfig = toml::from_str("max_iterations = 2\nattempts_per_iteration = 4").unwrap();
        assert_eq!(cfg.max_iterations, 2);
        assert_eq!(cfg.attempts_per_iteration, 4);
        assert_eq!(cfg.attempt_max_tokens, 400);
    }

    #[test]
    fn test_refine_validate_zero_iterations() {
        let cfg = RefineConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_retry_defaults() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.base_delay_ms, 500);
    }
}
