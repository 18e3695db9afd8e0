//! TOML config loading for the batch runner.
//!
//! A run file has `[run]`, `[beam]`, `[refine]` and `[retry]` sections; every
//! section and field is optional. CLI flags are applied on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use search::{BeamConfig, RefineConfig, RetryConfig};
use trajectory::SolveMethod;

/// Top-level structure matching `configs/run.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunToml {
    /// Solver choice and per-problem limits.
    #[serde(default)]
    pub run: RunSection,
    /// Beam search parameters (used by `bfs` and `naive`).
    #[serde(default)]
    pub beam: BeamConfig,
    /// Refinement loop parameters (used by `refine`).
    #[serde(default)]
    pub refine: RefineConfig,
    /// Oracle retry/backoff parameters.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    /// Which solver to run for every problem.
    #[serde(default = "default_method")]
    pub method: SolveMethod,
    /// Per-problem wall-clock limit in seconds; 0 disables the limit.
    #[serde(default)]
    pub timeout_per_problem: u64,
}

fn default_method() -> SolveMethod {
    SolveMethod::Bfs
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            method: default_method(),
            timeout_per_problem: 0,
        }
    }
}

impl RunSection {
    /// Per-problem deadline, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_per_problem > 0).then(|| Duration::from_secs(self.timeout_per_problem))
    }
}

/// CLI values that take priority over the TOML file.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub method: Option<String>,
    pub timeout_per_problem: Option<u64>,
    pub n_select: Option<usize>,
    pub max_iterations: Option<usize>,
    pub seed: Option<u64>,
}

impl RunToml {
    /// Apply CLI overrides. Priority: defaults < TOML < CLI.
    pub fn apply_overrides(&mut self, overrides: &RunOverrides) -> anyhow::Result<()> {
        if let Some(method) = &overrides.method {
            self.run.method = SolveMethod::from_str_lossy(method)
                .ok_or_else(|| anyhow::anyhow!("unknown method '{method}' (expected bfs, refine or naive)"))?;
        }
        if let Some(t) = overrides.timeout_per_problem {
            self.run.timeout_per_problem = t;
        }
        if let Some(n) = overrides.n_select {
            self.beam.n_select = n;
        }
        if let Some(n) = overrides.max_iterations {
            self.refine.max_iterations = n;
        }
        if let Some(seed) = overrides.seed {
            self.beam.seed = Some(seed);
        }
        Ok(())
    }

    /// Validate the sections the chosen method uses.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.run.method {
            SolveMethod::Bfs | SolveMethod::Naive => self.beam.validate()?,
            SolveMethod::Refine => self.refine.validate()?,
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be > 0");
        }
        Ok(())
    }
}

/// Load and deserialize a `RunToml` from a TOML file.
pub fn load_run_toml(path: &Path) -> anyhow::Result<RunToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: RunToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), method = %config.run.method, "Loaded run config");
    Ok(config)
}
