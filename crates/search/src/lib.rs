//! Tree-of-thought search over text states.
//!
//! Two engines share one set of collaborator traits so any problem domain
//! and any text generator can be plugged in, and both can be tested with
//! mocks (no model required).
//!
//! # Key types
//!
//! - [`BeamSearchEngine`]: generate, deduplicate, score and select over a frontier
//! - [`RefinementEngine`]: generate, test, critique and regenerate whole attempts
//! - [`naive_solve`]: single-shot sampling baseline
//! - [`Task`] / [`Oracle`]: problem definition and external text generator
//! - [`ValueCache`]: per-problem, at-most-once evaluation memo
//! - [`SelectionPolicy`]: greedy top-K or score-weighted sampling
//! - [`AttemptScorer`]: heuristic ranking of failed attempts
//! - [`RetryingOracle`]: exponential-backoff decorator for any oracle
//! - [`BeamConfig`] / [`RefineConfig`] / [`RetryConfig`]: configuration loaded from TOML

pub mod beam;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod expr;
pub mod mocks;
pub mod naive;
pub mod node;
pub mod oracle;
pub mod parse;
pub mod refine;
pub mod scorer;
pub mod selection;

pub use beam::{BeamOutcome, BeamSearchEngine};
pub use cache::{CachedScore, ValueCache};
pub use cancel::CancelToken;
pub use config::{BeamConfig, EvaluateMode, GenerateMode, RefineConfig, RetryConfig, SelectMode};
pub use engine::{Oracle, RunAborted, SearchError, Task};
pub use naive::naive_solve;
pub use node::{Candidate, Thought};
pub use oracle::RetryingOracle;
pub use refine::{render_history, RefineOutcome, RefinementEngine};
pub use scorer::AttemptScorer;
pub use selection::{policy_for, GreedyTopK, SelectionPolicy, WeightedSampling};
pub use trajectory::RunStats;
