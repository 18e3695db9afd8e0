//! Batch driver for the tree-of-thought solvers.
//!
//! Loads a TOML run config, solves a list of named tasks with one engine,
//! and persists a `ProblemLog` per problem through `trajectory::TraceWriter`.

pub mod config;
pub mod pipeline;
pub mod results;

pub use config::{load_run_toml, RunOverrides, RunSection, RunToml};
pub use pipeline::{solve_batch, solve_one, NamedTask};
pub use results::{BatchSummary, ProblemResult};
