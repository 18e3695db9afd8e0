//! JSON I/O for search traces.
//!
//! Provides the record types emitted by the beam search and refinement
//! engines, plus a writer/reader pair for persisting per-problem logs.

pub mod reader;
pub mod types;
pub mod writer;

pub use reader::{summarize, TraceReader};
pub use types::{
    AttemptRecord, CandidateRecord, IterationRecord, ProblemLog, RunStats, SolveMethod,
    StepRecord, TestOutcome, Trace, TraceSummary,
};
pub use writer::{now_ms, TraceWriter};
