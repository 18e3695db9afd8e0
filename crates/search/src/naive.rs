//! Single-shot sampling baseline.

use std::time::Instant;

use trajectory::{RunStats, Trace};

use crate::beam::BeamOutcome;
use crate::cancel::CancelToken;
use crate::config::BeamConfig;
use crate::engine::{Oracle, RunAborted, SearchError, Task};
use crate::node::Thought;

/// Sample `n_generate` whole solutions from the empty thought.
///
/// No scoring or selection; the samples are the final thoughts and the
/// step trace is empty.
pub async fn naive_solve(
    task: &dyn Task,
    oracle: &dyn Oracle,
    config: &BeamConfig,
    cancel: &CancelToken,
) -> Result<BeamOutcome, RunAborted> {
    let start = Instant::now();
    let mut stats = RunStats::default();

    let abort = |error: SearchError, stats: RunStats| RunAborted {
        error,
        trace: Trace::Steps(Vec::new()),
        stats,
    };

    if let Err(e) = cancel.check() {
        return Err(abort(e, stats));
    }

    let root = Thought::root();
    let prompt = task.render_continuation_prompt(task.initial_input(), root.text());
    let samples = match oracle
        .generate(&prompt, config.n_generate, None, config.sample_max_tokens)
        .await
    {
        Ok(samples) => samples,
        Err(e) => {
            stats.wall_time_ms = start.elapsed().as_millis() as u64;
            return Err(abort(SearchError::Oracle(e), stats));
        }
    };
    stats.generate_calls = 1;
    stats.wall_time_ms = start.elapsed().as_millis() as u64;
    stats.total_generate_time_ms = stats.wall_time_ms;

    tracing::info!(samples = samples.len(), wall_ms = stats.wall_time_ms, "Naive sampling complete");

    Ok(BeamOutcome {
        thoughts: samples.iter().map(|s| root.extend(s)).collect(),
        steps: Vec::new(),
        stats,
    })
}
