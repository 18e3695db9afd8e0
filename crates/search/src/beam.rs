//! Breadth-bounded beam search: generate, deduplicate, score, select.
//!
//! Each step expands every frontier thought, scores the pooled candidates,
//! and replaces the frontier wholesale with the selected subset. Oracle
//! evaluations within a step may run concurrently, but every record is
//! assembled in pool order so traces do not depend on scheduling.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use futures::stream::{self, StreamExt};

use trajectory::{CandidateRecord, RunStats, StepRecord, Trace};

use crate::cache::ValueCache;
use crate::cancel::CancelToken;
use crate::config::{BeamConfig, EvaluateMode, GenerateMode};
use crate::engine::{Oracle, RunAborted, SearchError, Task};
use crate::node::{Candidate, Thought};
use crate::selection::policy_for;

/// Result of a completed beam search.
#[derive(Debug, Clone)]
pub struct BeamOutcome {
    /// Frontier after the last step.
    pub thoughts: Vec<Thought>,
    /// One record per step, in order.
    pub steps: Vec<StepRecord>,
    pub stats: RunStats,
}

impl BeamOutcome {
    /// Text of every final thought.
    pub fn outputs(&self) -> Vec<String> {
        self.thoughts.iter().map(|t| t.text().to_string()).collect()
    }
}

/// Score of one unique candidate plus where it came from.
struct Evaluation {
    score: f64,
    cached: bool,
    parsed: bool,
    elapsed_ms: u64,
}

/// Beam search driver.
pub struct BeamSearchEngine {
    config: BeamConfig,
}

impl BeamSearchEngine {
    pub fn new(config: BeamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BeamConfig {
        &self.config
    }

    /// Run the search for the configured (or task-defined) number of steps.
    ///
    /// On abort the error carries every completed step and the statistics
    /// gathered so far.
    pub async fn run(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cache: &ValueCache,
        cancel: &CancelToken,
    ) -> Result<BeamOutcome, RunAborted> {
        let start = Instant::now();
        let mut steps = Vec::new();
        let mut stats = RunStats::default();

        let result = self
            .run_steps(task, oracle, cache, cancel, &mut steps, &mut stats)
            .await;
        stats.wall_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(thoughts) => {
                tracing::info!(
                    steps = steps.len(),
                    finals = thoughts.len(),
                    generate_calls = stats.generate_calls,
                    evaluate_calls = stats.evaluate_calls,
                    cache_hits = stats.cache_hits,
                    wall_ms = stats.wall_time_ms,
                    "Beam search complete"
                );
                Ok(BeamOutcome {
                    thoughts,
                    steps,
                    stats,
                })
            }
            Err(error) => {
                tracing::warn!(completed_steps = steps.len(), error = %error, "Beam search aborted");
                Err(RunAborted {
                    error,
                    trace: Trace::Steps(steps),
                    stats,
                })
            }
        }
    }

    async fn run_steps(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cache: &ValueCache,
        cancel: &CancelToken,
        records: &mut Vec<StepRecord>,
        stats: &mut RunStats,
    ) -> Result<Vec<Thought>, SearchError> {
        self.config.validate()?;

        let input = task.initial_input();
        let n_steps = self.config.steps.unwrap_or_else(|| task.step_count());
        let mut policy = policy_for(self.config.select_mode, self.config.seed);
        let mut frontier = vec![Thought::root()];

        for step in 0..n_steps {
            cancel.check()?;
            let mut warnings = Vec::new();

            let mut candidates = self
                .expand(task, oracle, cancel, input, step, &frontier, stats, &mut warnings)
                .await?;

            let (scores, duplicate_of, cached) = match self.config.evaluate_mode {
                EvaluateMode::Value => {
                    self.score_values(task, oracle, cache, cancel, input, &candidates, stats, &mut warnings)
                        .await?
                }
                EvaluateMode::Vote => {
                    let scores = self
                        .score_votes(task, oracle, cancel, input, &candidates, stats, &mut warnings)
                        .await?;
                    let n = scores.len();
                    (scores, vec![None; n], vec![false; n])
                }
            };
            for (candidate, &score) in candidates.iter_mut().zip(&scores) {
                candidate.score = Some(score);
            }

            let selected = policy.select(&scores, self.config.n_select)?;

            let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            tracing::info!(
                step,
                frontier = frontier.len(),
                candidates = candidates.len(),
                selected = selected.len(),
                best_score = if scores.is_empty() { 0.0 } else { best },
                "Beam step complete"
            );

            records.push(StepRecord {
                step,
                frontier: frontier.iter().map(|t| t.text().to_string()).collect(),
                candidates: candidates
                    .iter()
                    .enumerate()
                    .map(|(i, c)| CandidateRecord {
                        text: c.text().to_string(),
                        parent: c.parent_index,
                        score: scores[i],
                        duplicate_of: duplicate_of[i],
                        cached: cached[i],
                    })
                    .collect(),
                selected: selected.clone(),
                warnings,
            });

            frontier = selected
                .iter()
                .map(|&i| candidates[i].thought.clone())
                .collect();
        }

        Ok(frontier)
    }

    /// Expand every frontier thought into candidates, in frontier order.
    #[allow(clippy::too_many_arguments)]
    async fn expand(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cancel: &CancelToken,
        input: &str,
        step: usize,
        frontier: &[Thought],
        stats: &mut RunStats,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Candidate>, SearchError> {
        let mut candidates = Vec::new();
        for (parent, thought) in frontier.iter().enumerate() {
            cancel.check()?;
            let gen_start = Instant::now();
            match self.config.generate_mode {
                GenerateMode::Sample => {
                    let prompt = task.render_continuation_prompt(input, thought.text());
                    let stop: Option<Vec<String>> = task.stop_tokens(step).map(|s| vec![s]);
                    let samples = oracle
                        .generate(
                            &prompt,
                            self.config.n_generate,
                            stop.as_deref(),
                            self.config.sample_max_tokens,
                        )
                        .await
                        .map_err(SearchError::Oracle)?;
                    stats.generate_calls += 1;
                    tracing::debug!(step, parent, samples = samples.len(), "Sampled continuations");
                    candidates.extend(
                        samples
                            .iter()
                            .map(|s| Candidate::new(thought.extend(s), parent, step)),
                    );
                }
                GenerateMode::Propose => {
                    let prompt = task.render_proposal_prompt(input, thought.text());
                    let responses = oracle
                        .generate(&prompt, 1, None, self.config.propose_max_tokens)
                        .await
                        .map_err(SearchError::Oracle)?;
                    stats.generate_calls += 1;
                    let raw = responses.first().map(String::as_str).unwrap_or("");
                    let lines = task.parse_proposal_lines(raw);
                    if lines.is_empty() {
                        stats.fallback_expansions += 1;
                        tracing::debug!(step, parent, "No valid proposal lines, keeping parent thought");
                        warnings.push(format!(
                            "frontier {parent}: no valid proposal lines, kept parent thought"
                        ));
                        candidates.push(Candidate::new(thought.clone(), parent, step));
                    } else {
                        tracing::debug!(step, parent, proposals = lines.len(), "Parsed proposals");
                        candidates.extend(lines.iter().map(|line| {
                            let step_text = format!("{line}{}", self.config.step_separator);
                            Candidate::new(thought.extend(&step_text), parent, step)
                        }));
                    }
                }
            }
            stats.total_generate_time_ms += gen_start.elapsed().as_millis() as u64;
        }
        Ok(candidates)
    }

    /// Score each candidate independently.
    ///
    /// Identical texts within the pool are evaluated once; unique texts go
    /// through the cache (when enabled) with up to `max_concurrency` oracle
    /// calls in flight.
    #[allow(clippy::too_many_arguments)]
    async fn score_values(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cache: &ValueCache,
        cancel: &CancelToken,
        input: &str,
        candidates: &[Candidate],
        stats: &mut RunStats,
        warnings: &mut Vec<String>,
    ) -> Result<(Vec<f64>, Vec<Option<usize>>, Vec<bool>), SearchError> {
        let n = candidates.len();
        let mut duplicate_of = vec![None; n];
        let mut unique = Vec::new();
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        for (i, candidate) in candidates.iter().enumerate() {
            match first_seen.entry(candidate.text()) {
                Entry::Occupied(e) => duplicate_of[i] = Some(*e.get()),
                Entry::Vacant(e) => {
                    e.insert(i);
                    unique.push(i);
                }
            }
        }

        let mut evaluations = std::pin::pin!(stream::iter(unique.iter().copied().map(|i| {
            let prompt = task.render_evaluation_prompt(input, candidates[i].text());
            self.evaluate_one(task, oracle, cache, cancel, prompt)
        }))
        .buffered(self.config.max_concurrency.max(1)));

        // Counted as each evaluation arrives; an abort keeps completed calls.
        let mut scores = vec![0.0; n];
        let mut cached = vec![false; n];
        let mut pending = unique.iter();
        while let Some(result) = evaluations.next().await {
            let eval = result?;
            let Some(&i) = pending.next() else { break };
            scores[i] = eval.score;
            cached[i] = eval.cached;
            if eval.cached {
                stats.cache_hits += 1;
            } else {
                stats.cache_misses += 1;
                stats.evaluate_calls += 1;
                stats.total_evaluate_time_ms += eval.elapsed_ms;
            }
            if !eval.parsed {
                stats.unparsed_scores += 1;
                tracing::warn!(
                    candidate = i,
                    default_score = self.config.default_score,
                    "Unparseable evaluation, using default score"
                );
                warnings.push(format!(
                    "candidate {i}: unparseable evaluation, used default score {}",
                    self.config.default_score
                ));
            }
        }
        for i in 0..n {
            if let Some(first) = duplicate_of[i] {
                scores[i] = scores[first];
                stats.cache_hits += 1;
            }
        }

        Ok((scores, duplicate_of, cached))
    }

    async fn evaluate_one(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cache: &ValueCache,
        cancel: &CancelToken,
        prompt: String,
    ) -> Result<Evaluation, SearchError> {
        if !self.config.cache_values {
            let (score, parsed, elapsed_ms) = self.query_value(task, oracle, cancel, &prompt).await?;
            return Ok(Evaluation {
                score,
                cached: false,
                parsed,
                elapsed_ms,
            });
        }

        let mut fresh: Option<(bool, u64)> = None;
        let slot = &mut fresh;
        let key = prompt.as_str();
        let lookup = cache
            .get_or_compute(key, move || async move {
                let (score, parsed, elapsed_ms) = self.query_value(task, oracle, cancel, key).await?;
                *slot = Some((parsed, elapsed_ms));
                Ok::<f64, SearchError>(score)
            })
            .await?;
        if lookup.hit {
            tracing::debug!(score = lookup.score, "Value cache hit");
        }
        let (parsed, elapsed_ms) = fresh.unwrap_or((true, 0));
        Ok(Evaluation {
            score: lookup.score,
            cached: lookup.hit,
            parsed,
            elapsed_ms,
        })
    }

    /// One oracle evaluation reduced to a score; `default_score` if nothing parses.
    async fn query_value(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cancel: &CancelToken,
        prompt: &str,
    ) -> Result<(f64, bool, u64), SearchError> {
        cancel.check()?;
        let start = Instant::now();
        let responses = oracle
            .evaluate(prompt, self.config.n_evaluate)
            .await
            .map_err(SearchError::Oracle)?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(match task.reduce_evaluation_responses(&responses) {
            Some(score) => (score, true, elapsed_ms),
            None => (self.config.default_score, false, elapsed_ms),
        })
    }

    /// Score all candidates jointly from one vote request.
    #[allow(clippy::too_many_arguments)]
    async fn score_votes(
        &self,
        task: &dyn Task,
        oracle: &dyn Oracle,
        cancel: &CancelToken,
        input: &str,
        candidates: &[Candidate],
        stats: &mut RunStats,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<f64>, SearchError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        cancel.check()?;
        let texts: Vec<&str> = candidates.iter().map(Candidate::text).collect();
        let prompt = task.render_vote_prompt(input, &texts);

        let start = Instant::now();
        let responses = oracle
            .evaluate(&prompt, self.config.n_evaluate)
            .await
            .map_err(SearchError::Oracle)?;
        stats.evaluate_calls += 1;
        stats.total_evaluate_time_ms += start.elapsed().as_millis() as u64;

        let mut scores = task.reduce_votes(&responses, texts.len());
        if scores.len() != texts.len() {
            warnings.push(format!(
                "vote reduction returned {} scores for {} candidates",
                scores.len(),
                texts.len()
            ));
            scores.resize(texts.len(), 0.0);
        }
        tracing::debug!(candidates = texts.len(), ?scores, "Vote tallies");
        Ok(scores)
    }
}
