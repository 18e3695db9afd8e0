//! Frontier selection strategies: deterministic top-K and score-weighted sampling.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use rand::distributions::{Distribution, Uniform, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::SelectMode;
use crate::engine::SearchError;

/// Picks pool indices for the next frontier from candidate scores.
pub trait SelectionPolicy: Send {
    /// Return indices into `scores`, in frontier order.
    fn select(&mut self, scores: &[f64], k: usize) -> Result<Vec<usize>, SearchError>;
}

/// Build the policy for `mode`. `seed` only affects sampling.
pub fn policy_for(mode: SelectMode, seed: Option<u64>) -> Box<dyn SelectionPolicy> {
    match mode {
        SelectMode::Greedy => Box::new(GreedyTopK),
        SelectMode::Sample => Box::new(match seed {
            Some(seed) => WeightedSampling::seeded(seed),
            None => WeightedSampling::from_entropy(),
        }),
    }
}

/// Top `k` by descending score; ties keep pool order.
///
/// Returns exactly `min(k, scores.len())` distinct indices.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyTopK;

impl SelectionPolicy for GreedyTopK {
    fn select(&mut self, scores: &[f64], k: usize) -> Result<Vec<usize>, SearchError> {
        let mut order: Vec<usize> = (0..scores.len()).collect();
        // sort_by_key is stable, so equal scores stay in pool order.
        order.sort_by_key(|&i| Reverse(OrderedFloat(scores[i])));
        order.truncate(k);
        Ok(order)
    }
}

/// `k` independent draws with replacement, probability proportional to score.
///
/// Negative or non-finite scores are rejected. A non-positive total falls
/// back to uniform draws over the pool.
pub struct WeightedSampling {
    rng: StdRng,
}

impl WeightedSampling {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl SelectionPolicy for WeightedSampling {
    fn select(&mut self, scores: &[f64], k: usize) -> Result<Vec<usize>, SearchError> {
        if let Some((index, &score)) = scores
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite() || **s < 0.0)
        {
            return Err(SearchError::InvalidScore { index, score });
        }
        if scores.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let total: f64 = scores.iter().sum();
        if total <= 0.0 {
            tracing::debug!(pool = scores.len(), "Score total is zero, sampling uniformly");
            let uniform = Uniform::new(0, scores.len());
            return Ok((0..k).map(|_| uniform.sample(&mut self.rng)).collect());
        }

        let weighted = WeightedIndex::new(scores).map_err(|e| {
            SearchError::InvalidConfig(format!("cannot build sampling distribution: {e}"))
        })?;
        Ok((0..k).map(|_| weighted.sample(&mut self.rng)).collect())
    }
}
