//! Small parsers for oracle output: proposal lines, evaluation scores, votes.
//!
//! Each parser returns an explicit structured result (`Vec`, `Option`) and
//! never panics on malformed text.

use once_cell::sync::Lazy;
use regex::Regex;

static SCORE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"score[:\s]+(\d+)").expect("Invalid score marker regex"));

static STANDALONE_SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([1-9]|10)\b").expect("Invalid standalone score regex"));

static VOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"best choice is\D*(\d+)").expect("Invalid vote regex"));

/// Split a proposal response into trimmed, non-empty lines accepted by `is_valid`.
///
/// Order of appearance is preserved.
pub fn proposal_lines(raw: &str, is_valid: impl Fn(&str) -> bool) -> Vec<String> {
    raw.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && is_valid(line))
        .map(str::to_string)
        .collect()
}

/// Parse a 1..=10 score from a single evaluator response.
///
/// An explicit `score: N` marker wins; a marker with an out-of-range value
/// yields `None` without falling through. Otherwise the last standalone
/// 1..10 number on the last line that has one is used.
pub fn parse_score(response: &str) -> Option<f64> {
    let lower = response.to_lowercase();
    if let Some(caps) = SCORE_MARKER.captures(&lower) {
        let value: u32 = caps[1].parse().ok()?;
        return (1..=10).contains(&value).then_some(value as f64);
    }
    for line in lower.trim().lines().rev() {
        if let Some(last) = STANDALONE_SCORE.find_iter(line).last() {
            return last.as_str().parse::<f64>().ok();
        }
    }
    None
}

/// Average of every parseable score across responses; `None` if none parse.
pub fn mean_score(responses: &[String]) -> Option<f64> {
    let scores: Vec<f64> = responses.iter().filter_map(|r| parse_score(r)).collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Render candidates as `Choice N:` blocks (1-based) for a joint vote prompt.
pub fn numbered_choices(thoughts: &[&str]) -> String {
    thoughts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("Choice {}:\n{}", i + 1, t.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Count `best choice is N` votes (1-based) per candidate.
///
/// Responses without a vote, or voting outside `1..=n_candidates`, are ignored.
pub fn tally_votes(responses: &[String], n_candidates: usize) -> Vec<f64> {
    let mut tallies = vec![0.0; n_candidates];
    for response in responses {
        let lower = response.to_lowercase();
        let Some(caps) = VOTE.captures(&lower) else {
            tracing::debug!(response = %response.chars().take(80).collect::<String>(), "No vote found");
            continue;
        };
        match caps[1].parse::<usize>() {
            Ok(choice) if (1..=n_candidates).contains(&choice) => tallies[choice - 1] += 1.0,
            _ => tracing::debug!(vote = &caps[1], "Vote out of range"),
        }
    }
    tallies
}
