//! Heuristic ranking of failed whole-solution attempts.
//!
//! Used only to pick the refinement seed and the final fallback answer;
//! success is always decided by [`Task::test`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::Task;
use crate::expr;

/// Score given to an attempt that passes the task's test.
pub const SOLVED_SCORE: f64 = 100.0;

/// Ceiling for near misses: `max(0, NEAR_MISS_BASE - |target - value|)`.
pub const NEAR_MISS_BASE: f64 = 50.0;

const ANSWER_MARKER: &str = "answer:";
const PREVIEW_CHARS: usize = 100;

static OPERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+\-*/]").expect("Invalid operator regex"));

static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").expect("Invalid digit regex"));

/// Ranks attempts by how close their extracted expression lands to a numeric target.
#[derive(Debug, Clone)]
pub struct AttemptScorer {
    target: Option<f64>,
    /// `<expr> = <target>` anywhere in the text.
    equation: Option<Regex>,
    /// Trailing `= <target>` to strip from an extracted expression.
    trailing: Option<Regex>,
}

impl AttemptScorer {
    /// A scorer for `target`. With `None`, extraction still works but every
    /// failed attempt scores 0.
    pub fn new(target: Option<f64>) -> Self {
        let literal = target.map(|t| regex::escape(&format_number(t)));
        let equation = literal.as_deref().and_then(|lit| {
            compile(&format!(r"([0-9+\-*/().\s]+)\s*=\s*{lit}"))
        });
        let trailing = literal
            .as_deref()
            .and_then(|lit| compile(&format!(r"\s*=\s*{lit}\s*$")));
        Self {
            target,
            equation,
            trailing,
        }
    }

    /// A scorer for the task's numeric target.
    pub fn for_task(task: &dyn Task) -> Self {
        Self::new(task.numeric_target())
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    /// Pull a candidate expression out of free-form attempt text.
    ///
    /// Tried in order: the text after the last `answer:` marker (if it has
    /// an operator), the first `<expr> = <target>` match, the last line
    /// holding both a digit and an operator.
    pub fn extract_expression(&self, attempt: &str) -> Option<String> {
        let lower = attempt.to_lowercase();
        if let Some(pos) = lower.rfind(ANSWER_MARKER) {
            let candidate = self.strip_target(lower[pos + ANSWER_MARKER.len()..].trim());
            if OPERATOR.is_match(&candidate) {
                return Some(candidate);
            }
        }

        if let Some(caps) = self.equation.as_ref().and_then(|re| re.captures(attempt)) {
            let expr = caps[1].trim();
            if !expr.is_empty() {
                return Some(expr.to_string());
            }
        }

        attempt
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| DIGIT.is_match(line) && OPERATOR.is_match(line))
            .map(|line| self.strip_target(line))
    }

    fn strip_target(&self, text: &str) -> String {
        match &self.trailing {
            Some(re) => re.replace(text, "").into_owned(),
            None => text.to_string(),
        }
    }

    /// Heuristic score in `[0, 100]`.
    ///
    /// 100 if the task's test passes; otherwise `max(0, 50 - |target - value|)`
    /// for an extractable, evaluable expression; otherwise 0.
    pub fn score(&self, task: &dyn Task, input: &str, attempt: &str) -> f64 {
        if task.test(input, attempt).success {
            return SOLVED_SCORE;
        }
        let Some(target) = self.target else {
            return 0.0;
        };
        let Some(expression) = self.extract_expression(attempt) else {
            return 0.0;
        };
        match expr::evaluate(&expression) {
            Ok(value) => (NEAR_MISS_BASE - (target - value).abs()).max(0.0),
            Err(e) => {
                tracing::debug!(expression, error = %e, "Attempt expression did not evaluate");
                0.0
            }
        }
    }

    /// Index of the highest-scoring attempt; the first wins ties.
    pub fn best_index(&self, task: &dyn Task, input: &str, attempts: &[String]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, attempt) in attempts.iter().enumerate() {
            let score = self.score(task, input, attempt);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Numbered one-line-per-attempt summary used in critique prompts.
    pub fn summarize_attempts(&self, attempts: &[String]) -> String {
        attempts
            .iter()
            .enumerate()
            .map(|(i, attempt)| {
                let n = i + 1;
                match self.extract_expression(attempt) {
                    Some(e) => match expr::evaluate(&e) {
                        Ok(value) => format!("{n}. {e} = {}", format_value(value)),
                        Err(_) => format!("{n}. {e} (invalid arithmetic)"),
                    },
                    None => {
                        let preview: String = attempt.trim().chars().take(PREVIEW_CHARS).collect();
                        format!("{n}. {preview}... (no valid equation found)")
                    }
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Failed to compile target pattern");
            None
        }
    }
}

/// Summary values: rounded to 4 decimals, trailing zeros dropped.
fn format_value(value: f64) -> String {
    let rounded = (value * 1e4).round() / 1e4;
    if rounded.fract() == 0.0 {
        return format_number(rounded);
    }
    let text = format!("{rounded:.4}");
    text.trim_end_matches('0').to_string()
}

/// Integral values print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
