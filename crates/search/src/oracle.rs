//! Retry decorator for any [`Oracle`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RetryConfig;
use crate::engine::Oracle;

/// Wraps an oracle and retries failed calls with exponential backoff.
///
/// The first retry waits `base_delay_ms`, each further retry doubles it.
/// After `max_attempts` failures the last error is returned; engines treat
/// it as terminal.
pub struct RetryingOracle<O> {
    inner: O,
    config: RetryConfig,
}

impl<O: Oracle> RetryingOracle<O> {
    pub fn new(inner: O, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.config.base_delay_ms.saturating_mul(factor))
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.delay_for(attempt as u32);
                tracing::debug!(op, attempt, delay_ms = delay.as_millis() as u64, "Retrying oracle call");
                tokio::time::sleep(delay).await;
            }
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(op, attempt, error = %e, "Oracle call failed");
                    last_err = Some(e);
                }
            }
        }
        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no attempts made"));
        Err(err.context(format!("oracle {op} failed after {max_attempts} attempts")))
    }
}

#[async_trait]
impl<O: Oracle> Oracle for RetryingOracle<O> {
    async fn generate(
        &self,
        prompt: &str,
        n: usize,
        stop: Option<&[String]>,
        max_tokens: usize,
    ) -> anyhow::Result<Vec<String>> {
        self.with_retry("generate", || self.inner.generate(prompt, n, stop, max_tokens))
            .await
    }

    async fn evaluate(&self, prompt: &str, n: usize) -> anyhow::Result<Vec<String>> {
        self.with_retry("evaluate", || self.inner.evaluate(prompt, n))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockOracle;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let mock = MockOracle::with_default_generation(vec!["ok".into()]).failing_first(2);
        let oracle = RetryingOracle::new(mock, fast());
        let out = oracle.generate("p", 1, None, 10).await.unwrap();
        assert_eq!(out, vec!["ok".to_string()]);
        assert_eq!(oracle.inner().generate_calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mock = MockOracle::with_default_generation(vec!["ok".into()]).always_failing();
        let oracle = RetryingOracle::new(mock, fast());
        let err = oracle.evaluate("p", 1).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed after 3 attempts"), "{err:#}");
        assert_eq!(oracle.inner().evaluate_calls(), 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let oracle = RetryingOracle::new(MockOracle::new(), RetryConfig::default());
        assert_eq!(oracle.delay_for(1), Duration::from_millis(500));
        assert_eq!(oracle.delay_for(2), Duration::from_millis(1000));
        assert_eq!(oracle.delay_for(4), Duration::from_millis(4000));
    }
}
