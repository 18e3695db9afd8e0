//! Per-problem memo of evaluation scores keyed by the rendered evaluation prompt.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Maps evaluation prompt text to its score.
///
/// Each key owns a `OnceCell`, so concurrent requesters for a key whose
/// computation is in flight wait on that computation instead of issuing a
/// second oracle call. Entries are never evicted; the cache lives for one
/// problem and is dropped with it.
#[derive(Default)]
pub struct ValueCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<f64>>>>,
    hits: AtomicU32,
    misses: AtomicU32,
}

/// Result of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedScore {
    /// The score for the key.
    pub score: f64,
    /// `true` if this caller did not run the computation.
    pub hit: bool,
}

impl ValueCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the score for `key`, running `compute` only if no score exists yet.
    ///
    /// `compute` runs at most once per key for the lifetime of the cache. If
    /// it fails, the key stays empty and the error is returned to this caller.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, compute: F) -> Result<CachedScore, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<f64, E>>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(key.to_string()).or_default())
        };

        let ran = AtomicBool::new(false);
        let score = *cell
            .get_or_try_init(|| {
                ran.store(true, Ordering::Relaxed);
                compute()
            })
            .await?;

        let hit = !ran.load(Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(CachedScore { score, hit })
    }

    /// Score for `key` if it has already been computed.
    pub fn peek(&self, key: &str) -> Option<f64> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).and_then(|cell| cell.get().copied())
    }

    /// Number of keys with a computed score.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|cell| cell.initialized()).count()
    }

    /// Whether no score has been computed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return (hits, misses) counters.
    pub fn counters(&self) -> (u32, u32) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_computes_once_per_key() {
        let cache = ValueCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let r = cache
                .get_or_compute("prompt-a", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(7.0)
                })
                .await
                .unwrap();
            assert_eq!(r.score, 7.0);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.counters(), (2, 1));
        assert_eq!(cache.peek("prompt-a"), Some(7.0));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_compute_separately() {
        let cache = ValueCache::new();
        let a = cache
            .get_or_compute("a", || async { Ok::<_, anyhow::Error>(1.0) })
            .await
            .unwrap();
        let b = cache
            .get_or_compute("b", || async { Ok::<_, anyhow::Error>(2.0) })
            .await
            .unwrap();
        assert!(!a.hit && !b.hit);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_leaves_key_empty() {
        let cache = ValueCache::new();
        let err = cache
            .get_or_compute("k", || async { Err::<f64, _>(anyhow::anyhow!("boom")) })
            .await;
        assert!(err.is_err());
        assert!(cache.peek("k").is_none());
        assert!(cache.is_empty());

        let ok = cache
            .get_or_compute("k", || async { Ok::<_, anyhow::Error>(3.0) })
            .await
            .unwrap();
        assert_eq!(ok.score, 3.0);
        assert!(!ok.hit);
    }

    #[tokio::test]
    async fn test_concurrent_requesters_collapse_to_one_call() {
        let cache = Arc::new(ValueCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("shared", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, anyhow::Error>(5.0)
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut hits = 0;
        for h in handles {
            let r = h.await.unwrap();
            assert_eq!(r.score, 5.0);
            if r.hit {
                hits += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hits, 7);
    }
}
