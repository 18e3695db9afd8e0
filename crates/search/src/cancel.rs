use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::SearchError;

/// Cooperative cancellation signal shared between a caller and a running engine.
///
/// Engines poll [`check`](Self::check) between steps and before each oracle
/// dispatch. Cloning shares the flag; the deadline is fixed at construction.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    started: Instant,
    deadline: Option<Instant>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token with no deadline.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: None,
        }
    }

    /// A token that reports a timeout once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            started,
            deadline: Some(started + timeout),
        }
    }

    /// Request cancellation. Visible to every clone.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Time since the token was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `Err(Cancelled)` or `Err(TimedOut)` if the run must stop now.
    ///
    /// An explicit cancel wins over an expired deadline.
    pub fn check(&self) -> Result<(), SearchError> {
        if self.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SearchError::TimedOut {
                    elapsed_ms: self.elapsed().as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}
