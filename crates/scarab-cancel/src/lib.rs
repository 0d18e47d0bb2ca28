// Author: Lukas Bower
// Purpose: Provide a cooperative cancellation token shared by the link, telemetry, and upload workers.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! A cooperative cancellation flag, cloneable and shareable across the
//! sampler/framer, link, and upload worker threads.
//!
//! Nothing here blocks indefinitely: every wait helper takes a ceiling and
//! polls in small increments so cancellation is observed within that
//! increment, matching the ≤ 100 ms cancellation-latency requirement at
//! every suspension point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Poll granularity used by [`CancelToken::sleep`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A shared, cloneable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early (and returning `true`) if cancelled.
    ///
    /// Sleeps in [`POLL_INTERVAL`] increments so a cancel fired mid-wait is
    /// observed within one increment rather than at the end of the full
    /// duration.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            if self.is_cancelled() {
                return true;
            }
            let step = remaining.min(POLL_INTERVAL);
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn sleep_returns_early_once_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let start = std::time::Instant::now();
        let cancelled = token.sleep(Duration::from_secs(5));
        assert!(cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
