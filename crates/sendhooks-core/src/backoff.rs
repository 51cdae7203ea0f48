//! Exponential backoff between delivery attempts.
//!
//! Deterministic doubling with a ceiling and no jitter:
//!
//! | Attempt failed | Delay before next |
//! |----------------|-------------------|
//! | 1              | 1s                |
//! | 2              | 2s                |
//! | 3              | 4s                |
//! | 4              | 8s                |
//! | ...            | capped at 1h      |

use std::time::Duration;

/// Delay before the second attempt.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for any single delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Doubling backoff with a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: INITIAL_BACKOFF,
            max: MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    /// `min(current * 2, max)`. Idempotent once the cap is reached.
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// [`BackoffPolicy::next`] with the default 1 hour ceiling.
pub fn next_backoff(current: Duration) -> Duration {
    BackoffPolicy::default().next(current)
}
