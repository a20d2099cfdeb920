//! Fixed-cap retry for a single mirror operation.
//!
//! One folder listing or one file capture is retried immediately, without
//! backoff or jitter, until it succeeds or the attempt cap is reached. The
//! last failure is returned unchanged. Every error is retried alike; the
//! transient/structural classification is left to the caller's logs.
//!
//! # Example
//!
//! ```
//! use share_mirror_core::mirror::{RetryPolicy, with_retry};
//! use share_mirror_core::MirrorError;
//!
//! # async fn example() -> Result<(), MirrorError> {
//! let policy = RetryPolicy::default();
//! let value = with_retry(&policy, || async { Ok::<_, MirrorError>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, warn};

/// Default maximum attempts per operation (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Decision after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again right away.
    Retry {
        /// The attempt about to start (1-indexed).
        next_attempt: u32,
    },
    /// Stop and propagate the failure.
    GiveUp,
}

/// How many times a single operation may be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt cap (at least one attempt).
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the attempt cap.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what happens after `attempt` (1-indexed) failed.
    #[must_use]
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry {
                next_attempt: attempt + 1,
            }
        }
    }
}

/// Runs `operation` until it succeeds or the policy gives up.
///
/// # Errors
///
/// Returns the error of the final attempt, unchanged.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max = policy.max_attempts();
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.decide(attempt) {
                RetryDecision::GiveUp => {
                    debug!(attempt, max, error = %error, "giving up");
                    return Err(error);
                }
                RetryDecision::Retry { next_attempt } => {
                    warn!(error = %error, "retry {attempt} / {max}");
                    attempt = next_attempt;
                }
            },
        }
    }
}
