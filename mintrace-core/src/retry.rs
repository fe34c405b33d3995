use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How the wait between attempts grows
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay every time
    Fixed(Duration),
    /// `initial * (attempt + 1)`
    Linear { initial: Duration },
    /// `initial * 2^attempt`, capped at `max`, scaled by up to ±`jitter`
    Exponential {
        initial: Duration,
        max: Duration,
        jitter: f64,
    },
}

impl Backoff {
    /// Delay to wait after the given zero-based failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { initial } => initial.saturating_mul(attempt.saturating_add(1)),
            Backoff::Exponential { initial, max, jitter } => {
                let factor = 2u32.saturating_pow(attempt.min(16));
                let base = std::cmp::min(initial.saturating_mul(factor), max);
                apply_jitter(base, jitter).min(max)
            }
        }
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let jitter = jitter.min(1.0);
    let scale = 1.0 - jitter + fastrand::f64() * 2.0 * jitter;
    delay.mul_f64(scale)
}

/// Bounded retry strategy for one-shot operations such as RPC fetches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    /// Linearly growing delays: `initial`, `2 * initial`, ...
    pub fn linear(max_attempts: u32, initial: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Linear { initial },
        }
    }
}

impl Default for RetryPolicy {
    /// Five attempts starting at 100ms, growing linearly
    fn default() -> Self {
        Self::linear(5, Duration::from_millis(100))
    }
}

/// Retry an operation that may legitimately come back empty.
///
/// `Ok(None)` and `Err` both count as a miss. The outcome of the final attempt
/// is returned as-is.
pub async fn retry_until_some<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<Option<T>, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let outcome = operation().await;
        if matches!(outcome, Ok(Some(_))) || attempt + 1 >= max_attempts {
            return outcome;
        }

        let delay = policy.backoff.delay(attempt);
        match &outcome {
            Err(e) => warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}...",
                attempt + 1,
                max_attempts,
                e,
                delay
            ),
            _ => debug!(
                "Attempt {}/{} returned nothing. Retrying in {:?}...",
                attempt + 1,
                max_attempts,
                delay
            ),
        }
        sleep(delay).await;
        attempt += 1;
    }
}

/// Reconnect strategy for long-lived streams
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub backoff: Backoff,
    /// Consecutive failed connections tolerated, `None` for unlimited
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Constant delay, never gives up
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(delay),
            max_attempts: None,
        }
    }

    pub fn exponential(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            backoff: Backoff::Exponential { initial, max, jitter },
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before reconnect number `attempt` (zero-based), or `None` when exhausted
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.backoff.delay(attempt)),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(5), Duration::from_secs(60), 0.2)
    }
}
