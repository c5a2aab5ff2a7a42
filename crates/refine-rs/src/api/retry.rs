//! Bounded retry with exponential backoff and jitter.
//!
//! The completion client never retries on its own. The pipeline wraps each
//! stage call in [`retry_completion`], which retries only failures that
//! [`CompletionError::is_transient`] accepts. The default config performs no
//! retries at all.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::CompletionError;

/// Per-stage retry policy for the refine pipeline.
///
/// Off unless `max_retries > 0`. When on, only errors that
/// [`CompletionError::is_transient`] accepts are retried; an auth failure or
/// a malformed response fails the stage on the first attempt regardless.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts per stage after the first. Default 0.
    pub max_retries: u32,
    /// Sleep before the first retry of a stage. Default 500 ms.
    pub initial_delay: Duration,
    /// Ceiling on any single sleep. Default 8 s.
    pub max_delay: Duration,
    /// Growth factor between consecutive sleeps. Default 2.
    pub multiplier: f64,
    /// Shorten each sleep by a fixed per-attempt factor.
    pub jitter: bool,
}

/// Scale factors applied in turn when `jitter` is on.
const JITTER_FACTORS: [f64; 4] = [0.75, 0.90, 0.60, 0.85];

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff, retrying each stage up to `retries` times.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Sleep before retry number `attempt` of a stage (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let grown = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = grown.min(self.max_delay.as_secs_f64());
        let factor = if self.jitter {
            JITTER_FACTORS[attempt as usize % JITTER_FACTORS.len()]
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
///
/// `on_retry(attempt, delay, error)` fires before each backoff sleep, with
/// `attempt` counting from 1.
pub async fn retry_completion<T, F, Fut>(
    config: &RetryConfig,
    mut call: F,
    mut on_retry: impl FnMut(u32, Duration, &CompletionError),
) -> Result<T, CompletionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CompletionError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < config.max_retries && e.is_transient() => {
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    "Transient completion error (attempt {attempt}/{}): {e}. Retrying in {delay:?}...",
                    config.max_retries,
                );
                on_retry(attempt, delay, &e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
