//! Bounded retry for calls to external collaborators
//!
//! Rate-limited responses wait a fixed cooldown; other transient failures back off linearly.
//! Fatal errors are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::{Disposition, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Total number of attempts, including the first
  pub max_attempts: u32,
  /// Linear backoff step; attempt `n` waits `backoff * n`
  pub backoff: Duration,
  /// Fixed wait after a rate-limit response
  pub rate_limit_cooldown: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: Duration::from_millis(500),
      rate_limit_cooldown: Duration::from_secs(5),
    }
  }
}

impl RetryPolicy {
  pub fn from_config(network: &NetworkConfig) -> Self {
    Self {
      max_attempts: network.max_attempts,
      backoff: Duration::from_millis(network.backoff_ms),
      rate_limit_cooldown: Duration::from_millis(network.rate_limit_cooldown_ms),
    }
  }

  /// A policy that never sleeps, for tests and one-shot tools
  pub fn immediate(max_attempts: u32) -> Self {
    Self { max_attempts, backoff: Duration::ZERO, rate_limit_cooldown: Duration::ZERO }
  }

  /// Delay before the attempt that follows failed attempt number `attempt` (1-based)
  pub fn calculate_delay(&self, attempt: u32, disposition: Disposition) -> Duration {
    match disposition {
      Disposition::RateLimited => self.rate_limit_cooldown,
      _ => self.backoff * attempt,
    }
  }

  /// Run `operation` until it succeeds, fails fatally, or runs out of attempts
  pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let max_attempts = self.max_attempts.max(1);
    let mut attempt = 1;

    loop {
      match operation().await {
        Ok(value) => return Ok(value),
        Err(err) => {
          let disposition = err.disposition();
          if !disposition.is_retryable() || attempt >= max_attempts {
            tracing::debug!(what, attempt, error = %err, "giving up");
            return Err(err);
          }

          let delay = self.calculate_delay(attempt, disposition);
          tracing::warn!(
            what,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after failure"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }
}
