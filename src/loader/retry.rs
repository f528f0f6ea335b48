//! Timeouts, retries with exponential backoff, and bounded parallel requests.
//!
//! Hosted REST backends fail transiently (schema cache reloads, dropped
//! connections). `with_retry` retries only failures whose message looks
//! transient and gives up immediately on everything else.

use color_eyre::{eyre::eyre, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default number of requests `parallel` keeps in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Substrings (matched case-insensitively) that mark a failure as transient.
const RETRYABLE_MARKERS: &[&str] = &[
  "PGRST204", // schema cache
  "PGRST205", // schema cache
  "network",
  "timeout",
  "connection",
  "ECONNRESET",
  "ETIMEDOUT",
  "Failed to fetch",
  "NetworkError",
  "Network request failed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt
  pub max_retries: u32,
  pub initial_delay: Duration,
  pub max_delay: Duration,
  /// Limit for a single attempt
  pub timeout: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(10),
      timeout: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  /// Backoff before retry number `attempt + 1`: doubles from `initial_delay`, capped at `max_delay`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    self.initial_delay.saturating_mul(factor).min(self.max_delay)
  }
}

/// Retry settings as written in the config file (milliseconds).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub initial_delay_ms: u64,
  pub max_delay_ms: u64,
  pub timeout_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    let policy = RetryPolicy::default();
    Self {
      max_retries: policy.max_retries,
      initial_delay_ms: policy.initial_delay.as_millis() as u64,
      max_delay_ms: policy.max_delay.as_millis() as u64,
      timeout_ms: policy.timeout.as_millis() as u64,
    }
  }
}

impl From<RetryConfig> for RetryPolicy {
  fn from(config: RetryConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      initial_delay: Duration::from_millis(config.initial_delay_ms),
      max_delay: Duration::from_millis(config.max_delay_ms),
      timeout: Duration::from_millis(config.timeout_ms),
    }
  }
}

/// Whether a failure message looks transient.
pub fn is_retryable(message: &str) -> bool {
  let message = message.to_lowercase();
  RETRYABLE_MARKERS
    .iter()
    .any(|marker| message.contains(&marker.to_lowercase()))
}

/// Run `op` with a per-attempt timeout, retrying transient failures.
///
/// Returns the first success, the first non-transient error, or the last error
/// once `max_retries` retries are used up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let mut attempt = 0;
  loop {
    let outcome = match tokio::time::timeout(policy.timeout, op()).await {
      Ok(result) => result,
      Err(_) => Err(eyre!(
        "Request timeout after {}ms",
        policy.timeout.as_millis()
      )),
    };

    let error = match outcome {
      Ok(value) => return Ok(value),
      Err(e) => e,
    };

    let message = format!("{:#}", error);
    if attempt >= policy.max_retries || !is_retryable(&message) {
      return Err(error);
    }

    let delay = policy.delay_for(attempt);
    warn!(
      attempt = attempt + 1,
      attempts = policy.max_retries + 1,
      delay_ms = delay.as_millis() as u64,
      error = %message,
      "request failed, retrying"
    );
    tokio::time::sleep(delay).await;
    attempt += 1;
  }
}

/// Run every operation with retries, keeping at most `max_concurrency` in flight.
///
/// Results come back in input order. The first operation that still fails after
/// its retries fails the whole batch.
pub async fn parallel<T, F, Fut>(
  policy: &RetryPolicy,
  ops: Vec<F>,
  max_concurrency: usize,
) -> Result<Vec<T>>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  stream::iter(ops.into_iter().map(|op| with_retry(policy, op)))
    .buffered(max_concurrency.max(1))
    .try_collect()
    .await
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn fast_policy() -> RetryPolicy {
    RetryPolicy {
      max_retries: 3,
      initial_delay: Duration::from_millis(100),
      max_delay: Duration::from_millis(250),
      timeout: Duration::from_secs(1),
    }
  }

  #[test]
  fn test_delay_doubles_and_caps() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    assert_eq!(policy.delay_for(1), Duration::from_secs(2));
    assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    assert_eq!(policy.delay_for(4), Duration::from_secs(10));
    assert_eq!(policy.delay_for(40), Duration::from_secs(10));
  }

  #[test]
  fn test_retryable_classification() {
    assert!(is_retryable("PGRST204: Could not find the column in the schema cache"));
    assert!(is_retryable("Network error requesting http://localhost/"));
    assert!(is_retryable("read ECONNRESET"));
    assert!(is_retryable("Request timeout after 30000ms"));
    assert!(is_retryable("TypeError: failed to fetch"));
    assert!(!is_retryable("duplicate key value violates unique constraint"));
    assert!(!is_retryable("JWT expired"));
  }

  #[test]
  fn test_retry_config_converts_to_policy() {
    let config: RetryConfig = serde_yaml::from_str("maxRetries: 1\ntimeoutMs: 500\n").unwrap();
    let policy = RetryPolicy::from(config);

    assert_eq!(policy.max_retries, 1);
    assert_eq!(policy.timeout, Duration::from_millis(500));
    assert_eq!(policy.initial_delay, Duration::from_secs(1));
    assert_eq!(policy.max_delay, Duration::from_secs(10));
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_failures_are_retried() {
    let attempts = AtomicU32::new(0);

    let result = with_retry(&fast_policy(), || {
      let n = attempts.fetch_add(1, Ordering::SeqCst);
      async move {
        if n < 2 {
          Err(eyre!("connection reset by peer"))
        } else {
          Ok(n)
        }
      }
    })
    .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_permanent_failure_is_not_retried() {
    let attempts = AtomicU32::new(0);

    let result: Result<()> = with_retry(&fast_policy(), || {
      attempts.fetch_add(1, Ordering::SeqCst);
      async { Err(eyre!("row level security policy violation")) }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_gives_up_after_max_retries() {
    let attempts = AtomicU32::new(0);

    let result: Result<()> = with_retry(&fast_policy(), || {
      attempts.fetch_add(1, Ordering::SeqCst);
      async { Err(eyre!("network unreachable")) }
    })
    .await;

    assert_eq!(
      result.unwrap_err().to_string(),
      "network unreachable".to_string()
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn test_hung_attempt_times_out_and_retries() {
    let attempts = AtomicU32::new(0);

    let result = with_retry(&fast_policy(), || {
      let n = attempts.fetch_add(1, Ordering::SeqCst);
      async move {
        if n == 0 {
          futures::future::pending::<()>().await;
        }
        Ok("answered")
      }
    })
    .await;

    assert_eq!(result.unwrap(), "answered");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_parallel_keeps_order_and_bounds_concurrency() {
    let in_flight = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let ops: Vec<_> = (0..6u64)
      .map(|i| {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        move || {
          let in_flight = Arc::clone(&in_flight);
          let peak = Arc::clone(&peak);
          async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(60 - i * 10)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(i)
          }
        }
      })
      .collect();

    let results = parallel(&fast_policy(), ops, 2).await.unwrap();

    assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
    assert!(peak.load(Ordering::SeqCst) <= 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_parallel_fails_on_first_permanent_error() {
    let ops: Vec<Box<dyn FnMut() -> futures::future::Ready<Result<u32>>>> = vec![
      Box::new(|| futures::future::ready(Ok(1))),
      Box::new(|| futures::future::ready(Err(eyre!("permission denied")))),
      Box::new(|| futures::future::ready(Ok(3))),
    ];

    let result = parallel(&fast_policy(), ops, DEFAULT_MAX_CONCURRENCY).await;

    assert!(result.is_err());
  }
}
