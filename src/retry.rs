//! Retry orchestration for remote calls.
//!
//! Wraps a single attempt with bounded linear backoff. Errors are classified
//! as transient (worth retrying) or terminal (propagated immediately). The
//! orchestrator never touches the cache; that is the accessor's job.

use color_eyre::Report;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::remote::RemoteError;

/// Attempt budget and backoff base.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(1500),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// Expected to succeed on retry: timeouts, connectivity, no-rows sentinel.
  Transient,
  /// Permission, policy and validation errors. Retrying won't help.
  Terminal,
}

/// Words in an error chain that mark a failure as transient.
const TRANSIENT_VOCABULARY: &[&str] = &[
  "timeout",
  "timed out",
  "canceled",
  "cancelled",
  "connection reset",
  "connection refused",
  "temporarily unavailable",
  "pgrst116",
];

/// Classify an error for retry purposes.
///
/// Structured [`RemoteError`]s are classified directly; anything else falls
/// back to matching the message chain against the transient vocabulary.
pub fn classify(err: &Report) -> ErrorClass {
  if let Some(remote) = err.downcast_ref::<RemoteError>() {
    return if remote.is_transient() {
      ErrorClass::Transient
    } else {
      ErrorClass::Terminal
    };
  }

  let message = format!("{:#}", err).to_lowercase();
  if TRANSIENT_VOCABULARY.iter().any(|word| message.contains(word)) {
    ErrorClass::Transient
  } else {
    ErrorClass::Terminal
  }
}

/// Run `op` up to `policy.max_attempts` times.
///
/// Transient failures sleep `base_delay * attempt_number` before the next
/// attempt (linear, not exponential: 1500ms then 3000ms under the default
/// policy). Terminal failures and exhausted budgets propagate the last error.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, Report>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, Report>>,
{
  let mut attempt = 1u32;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(err) => {
        if classify(&err) == ErrorClass::Terminal {
          return Err(err);
        }
        if attempt >= policy.max_attempts {
          debug!(attempt, "retry budget exhausted");
          return Err(err);
        }
        let delay = policy.base_delay * attempt;
        debug!(attempt, ?delay, %err, "transient failure, backing off");
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn policy(base_ms: u64) -> RetryPolicy {
    RetryPolicy {
      max_attempts: 3,
      base_delay: Duration::from_millis(base_ms),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_failures_then_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    let started = tokio::time::Instant::now();

    let result = with_retry(policy(100), move || {
      let calls = calls_clone.clone();
      async move {
        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
          Err(Report::from(RemoteError::Timeout))
        } else {
          Ok(42)
        }
      }
    })
    .await
    .unwrap();

    assert_eq!(result, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 100ms before the 2nd attempt, 200ms before the 3rd.
    assert_eq!(started.elapsed(), Duration::from_millis(300));
  }

  #[tokio::test]
  async fn test_terminal_propagates_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result: Result<i32, _> = with_retry(policy(1), move || {
      let calls = calls_clone.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(Report::from(RemoteError::Denied("row policy".to_string())))
      }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_budget_exhaustion_returns_last_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result: Result<i32, _> = with_retry(policy(10), move || {
      let calls = calls_clone.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(Report::from(RemoteError::Offline))
      }
    })
    .await;

    let err = result.unwrap_err();
    assert!(err.downcast_ref::<RemoteError>().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn test_classify_structured_errors() {
    assert_eq!(
      classify(&Report::from(RemoteError::Timeout)),
      ErrorClass::Transient
    );
    assert_eq!(
      classify(&Report::from(RemoteError::NoRows)),
      ErrorClass::Transient
    );
    assert_eq!(
      classify(&Report::from(RemoteError::Offline)),
      ErrorClass::Transient
    );
    assert_eq!(
      classify(&Report::from(RemoteError::Denied("nope".to_string()))),
      ErrorClass::Terminal
    );
  }

  #[test]
  fn test_classify_by_message_vocabulary() {
    assert_eq!(
      classify(&eyre!("operation timed out after 30s")),
      ErrorClass::Transient
    );
    assert_eq!(classify(&eyre!("code PGRST116")), ErrorClass::Transient);
    assert_eq!(
      classify(&eyre!("violates row-level security policy")),
      ErrorClass::Terminal
    );
  }
}
