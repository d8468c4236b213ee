//! Bounded timeout + retry guard around collaborator calls.
//!
//! Every pluggable backend call in a session goes through [`call_with_retry`].
//! A timeout is treated exactly like a malformed response: the attempt is
//! logged and retried, and after the last attempt the caller receives
//! [`CollabError::RetriesExhausted`] and switches to its deterministic
//! fallback. Cancellation short-circuits immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::error::{CollabError, CollabResult};

/// Per-attempt bound used when a policy leaves `timeout_ms` at zero.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Per-call timeout and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallPolicy {
    /// Timeout per attempt in milliseconds. `0` falls back to
    /// [`DEFAULT_TIMEOUT_MS`]; a call is never unbounded.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: 2,
        }
    }
}

impl CallPolicy {
    /// Total attempts (first try plus retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Effective per-attempt timeout in milliseconds.
    pub fn effective_timeout_ms(&self) -> u64 {
        if self.timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            self.timeout_ms
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.effective_timeout_ms())
    }
}

/// Metadata handed to each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 0-based attempt index.
    pub index: u32,
    /// Set on retries: the backend should be given a stricter instruction.
    pub strict: bool,
}

/// Run `op` under `policy`, retrying on error or timeout.
///
/// `op` receives the [`Attempt`] so the request can be tightened on retries.
/// Output validation belongs inside `op`: returning `Err` for a malformed
/// response consumes an attempt just like a transport failure.
pub async fn call_with_retry<T, F, Fut>(
    call: &'static str,
    policy: &CallPolicy,
    cancel: &CancelSignal,
    mut op: F,
) -> CollabResult<T>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut last_error: Option<CollabError> = None;

    for index in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(CollabError::Cancelled { call });
        }

        let attempt = Attempt {
            index,
            strict: index > 0,
        };
        let fut = op(attempt);
        let guarded = async {
            tokio::time::timeout(policy.timeout(), fut)
                .await
                .map_err(|_| CollabError::Timeout {
                    call,
                    timeout_ms: policy.effective_timeout_ms(),
                })
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CollabError::Cancelled { call }),
            outcome = guarded => outcome,
        };

        let error = match outcome {
            Ok(Ok(value)) => {
                if index > 0 {
                    debug!(call, attempt = index + 1, "collaborator call succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(source)) => CollabError::Failed {
                call,
                message: format!("{source:#}"),
            },
            Err(timeout) => timeout,
        };

        warn!(
            call,
            attempt = index + 1,
            max_attempts,
            error = %error,
            "collaborator call failed"
        );
        last_error = Some(error);
    }

    Err(CollabError::RetriesExhausted {
        call,
        attempts: max_attempts,
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_first_success_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let value = call_with_retry("test", &CallPolicy::default(), &CancelSignal::never(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(7) }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_timeout_uses_default_bound() {
        let policy = CallPolicy {
            timeout_ms: 0,
            max_retries: 0,
        };
        assert_eq!(policy.effective_timeout_ms(), DEFAULT_TIMEOUT_MS);
        assert_eq!(policy.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[tokio::test]
    async fn test_retries_are_marked_strict() {
        let policy = CallPolicy {
            timeout_ms: 0,
            max_retries: 2,
        };
        let value = call_with_retry("test", &policy, &CancelSignal::never(), |attempt| async move {
            if attempt.strict {
                Ok(attempt.index)
            } else {
                anyhow::bail!("malformed")
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempt_count() {
        let policy = CallPolicy {
            timeout_ms: 0,
            max_retries: 1,
        };
        let err = call_with_retry("judge", &policy, &CancelSignal::never(), |_| async {
            Err::<(), _>(anyhow::anyhow!("bad schema"))
        })
        .await
        .unwrap_err();
        match err {
            CollabError::RetriesExhausted {
                call,
                attempts,
                last_error,
            } => {
                assert_eq!(call, "judge");
                assert_eq!(attempts, 2);
                assert!(last_error.contains("bad schema"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
