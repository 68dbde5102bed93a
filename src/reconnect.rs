//! Bounded exponential backoff with event reporting (C5).
//!
//! Grounded in the teacher's `base_system/cooldown_retry.rs`, which doubles
//! a capped delay on a retryable failure; generalized here into a policy
//! the Orchestrator can drive with any async operation and observe through
//! events, and made cancellable for consumer-initiated teardown.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{Result, SynthesisError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2,
        }
    }
}

/// One transition of the reconnect policy, surfaced for logging/observability.
#[derive(Debug, Clone)]
pub enum ReconnectEvent {
    Attempt { attempt: u32, delay: Duration },
    Success,
    Failure,
    Abort { reason: String },
}

/// Repeatedly invoke `operation` until it succeeds, a non-transient error
/// is returned, the retry budget is exhausted, or `cancel` is notified.
pub async fn execute<F, Fut, T>(
    config: &ReconnectConfig,
    cancel: &Notify,
    mut on_event: impl FnMut(ReconnectEvent),
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(value) => {
                on_event(ReconnectEvent::Success);
                return Ok(value);
            }
            Err(err) if !err.is_transient() => {
                on_event(ReconnectEvent::Abort { reason: err.to_string() });
                return Err(err);
            }
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_retries {
                    on_event(ReconnectEvent::Failure);
                    return Err(err);
                }

                on_event(ReconnectEvent::Attempt { attempt, delay });
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.notified() => {
                        on_event(ReconnectEvent::Abort { reason: "cancelled".to_string() });
                        return Err(SynthesisError::Cancelled);
                    }
                }
                delay = std::cmp::min(delay * config.backoff_factor, config.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> ReconnectConfig {
        ReconnectConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            backoff_factor: 2,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let cancel = Notify::new();
        let result: Result<u32> =
            execute(&fast_config(), &cancel, |_| {}, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_attempt_count() {
        let cancel = Notify::new();
        let calls = Arc::new(AtomicU32::new(0));
        let attempts = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let attempts2 = attempts.clone();

        let result: Result<()> = execute(
            &fast_config(),
            &cancel,
            move |event| {
                if matches!(event, ReconnectEvent::Attempt { .. }) {
                    attempts2.fetch_add(1, Ordering::SeqCst);
                }
            },
            move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                async { Err(SynthesisError::OpenTimeout(Duration::from_millis(1))) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // == max_retries
        assert_eq!(attempts.load(Ordering::SeqCst), 2); // retries before giving up
    }

    #[tokio::test]
    async fn non_transient_errors_abort_immediately() {
        let cancel = Notify::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<()> = execute(
            &fast_config(),
            &cancel,
            |_| {},
            move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                async { Err(SynthesisError::Drm { server_date: None }) }
            },
        )
        .await;

        assert!(matches!(result, Err(SynthesisError::Drm { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_during_delay() {
        let cancel = Notify::new();
        let config = ReconnectConfig {
            max_retries: 100,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
            backoff_factor: 1,
        };
        cancel.notify_one();
        let result: Result<()> =
            execute(&config, &cancel, |_| {}, || async {
                Err(SynthesisError::OpenTimeout(Duration::from_millis(1)))
            })
            .await;
        assert!(matches!(result, Err(SynthesisError::Cancelled)));
    }
}
