//! Retry with exponential backoff and additive jitter.

use crate::models::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// An attempt's failure, classified as retryable or not by the caller.
pub trait RetryableError {
    fn is_retryable(&self, retryable_status_codes: &[u16]) -> bool;
}

/// Runs `attempt` up to `config.max_retries + 1` times. `on_retry(attempt_index, delay)`
/// is invoked before each sleep. If `config.enabled` is false, `attempt` runs
/// exactly once with no classification or retry.
pub async fn with_retry<T, E, F, Fut, R>(
    config: &RetryConfig,
    mut attempt: F,
    mut on_retry: R,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
    R: FnMut(u32, Duration),
{
    if !config.enabled {
        return attempt(0).await;
    }

    let mut last_err = None;
    for k in 0..=config.max_retries {
        match attempt(k).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = err.is_retryable(&config.retryable_status_codes);
                last_err = Some(err);
                if !retryable || k == config.max_retries {
                    break;
                }
                let delay = backoff_delay(config, k);
                on_retry(k, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}

fn backoff_delay(config: &RetryConfig, attempt_index: u32) -> Duration {
    let base = config.base_delay_ms.saturating_mul(1u64 << attempt_index.min(62));
    let capped = base.min(config.max_delay_ms);
    let jitter_ceiling = (capped as f64 * 0.25) as u64;
    let jitter = if jitter_ceiling == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ceiling)
    };
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        status_code: Option<u16>,
        transient: bool,
    }

    impl RetryableError for TestError {
        fn is_retryable(&self, retryable_status_codes: &[u16]) -> bool {
            self.transient
                || self
                    .status_code
                    .map(|code| retryable_status_codes.contains(&code))
                    .unwrap_or(false)
        }
    }

    fn config() -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            retryable_status_codes: vec![500, 502, 503, 504],
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, TestError> = with_retry(
            &config(),
            |_k| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
            |_, _| {},
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, TestError> = with_retry(
            &config(),
            |_k| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TestError {
                        status_code: None,
                        transient: true,
                    })
                }
            },
            |_, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4); // max_retries + 1
    }

    #[tokio::test]
    async fn non_retryable_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, TestError> = with_retry(
            &config(),
            |_k| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TestError {
                        status_code: Some(400),
                        transient: false,
                    })
                }
            },
            |_, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_runs_exactly_once_even_on_failure() {
        let mut cfg = config();
        cfg.enabled = false;
        let calls = AtomicU32::new(0);
        let result: Result<i32, TestError> = with_retry(
            &cfg,
            |_k| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TestError {
                        status_code: None,
                        transient: true,
                    })
                }
            },
            |_, _| {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_delay_caps_at_max_delay_plus_jitter() {
        let cfg = config();
        for attempt in 0..6 {
            let delay = backoff_delay(&cfg, attempt);
            assert!(delay.as_millis() <= cfg.max_delay_ms as u128 + cfg.max_delay_ms as u128 / 4);
        }
    }
}
