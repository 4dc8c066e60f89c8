use crate::domain::ports::ConfigProvider;
use crate::utils::error::{Result, TriageError};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 每次呼叫的硬性逾時
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn from_config<C: ConfigProvider + ?Sized>(config: &C) -> Self {
        Self {
            max_retries: config.retry_attempts(),
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
            attempt_timeout: config.call_timeout(),
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u32 << exponent;
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }

    /// 單一階段最壞情況的耗時：每次嘗試都逾時，加上所有退避等待
    pub fn budget(&self) -> Duration {
        let attempts = self.attempt_timeout.saturating_mul(self.max_retries + 1);
        (0..self.max_retries).fold(attempts, |total, attempt| total.saturating_add(self.backoff(attempt)))
    }

    /// 一個請求最多經過分類與回答兩個階段，兩者都必須能用完重試
    pub fn check_request_timeout(&self, field: &str, request_timeout: Duration) -> Result<()> {
        let required = self.budget().saturating_mul(2);
        if request_timeout < required {
            return Err(TriageError::ConfigValidationError {
                field: field.to_string(),
                message: format!(
                    "must be at least {:?} (two stages of {} attempt(s) x {:?} plus backoff)",
                    required,
                    self.max_retries + 1,
                    self.attempt_timeout
                ),
            });
        }
        Ok(())
    }

    /// 依策略執行上游呼叫；用盡重試或遇到不可重試錯誤時回傳 UpstreamUnavailable
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let total_attempts = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            let outcome = match tokio::time::timeout(self.attempt_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(TriageError::Timeout {
                    millis: self.attempt_timeout.as_millis() as u64,
                }),
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("🔁 {} succeeded on attempt {}", operation, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            attempt += 1;
            if !error.is_retryable() || attempt >= total_attempts {
                tracing::error!(
                    "❌ {} failed after {} attempt(s): {}",
                    operation,
                    attempt,
                    error
                );
                return Err(TriageError::UpstreamUnavailable {
                    attempts: attempt,
                    message: error.to_string(),
                });
            }

            let delay = self.backoff(attempt - 1);
            tracing::warn!(
                "⚠️ {} attempt {}/{} failed: {} (retrying in {:?})",
                operation,
                attempt,
                total_attempts,
                error,
                delay
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(10), Duration::from_secs(2));
    }

    #[test]
    fn test_default_budget_fits_default_request_timeout() {
        let policy = RetryPolicy::default();
        // 3 attempts x 3s plus 250ms + 500ms of backoff
        assert_eq!(policy.budget(), Duration::from_millis(9_750));
        assert!(policy
            .check_request_timeout("request_timeout", crate::core::orchestrator::DEFAULT_REQUEST_TIMEOUT)
            .is_ok());
    }

    #[test]
    fn test_request_timeout_must_cover_both_stages() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(10),
        };

        assert_eq!(policy.budget(), Duration::from_millis(30_750));
        assert!(matches!(
            policy.check_request_timeout("request_timeout", Duration::from_secs(30)),
            Err(TriageError::ConfigValidationError { .. })
        ));
        assert!(policy
            .check_request_timeout("request_timeout", Duration::from_millis(61_500))
            .is_ok());
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(2)
            .run("test call", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TriageError::UpstreamStatus {
                            status: 503,
                            body: "busy".to_string(),
                        })
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(tokio_test::assert_ok!(result), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_becomes_upstream_unavailable() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(2)
            .run("test call", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TriageError::UpstreamStatus {
                        status: 500,
                        body: String::new(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(TriageError::UpstreamUnavailable { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(2)
            .run("test call", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TriageError::UpstreamStatus {
                        status: 401,
                        body: "bad key".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(TriageError::UpstreamUnavailable { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_hits_hard_timeout() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(1)
            .run("slow call", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(TriageError::UpstreamUnavailable { attempts: 2, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
