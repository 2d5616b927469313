//! Bounded exponential backoff for transient failures

use std::future::Future;
use std::time::Duration;

use super::error::RepositoryOperation;
use super::traits::RepositoryResult;
use crate::config::DataSourceConfig;

/// Retry policy for idempotent operations
///
/// Only retriable errors (timeouts and connection failures) are retried.
/// The delay before retry `n` is `base_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Policy for backend calls from data source settings
    pub fn from_config(config: &DataSourceConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// Policy for establishing connections from data source settings
    pub fn for_connect(config: &DataSourceConfig) -> Self {
        Self::new(
            config.connect_max_retries,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// Maximum number of retries after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay_multiplier = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(delay_multiplier)
    }

    /// Run `attempt` until it succeeds, fails permanently or retries run out
    pub async fn run<T, F, Fut>(
        &self,
        operation: RepositoryOperation,
        mut attempt: F,
    ) -> RepositoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let mut retry = 0;

        loop {
            match attempt().await {
                Ok(value) => {
                    if retry > 0 {
                        tracing::info!(%operation, "Succeeded after {} attempt(s)", retry + 1);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retriable() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        %operation,
                        "Attempt {} failed: {}. Retrying in {:?}...",
                        retry,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retriable() {
                        tracing::error!(
                            %operation,
                            "Giving up after {} attempts: {}",
                            retry + 1,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DataSourceConfig::default())
    }
}
