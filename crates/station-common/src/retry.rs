//! Retry mechanisms with exponential backoff and jitter, used by the device
//! session's network I/O and by the healing orchestrator's action handlers.

use crate::error::CoreError;
use crate::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
    pub max_jitter: f64,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
            max_jitter: 0.1,
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RetryStrategy {
    NoRetry,
    FixedDelay(Duration),
    ExponentialBackoff { config: RetryConfig },
    Custom { delays: Vec<Duration> },
}

impl RetryStrategy {
    pub fn exponential_backoff() -> Self {
        Self::ExponentialBackoff {
            config: RetryConfig::default(),
        }
    }

    pub fn exponential_backoff_with_config(config: RetryConfig) -> Self {
        Self::ExponentialBackoff { config }
    }

    pub fn fixed_delay(delay: Duration) -> Self {
        Self::FixedDelay(delay)
    }

    pub fn custom_delays(delays: Vec<Duration>) -> Self {
        Self::Custom { delays }
    }

    /// Strategy appropriate for a sample of the error class being retried.
    /// Only `Timeout` is retryable per the error taxonomy (§7); everything
    /// else picks `NoRetry` so callers don't accidentally retry a
    /// `PolicyDenied` or `Validation` outcome.
    pub fn for_error(error: &CoreError) -> Self {
        match error {
            CoreError::Timeout(_) => Self::ExponentialBackoff {
                config: RetryConfig {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1000),
                    max_delay: Duration::from_secs(10),
                    backoff_multiplier: 2.0,
                    use_jitter: true,
                    max_jitter: 0.2,
                    attempt_timeout: Some(Duration::from_secs(30)),
                },
            },
            _ => Self::NoRetry,
        }
    }
}

pub struct RetryExecutor {
    strategy: RetryStrategy,
    operation_name: String,
}

impl RetryExecutor {
    pub fn new(strategy: RetryStrategy, operation_name: String) -> Self {
        Self {
            strategy,
            operation_name,
        }
    }

    pub async fn execute<F, T, E>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send + 'static>>,
        E: Into<CoreError> + std::fmt::Debug,
    {
        match &self.strategy {
            RetryStrategy::NoRetry => {
                debug!("executing {} without retry", self.operation_name);
                operation().await.map_err(Into::into)
            }
            RetryStrategy::FixedDelay(delay) => self.execute_with_fixed_delay(*delay, operation).await,
            RetryStrategy::ExponentialBackoff { config } => {
                self.execute_with_exponential_backoff(config, operation).await
            }
            RetryStrategy::Custom { delays } => self.execute_with_custom_delays(delays, operation).await,
        }
    }

    async fn execute_with_fixed_delay<F, T, E>(&self, delay: Duration, operation: F) -> Result<T>
    where
        F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send + 'static>>,
        E: Into<CoreError> + std::fmt::Debug,
    {
        let mut last_error = None;

        for attempt in 1..=3u32 {
            debug!("executing {} (attempt {}/3)", self.operation_name, attempt);
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", self.operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let error = e.into();
                    warn!("{} failed on attempt {}: {:?}", self.operation_name, attempt, error);
                    last_error = Some(error);
                    if attempt < 3 {
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::Internal(anyhow::anyhow!("no error recorded"))))
    }

    async fn execute_with_exponential_backoff<F, T, E>(
        &self,
        config: &RetryConfig,
        operation: F,
    ) -> Result<T>
    where
        F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send + 'static>>,
        E: Into<CoreError> + std::fmt::Debug,
    {
        let mut last_error = None;
        let mut current_delay = config.base_delay;

        for attempt in 1..=config.max_attempts {
            debug!(
                "executing {} (attempt {}/{})",
                self.operation_name, attempt, config.max_attempts
            );

            let result = if let Some(timeout) = config.attempt_timeout {
                tokio::time::timeout(timeout, operation()).await
            } else {
                Ok(operation().await)
            };

            match result {
                Ok(Ok(result)) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", self.operation_name, attempt);
                    }
                    return Ok(result);
                }
                Ok(Err(e)) => {
                    let error = e.into();
                    warn!("{} failed on attempt {}: {:?}", self.operation_name, attempt, error);
                    last_error = Some(error);
                }
                Err(_) => {
                    let error = CoreError::Timeout(config.attempt_timeout.unwrap_or_default());
                    warn!("{} timed out on attempt {}", self.operation_name, attempt);
                    last_error = Some(error);
                }
            }

            if attempt < config.max_attempts {
                let delay_with_jitter = if config.use_jitter {
                    add_jitter(current_delay, config.max_jitter)
                } else {
                    current_delay
                };
                sleep(delay_with_jitter).await;
                current_delay = Duration::from_millis(
                    ((current_delay.as_millis() as f64) * config.backoff_multiplier) as u64,
                )
                .min(config.max_delay);
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::Internal(anyhow::anyhow!("no error recorded"))))
    }

    async fn execute_with_custom_delays<F, T, E>(&self, delays: &[Duration], operation: F) -> Result<T>
    where
        F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send + 'static>>,
        E: Into<CoreError> + std::fmt::Debug,
    {
        let max_attempts = delays.len() + 1;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            debug!("executing {} (attempt {}/{})", self.operation_name, attempt, max_attempts);
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", self.operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let error = e.into();
                    warn!("{} failed on attempt {}: {:?}", self.operation_name, attempt, error);
                    last_error = Some(error);
                    if attempt <= delays.len() {
                        sleep(delays[attempt - 1]).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::Internal(anyhow::anyhow!("no error recorded"))))
    }
}

fn add_jitter(delay: Duration, max_jitter: f64) -> Duration {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    let seed = hasher.finish();

    let random = ((seed.wrapping_mul(1103515245).wrapping_add(12345)) >> 16) & 0x7fff;
    let jitter_factor = (random as f64 / 32767.0) * max_jitter;

    let delay_ms = delay.as_millis() as f64;
    let jittered_ms = delay_ms + delay_ms * jitter_factor;
    Duration::from_millis(jittered_ms as u64)
}

pub async fn retry_operation<F, T, E>(operation_name: &str, strategy: RetryStrategy, operation: F) -> Result<T>
where
    F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send + 'static>>,
    E: Into<CoreError> + std::fmt::Debug,
{
    RetryExecutor::new(strategy, operation_name.to_string())
        .execute(operation)
        .await
}
