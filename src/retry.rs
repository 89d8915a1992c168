use rand::random;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{AgentError, Result};
use crate::util::logging::Logger;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: usize,

    /// Initial delay before first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Multiplier for exponential backoff
    pub backoff_factor: f64,

    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,

    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 60_000, // 1 minute
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay following `current`, before jitter
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.backoff_factor) as u64;
        Duration::from_millis(next_ms.min(self.max_delay_ms))
    }
}

/// Execute a fallible async operation, retrying transient failures.
///
/// Errors for which [`AgentError::is_transient`] is false are returned as is
/// on the first occurrence. When the attempts run out the last error is
/// wrapped in [`AgentError::Retry`].
pub async fn execute_with_retry<F, Fut, T>(
    mut operation: F,
    config: &RetryConfig,
    context: &str,
    logger: &Logger,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;
    let mut delay = Duration::from_millis(config.initial_delay_ms);

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                attempts += 1;

                if attempts >= config.max_attempts {
                    return Err(AgentError::retry(context, attempts, err));
                }

                logger.warn(format_args!(
                    "{} (attempt {}/{}): {}",
                    context, attempts, config.max_attempts, err
                ));

                let wait = if config.jitter {
                    delay + Duration::from_millis(random::<u64>() % 100)
                } else {
                    delay
                };
                logger.debug(format_args!("Retrying after {:?} delay", wait));
                sleep(wait).await;

                delay = config.next_delay(delay);
            }
        }
    }
}

/// Builder for custom retry configurations
#[derive(Default)]
pub struct RetryBuilder {
    config: RetryConfig,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay_ms: u64) -> Self {
        self.config.initial_delay_ms = delay_ms;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.config.backoff_factor = factor;
        self
    }

    pub fn max_delay(mut self, delay_ms: u64) -> Self {
        self.config.max_delay_ms = delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}
