use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::StoreError;

/// Bounded linear backoff for inserts that race a referenced row into view.
///
/// Only `StoreError::MissingReference` is retried. Once the attempts are
/// spent the caller's fallback (the same write without the reference) runs
/// and the result is reported as degraded instead of failing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Completed { value: T, attempts: u32 },
    Degraded { value: T, warning: String },
}

impl<T> RetryOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            RetryOutcome::Completed { value, .. } | RetryOutcome::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            RetryOutcome::Completed { value, .. } | RetryOutcome::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RetryOutcome::Degraded { .. })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub async fn execute<T, Op, OpFut, Fb, FbFut>(
        &self,
        label: &str,
        mut operation: Op,
        fallback: Fb,
    ) -> Result<RetryOutcome<T>, StoreError>
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = Result<T, StoreError>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, StoreError>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(RetryOutcome::Completed { value, attempts: attempt });
                }
                Err(e) if e.is_missing_reference() => {
                    if attempt < self.max_attempts {
                        let delay = self.delay_for(attempt);
                        warn!(
                            "{} hit a missing reference (attempt {}/{}), retrying in {:?}",
                            label, attempt, self.max_attempts, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let warning = format!(
            "{} wrote without its reference after {} attempts: {}",
            label,
            self.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        );
        warn!("⚠️ {}", warning);

        let value = fallback().await?;
        Ok(RetryOutcome::Degraded { value, warning })
    }
}
