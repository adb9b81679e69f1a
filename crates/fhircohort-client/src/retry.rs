use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::connector::SharedSession;
use crate::error::{ClientError, Result};
use crate::session::FhirSession;

/// How failed queries are retried.
///
/// `max_attempts = None` retries forever, which is the default: the server is
/// expected to be unreliable but eventually available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_delay_ms() -> u64 {
    3_000
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay_ms: default_delay_ms(),
            max_delay_ms: default_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Fixed delay, bounded attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            max_attempts: Some(max_attempts),
            initial_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(63) as i32;
        let scaled = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt may follow `attempts` attempts.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

/// Run `op` against the current session until it succeeds or the policy
/// gives up. Between attempts: log, sleep, reconnect. Errors that are not
/// retryable are returned as they are.
pub async fn with_retry<T, F, Fut>(
    session: &SharedSession,
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(Arc<FhirSession>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let err = match op(session.current()).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if !policy.should_retry(attempts) {
            return Err(ClientError::RetriesExhausted {
                attempts,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_for(attempts);
        warn!(
            operation,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "request failed, retrying after reconnect"
        );
        tokio::time::sleep(delay).await;

        // A failed reconnect keeps the old session; the next attempt will
        // fail and come back here.
        if let Err(e) = session.reconnect().await {
            warn!(operation, error = %e, "reconnect failed");
        }
    }
}
