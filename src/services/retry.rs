use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::LabelerConfig;
use crate::error::LabelerError;
use crate::services::api::ApiError;
use crate::services::cancellation::GenerationGuard;
use crate::services::events::EventSink;

/// Per-operation retry budget. A fresh counter is created for every
/// submit or fetch so the two never share attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryCounter {
    failures: u32,
    max_retries: u32,
}

impl RetryCounter {
    pub fn new(max_retries: u32) -> Self {
        Self {
            failures: 0,
            max_retries,
        }
    }

    /// Record a failed attempt. Returns `true` while another attempt is allowed.
    pub fn record_failure(&mut self) -> bool {
        self.failures += 1;
        self.failures <= self.max_retries
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Retry transport failures of one request, up to `max_retries` extra attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LabelerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.retry_delay(),
        }
    }

    /// Run `attempt` until it succeeds. Protocol errors are returned at once;
    /// transport errors are retried until the budget is spent. A response
    /// that arrives after a cancel yields `Cancelled` whatever it contained.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        guard: &GenerationGuard,
        events: &EventSink,
        mut attempt: F,
    ) -> Result<T, LabelerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut counter = RetryCounter::new(self.max_retries);
        loop {
            let outcome = attempt().await;
            if !guard.is_current() {
                return Err(LabelerError::Cancelled);
            }

            let message = match outcome {
                Ok(value) => return Ok(value),
                Err(ApiError::Protocol(message)) => return Err(LabelerError::Protocol(message)),
                Err(ApiError::Transport(message)) => message,
            };

            if !counter.record_failure() {
                return Err(LabelerError::Transport { operation, message });
            }

            warn!(
                operation,
                attempt = counter.failures(),
                max_retries = self.max_retries,
                error = %message,
                "Request failed, retrying"
            );
            metrics::counter!("cloud_label_retries_total", "operation" => operation).increment(1);
            events.status(
                guard,
                format!(
                    "{operation} failed ({}/{}), retrying\u{2026}",
                    counter.failures(),
                    self.max_retries
                ),
                2000,
            );

            if !guard.sleep(self.delay).await {
                return Err(LabelerError::Cancelled);
            }
        }
    }
}
