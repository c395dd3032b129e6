//! Shared retry/backoff policy for every outbound call.
//!
//! Transient faults (transport errors, HTTP 429, HTTP 5xx) are retried with
//! exponential backoff: `base_delay`, doubling per attempt, capped at
//! `max_delay`. Any other non-success status fails on the spot without
//! consuming further attempts. Callers only ever see one aggregated
//! [`RetryError`] and treat it as "this source/tier failed".

use std::future::Future;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::HarvestError;

/// Outcome of a single attempt that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Worth retrying (timeout, reset, 429, 5xx).
    Transient(String),
    /// Retrying cannot help (4xx other than 429, malformed request).
    Permanent { status: Option<u16>, message: String },
}

impl AttemptError {
    pub fn permanent(message: impl Into<String>) -> Self {
        AttemptError::Permanent { status: None, message: message.into() }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("{what} failed after {attempts} attempts: {last}")]
    Exhausted { what: String, attempts: u32, last: String },

    #[error("{what} failed: {message}")]
    Permanent { what: String, status: Option<u16>, message: String },
}

impl RetryError {
    /// HTTP status of a permanent failure, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            RetryError::Permanent { status, .. } => *status,
            RetryError::Exhausted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay, max_delay }
    }

    /// 429 and every 5xx are transient; everything else is final.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    /// Delay before retry number `retry_index` (0-based).
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 0..attempts {
            debug!(what, attempt = attempt + 1, attempts, "Attempting request");
            match op().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Permanent { status, message }) => {
                    return Err(RetryError::Permanent {
                        what: what.to_string(),
                        status,
                        message,
                    });
                }
                Err(AttemptError::Transient(message)) => {
                    last = message;
                    if attempt + 1 < attempts {
                        let delay = self.delay_for(attempt);
                        warn!(what, error = %last, delay_ms = delay.as_millis() as u64, "Transient failure, retrying");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(RetryError::Exhausted { what: what.to_string(), attempts, last })
    }

    /// Send an HTTP request under this policy. `build` is called once per
    /// attempt since a `RequestBuilder` is consumed by `send`.
    pub async fn send<F>(&self, what: &str, mut build: F) -> Result<Response, RetryError>
    where
        F: FnMut() -> Result<RequestBuilder, HarvestError>,
    {
        self.retry(what, || {
            let request = build();
            async move {
                let request = request.map_err(|e| AttemptError::permanent(e.to_string()))?;
                let resp = request
                    .send()
                    .await
                    .map_err(|e| AttemptError::Transient(e.to_string()))?;

                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                if Self::is_retryable_status(status) {
                    return Err(AttemptError::Transient(format!("HTTP {status}")));
                }

                let body = resp.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                Err(AttemptError::Permanent {
                    status: Some(status.as_u16()),
                    message: format!("HTTP {status}: {snippet}"),
                })
            }
        })
        .await
    }
}
