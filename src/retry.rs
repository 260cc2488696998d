use std::time::Duration;

use tokio::time::sleep;

use crate::{ClientError, HttpClient, PreparedRequest, Result};

pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub(crate) const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub(crate) const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(3);
pub(crate) const DEFAULT_MULTIPLIER: u32 = 2;

/// Attempt budget and backoff schedule used by [`RetryExecutor`].
///
/// The delay before retrying attempt `i` (0-based) is
/// `min(base_delay * multiplier^i, max_delay)`. There is no jitter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for any single backoff.
    pub max_delay: Duration,
    /// Growth factor applied to the backoff after each failed attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Sets the total attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the backoff after the first failed attempt.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the cap applied to every backoff.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the exponential growth factor. `1` gives a constant backoff.
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Number of attempts actually made before giving up.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff before the attempt following `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }
}

/// Result of one attempt, before the retry decision.
enum Outcome {
    Success(reqwest::Response),
    Retryable(ClientError),
}

/// Sends a request with bounded, cancellable exponential backoff.
///
/// Transport errors and every status >= 400 are retried alike. Cancellation
/// is fatal and is observed before and during each attempt, before each
/// backoff and during each backoff. A request cancelled up front is never sent.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Creates an executor bound to `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy this executor retries with.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `request` against `client` until it succeeds, is cancelled or
    /// runs out of attempts.
    ///
    /// Returns the first response with status < 400. Bodies of failed
    /// attempts are dropped before the next attempt starts.
    pub async fn execute(
        &self,
        client: &HttpClient,
        request: PreparedRequest,
    ) -> Result<reqwest::Response> {
        let attempts = self.policy.attempts();
        let signal = request.signal();
        let mut attempt = 0u32;

        loop {
            if let Some(cause) = signal.check() {
                return Err(ClientError::Cancelled(cause));
            }

            let outcome = tokio::select! {
                outcome = Self::attempt_once(client, &request) => outcome?,
                cause = signal.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, %cause, "request cancelled during attempt");

                    return Err(ClientError::Cancelled(cause));
                }
            };

            let last_error = match outcome {
                Outcome::Success(response) => return Ok(response),
                Outcome::Retryable(err) => err,
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(attempt, error = %last_error, "request attempt failed");

            if let Some(cause) = signal.check() {
                return Err(ClientError::Cancelled(cause));
            }

            if attempt + 1 >= attempts {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempts, error = %last_error, "giving up after retries");

                return Err(ClientError::RetriesExhausted {
                    attempts,
                    last: Box::new(last_error),
                });
            }

            let delay = self.policy.delay_for(attempt);

            #[cfg(feature = "tracing")]
            tracing::debug!("retrying request after {} ms", delay.as_millis());

            tokio::select! {
                _ = sleep(delay) => {}
                cause = signal.cancelled() => return Err(ClientError::Cancelled(cause)),
            }

            attempt += 1;
        }
    }

    /// Performs one attempt and classifies it. Only a request that cannot be
    /// replayed is reported as an error here.
    async fn attempt_once(client: &HttpClient, request: &PreparedRequest) -> Result<Outcome> {
        let response = match client.execute(request.attempt()?).await {
            Ok(response) => response,
            Err(err) => return Ok(Outcome::Retryable(err)),
        };

        let status = response.status();
        if status.as_u16() < 400 {
            return Ok(Outcome::Success(response));
        }

        drop(response);
        Ok(Outcome::Retryable(ClientError::UnexpectedStatus {
            status: status.as_u16(),
        }))
    }
}

/// Sends `request` through `client` with the default [`RetryPolicy`].
pub async fn do_with_retry(
    client: &HttpClient,
    request: impl Into<PreparedRequest>,
) -> Result<reqwest::Response> {
    RetryExecutor::default()
        .execute(client, request.into())
        .await
}
