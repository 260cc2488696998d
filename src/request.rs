use std::{future, time::Duration};

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::{error::CancelCause, ClientError, Result};

/// Cancellation token and deadline attached to a request.
///
/// Both are optional. A signal with neither never fires.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// Creates a signal that never fires.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires when `token` is cancelled.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Fires once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline to `timeout` from now.
    ///
    /// A timeout too large to represent as an instant leaves the deadline
    /// unset.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Returns the deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the cause if the signal has already fired. Never blocks.
    pub fn check(&self) -> Option<CancelCause> {
        if self
            .token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Some(CancelCause::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the token is cancelled or the deadline passes.
    pub async fn cancelled(&self) -> CancelCause {
        let token = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            _ = token => CancelCause::Cancelled,
            _ = deadline => CancelCause::DeadlineExceeded,
        }
    }
}

/// A `reqwest::Request` ready to be sent, possibly several times, together
/// with the signal that aborts it.
///
/// The body must be replayable (bytes, text, JSON or form); streaming bodies
/// are rejected when the request is first sent.
#[derive(Debug)]
pub struct PreparedRequest {
    inner: reqwest::Request,
    signal: CancelSignal,
}

impl PreparedRequest {
    /// Wraps `inner` with a signal that never fires.
    pub fn new(inner: reqwest::Request) -> Self {
        Self {
            inner,
            signal: CancelSignal::default(),
        }
    }

    /// Replaces the whole cancellation signal.
    pub fn with_signal(mut self, signal: CancelSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Cancels the request when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.signal = self.signal.with_token(token);
        self
    }

    /// Cancels the request once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.signal = self.signal.with_deadline(deadline);
        self
    }

    /// Cancels the request `timeout` from now, across all attempts.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.signal = self.signal.with_timeout(timeout);
        self
    }

    /// Returns the request sent on every attempt.
    pub fn inner(&self) -> &reqwest::Request {
        &self.inner
    }

    /// Returns the signal that aborts the request.
    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// Copies the request for one attempt.
    pub(crate) fn attempt(&self) -> Result<reqwest::Request> {
        self.inner.try_clone().ok_or(ClientError::UnreplayableRequest)
    }
}

impl From<reqwest::Request> for PreparedRequest {
    fn from(inner: reqwest::Request) -> Self {
        Self::new(inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::{CancelSignal, PreparedRequest};
    use crate::error::CancelCause;

    #[test]
    fn empty_signal_never_fires() {
        assert_eq!(CancelSignal::new().check(), None);
    }

    #[test]
    fn cancelled_token_is_reported() {
        let token = CancellationToken::new();
        let signal = CancelSignal::new().with_token(token.clone());
        assert_eq!(signal.check(), None);
        token.cancel();
        assert_eq!(signal.check(), Some(CancelCause::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_reported() {
        let signal = CancelSignal::new().with_timeout(Duration::from_millis(100));
        assert_eq!(signal.check(), None);
        assert_eq!(signal.cancelled().await, CancelCause::DeadlineExceeded);
        assert_eq!(signal.check(), Some(CancelCause::DeadlineExceeded));
    }

    #[tokio::test]
    async fn unrepresentable_timeout_leaves_no_deadline() {
        let signal = CancelSignal::new().with_timeout(Duration::MAX);
        assert_eq!(signal.deadline(), None);
        assert_eq!(signal.check(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn token_wins_over_later_deadline() {
        let token = CancellationToken::new();
        let signal = CancelSignal::new()
            .with_token(token.clone())
            .with_deadline(Instant::now() + Duration::from_secs(60));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        assert_eq!(signal.cancelled().await, CancelCause::Cancelled);
        canceller.await.expect("canceller task must finish");
    }

    #[test]
    fn buffered_body_can_be_replayed() {
        let request = reqwest::Client::new()
            .post("http://localhost/items")
            .body("payload")
            .build()
            .expect("request must build");
        let prepared = PreparedRequest::from(request);

        let first = prepared.attempt().expect("first copy");
        let second = prepared.attempt().expect("second copy");
        assert_eq!(first.url(), second.url());
        assert_eq!(
            second.body().and_then(|body| body.as_bytes()),
            Some(&b"payload"[..])
        );
    }
}
