use std::fmt;

/// Why a request stopped before it could succeed or exhaust its retries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelCause {
    /// The request's cancellation token was triggered.
    Cancelled,
    /// The request's deadline elapsed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("request cancelled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// Response status code was 400 or above. The body has been discarded.
    #[error("unexpected status code {status}")]
    UnexpectedStatus { status: u16 },
    /// The request was cancelled or its deadline elapsed.
    #[error("request cancelled or timed out: {0}")]
    Cancelled(CancelCause),
    /// Every attempt failed; wraps the last transport or status error.
    #[error("failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total number of attempts made.
        attempts: u32,
        /// Error observed on the final attempt.
        #[source]
        last: Box<ClientError>,
    },
    /// Request body is a stream and cannot be sent more than once.
    #[error("request body cannot be cloned for retry")]
    UnreplayableRequest,
    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// `reqwest` refused to build the underlying client.
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    /// Returns `true` for cancellation and deadline errors.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns `true` when every attempt was consumed without success.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Returns the HTTP status that caused this error, looking through
    /// [`ClientError::RetriesExhausted`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
