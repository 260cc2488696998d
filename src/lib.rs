//! `resilient-http` builds HTTP clients with production-safe transport
//! defaults and sends requests with automatic, bounded retries.
//!
//! - [`HttpClient::new`] resolves a [`ClientConfig`] from ordered [`ClientOption`]s
//! - [`do_with_retry`] and [`RetryExecutor`] retry transport errors and
//!   status codes >= 400 with exponential backoff
//! - [`PreparedRequest`] carries the cancellation token and deadline that
//!   stop retries early

mod client;
mod config;
mod error;
mod options;
mod request;
mod retry;

pub use client::HttpClient;
pub use config::{ClientConfig, ClientOption, DialerConfig, ProxyConfig, ProxyFn};
pub use error::{CancelCause, ClientError};
pub use options::ClientOptions;
pub use request::{CancelSignal, PreparedRequest};
pub use retry::{do_with_retry, RetryExecutor, RetryPolicy};

pub use reqwest::{Method, Response, StatusCode, Url};
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ClientError>;
