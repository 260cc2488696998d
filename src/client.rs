use std::fmt;

use reqwest::{IntoUrl, Method};

use crate::{
    retry::RetryExecutor, ClientConfig, ClientError, ClientOption, PreparedRequest, Result,
};

#[derive(Clone)]
/// HTTP client with production-safe transport defaults.
///
/// Cloning is cheap: clones share the same connection pool, which is safe
/// to use from many tasks at once.
pub struct HttpClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Creates a client from the defaults and `options`, applied in order.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use resilient_http::{ClientOption, HttpClient};
    ///
    /// let client = HttpClient::new([
    ///     ClientOption::Timeout(Duration::from_secs(5)),
    ///     ClientOption::DisableHttp2,
    /// ])
    /// .expect("valid options");
    /// ```
    pub fn new<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = ClientOption>,
    {
        Self::from_config(ClientConfig::from_options(options)?)
    }

    /// Creates a client with every setting at its default.
    pub fn with_defaults() -> Result<Self> {
        Self::from_config(ClientConfig::default())
    }

    /// Creates a client from an already resolved config.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = match &config.custom_transport {
            Some(client) => client.clone(),
            None => config.build_transport()?,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            custom_transport = config.custom_transport.is_some(),
            timeout_ms = config.timeout.as_millis() as u64,
            http2 = config.http2,
            "http client built"
        );

        Ok(Self { http, config })
    }

    /// Returns the resolved settings this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.http
    }

    /// Starts building a request for this client.
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> reqwest::RequestBuilder {
        self.http.request(method, url)
    }

    /// Starts building a `GET` request.
    pub fn get<U: IntoUrl>(&self, url: U) -> reqwest::RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Starts building a `POST` request.
    pub fn post<U: IntoUrl>(&self, url: U) -> reqwest::RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Sends `request` once, without retries or status checks.
    ///
    /// The configured overall timeout applies unless the request sets its own.
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        if request.timeout().is_none() {
            *request.timeout_mut() = Some(self.config.timeout);
        }
        self.http
            .execute(request)
            .await
            .map_err(ClientError::Transport)
    }

    /// Sends `request` with the default retry policy.
    ///
    /// See [`RetryExecutor`] to use a different policy.
    pub async fn execute_with_retry(
        &self,
        request: impl Into<PreparedRequest>,
    ) -> Result<reqwest::Response> {
        RetryExecutor::default().execute(self, request.into()).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::HttpClient;
    use crate::{ClientError, ClientOption};

    #[test]
    fn default_client_uses_default_config() {
        let client = HttpClient::with_defaults().expect("default client must build");
        assert_eq!(client.config().timeout, Duration::from_secs(15));
        assert_eq!(client.config().idle_conn_timeout, Duration::from_secs(90));
    }

    #[test]
    fn options_are_visible_on_config() {
        let client = HttpClient::new([
            ClientOption::Timeout(Duration::from_secs(1)),
            ClientOption::DisableHttp2,
        ])
        .expect("client must build");
        assert_eq!(client.config().timeout, Duration::from_secs(1));
        assert!(!client.config().http2);
    }

    #[test]
    fn custom_transport_is_used() {
        let custom = reqwest::Client::builder()
            .pool_max_idle_per_host(200)
            .build()
            .expect("custom transport must build");
        let client = HttpClient::new([ClientOption::Transport(custom)]).expect("client must build");
        assert!(client.config().custom_transport.is_some());
    }

    #[test]
    fn invalid_option_sequence_fails_to_build() {
        let err = HttpClient::new([
            ClientOption::Transport(reqwest::Client::new()),
            ClientOption::DisableHttp2,
        ])
        .expect_err("must fail");
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn debug_includes_config() {
        let client = HttpClient::with_defaults().expect("default client must build");
        let debug = format!("{client:?}");
        assert!(debug.contains("HttpClient"));
        assert!(debug.contains("timeout"));
    }
}
