use std::{fmt, sync::Arc, time::Duration};

use reqwest::Url;

use crate::{ClientError, Result};

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub(crate) const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);
pub(crate) const DEFAULT_MAX_IDLE_CONNS: usize = 100;
pub(crate) const DEFAULT_EXPECT_CONTINUE_TIMEOUT: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Proxy resolution function: maps a request URL to the proxy to use, if any.
pub type ProxyFn = Arc<dyn Fn(&Url) -> Option<Url> + Send + Sync>;

/// How the transport picks a proxy for each request.
#[derive(Clone, Default)]
pub enum ProxyConfig {
    /// Use `HTTP_PROXY`, `HTTPS_PROXY`, `ALL_PROXY` and `NO_PROXY`.
    #[default]
    Environment,
    /// Never use a proxy, even if the environment names one.
    Disabled,
    /// Resolve the proxy with a caller-supplied function.
    Custom(ProxyFn),
}

impl ProxyConfig {
    /// Builds a [`ProxyConfig::Custom`] from a closure.
    pub fn custom<F>(resolve: F) -> Self
    where
        F: Fn(&Url) -> Option<Url> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(resolve))
    }

    /// Returns the proxy chosen for `url`, or `None` when the request goes direct.
    ///
    /// For [`ProxyConfig::Environment`] this returns `None`; the transport
    /// reads the environment itself.
    pub fn resolve(&self, url: &Url) -> Option<Url> {
        match self {
            Self::Custom(resolve) => resolve(url),
            Self::Environment | Self::Disabled => None,
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => f.write_str("Environment"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// TCP connect settings. Both fields are always configured together.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DialerConfig {
    /// Maximum time to establish the TCP connection.
    pub connect_timeout: Duration,
    /// TCP keep-alive interval for open connections.
    pub keep_alive: Duration,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_DIAL_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

/// Resolved client and transport parameters.
///
/// Built from [`ClientConfig::default`] and a sequence of [`ClientOption`]s,
/// then frozen inside an [`HttpClient`](crate::HttpClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Overall per-request timeout, applied to every attempt.
    pub timeout: Duration,
    /// Added to the dial timeout to bound the whole connect phase.
    pub tls_handshake_timeout: Duration,
    /// Maximum wait for the response once the request is written.
    pub response_header_timeout: Duration,
    /// How long an unused pooled connection stays open.
    pub idle_conn_timeout: Duration,
    /// Idle connections kept across all hosts.
    pub max_idle_conns: usize,
    /// Idle connections kept per host.
    pub max_idle_conns_per_host: usize,
    /// Whether HTTP/2 is negotiated when the server offers it.
    pub http2: bool,
    /// Recorded for callers; reqwest never sends `Expect: 100-continue`.
    pub expect_continue_timeout: Duration,
    /// Proxy selection for outgoing requests.
    pub proxy: ProxyConfig,
    /// TCP connect timeout and keep-alive.
    pub dialer: DialerConfig,
    /// Prebuilt transport that replaces the default one.
    pub custom_transport: Option<reqwest::Client>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            tls_handshake_timeout: DEFAULT_TLS_HANDSHAKE_TIMEOUT,
            response_header_timeout: DEFAULT_TIMEOUT,
            idle_conn_timeout: DEFAULT_IDLE_CONN_TIMEOUT,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            max_idle_conns_per_host: DEFAULT_MAX_IDLE_CONNS,
            http2: true,
            expect_continue_timeout: DEFAULT_EXPECT_CONTINUE_TIMEOUT,
            proxy: ProxyConfig::default(),
            dialer: DialerConfig::default(),
            custom_transport: None,
        }
    }
}

impl ClientConfig {
    /// Resolves a config from the defaults and `options`, applied in order.
    pub fn from_options<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = ClientOption>,
    {
        let mut config = Self::default();
        for option in options {
            config.apply(option)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies a single option. Later options overwrite earlier ones.
    ///
    /// Fails when `option` tunes the default transport after a custom
    /// transport has been installed, since it could have no effect. Tuning
    /// applied before the custom transport is rejected by [`Self::validate`].
    pub fn apply(&mut self, option: ClientOption) -> Result<()> {
        if self.custom_transport.is_some() && option.targets_transport() {
            return Err(ClientError::Config(format!(
                "option `{}` cannot be applied after a custom transport is installed",
                option.name()
            )));
        }

        match option {
            ClientOption::Timeout(value) => self.timeout = value,
            ClientOption::TlsHandshakeTimeout(value) => self.tls_handshake_timeout = value,
            ClientOption::ResponseHeaderTimeout(value) => self.response_header_timeout = value,
            ClientOption::IdleConnTimeout(value) => self.idle_conn_timeout = value,
            ClientOption::MaxIdleConns(value) => self.max_idle_conns = value,
            ClientOption::MaxIdleConnsPerHost(value) => self.max_idle_conns_per_host = value,
            ClientOption::DisableHttp2 => self.http2 = false,
            ClientOption::Transport(client) => self.custom_transport = Some(client),
            ClientOption::ExpectContinueTimeout(value) => self.expect_continue_timeout = value,
            ClientOption::Proxy(proxy) => self.proxy = proxy,
            ClientOption::DialerTimeout(value) => self.dialer.connect_timeout = value,
            ClientOption::DialerKeepAlive(value) => self.dialer.keep_alive = value,
            ClientOption::Dialer(dialer) => self.dialer = dialer,
        }
        Ok(())
    }

    /// Rejects zero timeouts and empty connection pools. With a custom
    /// transport installed, also rejects default-transport settings it would
    /// ignore.
    pub fn validate(&self) -> Result<()> {
        if self.custom_transport.is_some() {
            if let Some(name) = self.tuned_transport_fields().first() {
                return Err(ClientError::Config(format!(
                    "`{name}` has no effect because a custom transport is installed"
                )));
            }
        }

        let durations = [
            ("timeout", self.timeout),
            ("tls_handshake_timeout", self.tls_handshake_timeout),
            ("response_header_timeout", self.response_header_timeout),
            ("idle_conn_timeout", self.idle_conn_timeout),
            ("expect_continue_timeout", self.expect_continue_timeout),
            ("dialer.connect_timeout", self.dialer.connect_timeout),
            ("dialer.keep_alive", self.dialer.keep_alive),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| value.is_zero()) {
            return Err(ClientError::Config(format!("{name} must be greater than zero")));
        }
        if self.max_idle_conns == 0 {
            return Err(ClientError::Config(
                "max_idle_conns must be greater than zero".to_owned(),
            ));
        }
        if self.max_idle_conns_per_host == 0 {
            return Err(ClientError::Config(
                "max_idle_conns_per_host must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Names of default-transport settings that differ from their defaults.
    fn tuned_transport_fields(&self) -> Vec<&'static str> {
        let defaults = Self::default();
        let checks = [
            (
                "tls_handshake_timeout",
                self.tls_handshake_timeout != defaults.tls_handshake_timeout,
            ),
            (
                "response_header_timeout",
                self.response_header_timeout != defaults.response_header_timeout,
            ),
            (
                "idle_conn_timeout",
                self.idle_conn_timeout != defaults.idle_conn_timeout,
            ),
            ("max_idle_conns", self.max_idle_conns != defaults.max_idle_conns),
            (
                "max_idle_conns_per_host",
                self.max_idle_conns_per_host != defaults.max_idle_conns_per_host,
            ),
            ("disable_http2", self.http2 != defaults.http2),
            (
                "expect_continue_timeout",
                self.expect_continue_timeout != defaults.expect_continue_timeout,
            ),
            ("proxy", !matches!(self.proxy, ProxyConfig::Environment)),
            ("dialer", self.dialer != defaults.dialer),
        ];
        checks
            .into_iter()
            .filter_map(|(name, tuned)| tuned.then_some(name))
            .collect()
    }

    /// Builds the default reqwest transport from these settings.
    pub(crate) fn build_transport(&self) -> Result<reqwest::Client> {
        // reqwest has a single connect phase covering TCP and TLS, and a single
        // idle cap per host; a global cap bounds every host as well.
        let mut builder = reqwest::Client::builder()
            .connect_timeout(
                self.dialer
                    .connect_timeout
                    .saturating_add(self.tls_handshake_timeout),
            )
            .tcp_keepalive(self.dialer.keep_alive)
            .read_timeout(self.response_header_timeout)
            .pool_idle_timeout(self.idle_conn_timeout)
            .pool_max_idle_per_host(self.max_idle_conns.min(self.max_idle_conns_per_host));

        if !self.http2 {
            builder = builder.http1_only();
        }

        builder = match &self.proxy {
            ProxyConfig::Environment => builder,
            ProxyConfig::Disabled => builder.no_proxy(),
            ProxyConfig::Custom(resolve) => {
                let resolve = Arc::clone(resolve);
                builder.proxy(reqwest::Proxy::custom(move |url| resolve(url)))
            }
        };

        builder.build().map_err(ClientError::Build)
    }
}

/// A single named mutation of a [`ClientConfig`].
#[derive(Clone, Debug)]
pub enum ClientOption {
    /// Overall per-request timeout.
    Timeout(Duration),
    /// TLS handshake budget, added to the dial timeout.
    TlsHandshakeTimeout(Duration),
    /// Maximum wait for the response once the request is written.
    ResponseHeaderTimeout(Duration),
    /// Lifetime of an unused pooled connection.
    IdleConnTimeout(Duration),
    /// Maximum idle connections across all hosts.
    MaxIdleConns(usize),
    /// Maximum idle connections per host.
    MaxIdleConnsPerHost(usize),
    /// Speak HTTP/1.1 only.
    DisableHttp2,
    /// Replaces the default transport with a prebuilt `reqwest::Client`.
    ///
    /// Transport options applied after this one are rejected.
    Transport(reqwest::Client),
    /// Stored on the config only; reqwest never waits for `100 Continue`.
    ExpectContinueTimeout(Duration),
    /// Proxy selection for outgoing requests.
    Proxy(ProxyConfig),
    /// Sets the connect timeout, keeping the current keep-alive.
    DialerTimeout(Duration),
    /// Sets the keep-alive, keeping the current connect timeout.
    DialerKeepAlive(Duration),
    /// Sets connect timeout and keep-alive together.
    Dialer(DialerConfig),
}

impl ClientOption {
    /// Returns `true` for options that tune the default transport.
    pub fn targets_transport(&self) -> bool {
        !matches!(self, Self::Timeout(_) | Self::Transport(_))
    }

    /// Stable option name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::TlsHandshakeTimeout(_) => "tls_handshake_timeout",
            Self::ResponseHeaderTimeout(_) => "response_header_timeout",
            Self::IdleConnTimeout(_) => "idle_conn_timeout",
            Self::MaxIdleConns(_) => "max_idle_conns",
            Self::MaxIdleConnsPerHost(_) => "max_idle_conns_per_host",
            Self::DisableHttp2 => "disable_http2",
            Self::Transport(_) => "transport",
            Self::ExpectContinueTimeout(_) => "expect_continue_timeout",
            Self::Proxy(_) => "proxy",
            Self::DialerTimeout(_) => "dialer_timeout",
            Self::DialerKeepAlive(_) => "dialer_keep_alive",
            Self::Dialer(_) => "dialer",
        }
    }
}
