use std::{str::FromStr, time::Duration};

use serde::Deserialize;

use crate::{ClientError, ClientOption, ProxyConfig, Result, RetryPolicy};

const ENV_PREFIX: &str = "RESILIENT_HTTP_";

/// Flat, serializable client and retry settings.
///
/// Every field is optional; unset fields keep their defaults. Suitable for
/// embedding in an application config file or loading from the environment.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientOptions {
    /// Overall per-request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// TLS handshake timeout in milliseconds.
    pub tls_handshake_timeout_ms: Option<u64>,
    /// Response header timeout in milliseconds.
    pub response_header_timeout_ms: Option<u64>,
    /// Idle pooled connection lifetime in milliseconds.
    pub idle_conn_timeout_ms: Option<u64>,
    /// Idle connections kept across all hosts.
    pub max_idle_conns: Option<usize>,
    /// Idle connections kept per host.
    pub max_idle_conns_per_host: Option<usize>,
    /// Speak HTTP/1.1 only.
    pub disable_http2: bool,
    /// Expect-continue timeout in milliseconds.
    pub expect_continue_timeout_ms: Option<u64>,
    /// Ignore proxy environment variables.
    pub no_proxy: bool,
    /// TCP connect timeout in milliseconds.
    pub dialer_timeout_ms: Option<u64>,
    /// TCP keep-alive interval in milliseconds.
    pub dialer_keep_alive_ms: Option<u64>,
    /// Total attempts per request, including the first.
    pub max_attempts: Option<u32>,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_base_delay_ms: Option<u64>,
    /// Upper bound for a single retry backoff in milliseconds.
    pub retry_max_delay_ms: Option<u64>,
}

impl ClientOptions {
    /// Reads settings from `RESILIENT_HTTP_*` environment variables.
    ///
    /// Variable names are the upper-cased field names, e.g.
    /// `RESILIENT_HTTP_TIMEOUT_MS` or `RESILIENT_HTTP_DISABLE_HTTP2`.
    /// Missing variables leave the field unset; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |field: &str| lookup(&format!("{ENV_PREFIX}{}", field.to_ascii_uppercase()));

        Ok(Self {
            timeout_ms: parse_var(&var, "timeout_ms")?,
            tls_handshake_timeout_ms: parse_var(&var, "tls_handshake_timeout_ms")?,
            response_header_timeout_ms: parse_var(&var, "response_header_timeout_ms")?,
            idle_conn_timeout_ms: parse_var(&var, "idle_conn_timeout_ms")?,
            max_idle_conns: parse_var(&var, "max_idle_conns")?,
            max_idle_conns_per_host: parse_var(&var, "max_idle_conns_per_host")?,
            disable_http2: parse_var(&var, "disable_http2")?.unwrap_or(false),
            expect_continue_timeout_ms: parse_var(&var, "expect_continue_timeout_ms")?,
            no_proxy: parse_var(&var, "no_proxy")?.unwrap_or(false),
            dialer_timeout_ms: parse_var(&var, "dialer_timeout_ms")?,
            dialer_keep_alive_ms: parse_var(&var, "dialer_keep_alive_ms")?,
            max_attempts: parse_var(&var, "max_attempts")?,
            retry_base_delay_ms: parse_var(&var, "retry_base_delay_ms")?,
            retry_max_delay_ms: parse_var(&var, "retry_max_delay_ms")?,
        })
    }

    /// Converts the set fields into client options, in field order.
    pub fn to_client_options(&self) -> Vec<ClientOption> {
        let ms = Duration::from_millis;
        let mut options = Vec::new();

        if let Some(value) = self.timeout_ms {
            options.push(ClientOption::Timeout(ms(value)));
        }
        if let Some(value) = self.tls_handshake_timeout_ms {
            options.push(ClientOption::TlsHandshakeTimeout(ms(value)));
        }
        if let Some(value) = self.response_header_timeout_ms {
            options.push(ClientOption::ResponseHeaderTimeout(ms(value)));
        }
        if let Some(value) = self.idle_conn_timeout_ms {
            options.push(ClientOption::IdleConnTimeout(ms(value)));
        }
        if let Some(value) = self.max_idle_conns {
            options.push(ClientOption::MaxIdleConns(value));
        }
        if let Some(value) = self.max_idle_conns_per_host {
            options.push(ClientOption::MaxIdleConnsPerHost(value));
        }
        if self.disable_http2 {
            options.push(ClientOption::DisableHttp2);
        }
        if let Some(value) = self.expect_continue_timeout_ms {
            options.push(ClientOption::ExpectContinueTimeout(ms(value)));
        }
        if self.no_proxy {
            options.push(ClientOption::Proxy(ProxyConfig::Disabled));
        }
        if let Some(value) = self.dialer_timeout_ms {
            options.push(ClientOption::DialerTimeout(ms(value)));
        }
        if let Some(value) = self.dialer_keep_alive_ms {
            options.push(ClientOption::DialerKeepAlive(ms(value)));
        }

        options
    }

    /// Builds a retry policy, overriding defaults with the set fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        if let Some(value) = self.max_attempts {
            policy = policy.with_max_attempts(value);
        }
        if let Some(value) = self.retry_base_delay_ms {
            policy = policy.with_base_delay(Duration::from_millis(value));
        }
        if let Some(value) = self.retry_max_delay_ms {
            policy = policy.with_max_delay(Duration::from_millis(value));
        }
        policy
    }
}

fn parse_var<T, F>(var: &F, field: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(field) else {
        return Ok(None);
    };
    raw.trim().parse().map(Some).map_err(|err| {
        ClientError::Config(format!(
            "{ENV_PREFIX}{} has invalid value '{raw}': {err}",
            field.to_ascii_uppercase()
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::ClientOptions;
    use crate::{ClientConfig, ClientError, RetryPolicy};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn empty_options_produce_defaults() {
        let options = ClientOptions::default();
        assert!(options.to_client_options().is_empty());
        assert_eq!(options.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn reads_prefixed_variables() {
        let options = ClientOptions::from_lookup(lookup(&[
            ("RESILIENT_HTTP_TIMEOUT_MS", "2500"),
            ("RESILIENT_HTTP_DISABLE_HTTP2", "true"),
            ("RESILIENT_HTTP_MAX_ATTEMPTS", " 3 "),
        ]))
        .expect("env must parse");

        assert_eq!(options.timeout_ms, Some(2_500));
        assert!(options.disable_http2);
        assert_eq!(options.max_attempts, Some(3));
        assert_eq!(options.idle_conn_timeout_ms, None);
    }

    #[test]
    fn malformed_variable_names_the_variable() {
        let err = ClientOptions::from_lookup(lookup(&[("RESILIENT_HTTP_MAX_IDLE_CONNS", "lots")]))
            .expect_err("must fail");
        match err {
            ClientError::Config(message) => {
                assert!(message.contains("RESILIENT_HTTP_MAX_IDLE_CONNS"));
                assert!(message.contains("lots"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn set_fields_become_client_options() {
        let options = ClientOptions {
            timeout_ms: Some(1_000),
            dialer_timeout_ms: Some(200),
            dialer_keep_alive_ms: Some(30_000),
            no_proxy: true,
            ..ClientOptions::default()
        };

        let config =
            ClientConfig::from_options(options.to_client_options()).expect("options must apply");
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.dialer.connect_timeout, Duration::from_millis(200));
        assert_eq!(config.dialer.keep_alive, Duration::from_secs(30));
        assert!(matches!(config.proxy, crate::ProxyConfig::Disabled));
    }

    #[test]
    fn retry_fields_override_policy() {
        let options = ClientOptions {
            max_attempts: Some(2),
            retry_base_delay_ms: Some(10),
            retry_max_delay_ms: Some(40),
            ..ClientOptions::default()
        };
        let policy = options.retry_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(40));
        assert_eq!(policy.multiplier, 2);
    }
}
