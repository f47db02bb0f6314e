//! Outbound HTTP client construction.
//!
//! Every fetch builds its client from the domain's configuration row so that
//! timeout, proxy and TLS changes take effect on the next call.

use std::time::Duration;

use reqwest::{Client, Proxy, Url};
use tracing::warn;

use super::{ExternalDataSourceConfig, MarketDataError, MarketDataResult};

/// Identification header sent when a request does not set its own.
pub const DEFAULT_USER_AGENT: &str = concat!("bookfeed/", env!("CARGO_PKG_VERSION"));

const PROXY_ENV_VARS: [&str; 4] = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyPolicy {
    /// Honor proxy environment variables when present and valid.
    System,
    None,
    Explicit(Url),
}

impl ProxyPolicy {
    /// Unset or blank means `system`. An unparsable URL disables proxying.
    pub fn parse(value: Option<&str>) -> Self {
        let value = match value.map(str::trim) {
            None | Some("") => return Self::System,
            Some(v) => v,
        };

        if value.eq_ignore_ascii_case("none") {
            return Self::None;
        }
        if value.eq_ignore_ascii_case("system") {
            return Self::System;
        }

        match Url::parse(value) {
            Ok(url) => Self::Explicit(url),
            Err(err) => {
                warn!(proxy = value, error = %err, "ignoring invalid proxy URL");
                Self::None
            }
        }
    }
}

/// Returns the first proxy environment value that parses as a URL.
fn system_proxy_from(lookup: impl Fn(&str) -> Option<String>) -> Option<Url> {
    PROXY_ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .and_then(|value| Url::parse(&value).ok())
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub proxy: ProxyPolicy,
    pub skip_tls_verify: bool,
    pub user_agent: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(super::DEFAULT_REQUEST_TIMEOUT_MS),
            proxy: ProxyPolicy::System,
            skip_tls_verify: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TransportSettings {
    pub fn from_config(config: &ExternalDataSourceConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.effective_timeout_ms()),
            proxy: ProxyPolicy::parse(config.proxy.as_deref()),
            skip_tls_verify: config.skip_tls_verify,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build_client(&self) -> MarketDataResult<Client> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str());

        builder = match &self.proxy {
            ProxyPolicy::None => builder.no_proxy(),
            // reqwest reads the environment itself; only opt out when nothing usable is set.
            ProxyPolicy::System => match system_proxy_from(|name| std::env::var(name).ok()) {
                Some(_) => builder,
                None => builder.no_proxy(),
            },
            ProxyPolicy::Explicit(url) => {
                let proxy = Proxy::all(url.as_str()).map_err(|err| {
                    MarketDataError::ConfigInvalid(format!("proxy {url}: {err}"))
                })?;
                builder.proxy(proxy)
            }
        };

        if self.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|err| MarketDataError::ConfigInvalid(format!("http client: {err}")))
    }
}
