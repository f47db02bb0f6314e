use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Default per-request timeout when a configuration row leaves it unset.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// The three independently cached kinds of market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDomain {
    Crypto,
    Stock,
    ExchangeRate,
}

impl DataDomain {
    pub const ALL: [DataDomain; 3] = [Self::Crypto, Self::Stock, Self::ExchangeRate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Stock => "stock",
            Self::ExchangeRate => "exchange_rate",
        }
    }
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "crypto" | "cryptocurrency" => Ok(Self::Crypto),
            "stock" | "stocks" => Ok(Self::Stock),
            "exchange_rate" | "exchange_rates" | "fx" => Ok(Self::ExchangeRate),
            other => Err(format!("unknown data domain: {other}")),
        }
    }
}

/// One persisted data source row. There is at most one per domain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDataSourceConfig {
    pub domain: DataDomain,
    /// Provider identifier, e.g. `coingecko` or `yahoo_finance`.
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Milliseconds; 0 means [`DEFAULT_REQUEST_TIMEOUT_MS`].
    #[serde(default)]
    pub request_timeout_ms: u64,
    /// `none`, `system` or an explicit proxy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Refresh hint such as "5m", consumed by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_frequency: Option<String>,
    #[serde(default)]
    pub skip_tls_verify: bool,
}

impl ExternalDataSourceConfig {
    pub fn new(domain: DataDomain, provider: impl Into<String>) -> Self {
        Self {
            domain,
            provider: provider.into(),
            base_currency: None,
            api_key: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            proxy: None,
            update_frequency: None,
            skip_tls_verify: false,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_currency(mut self, currency: impl Into<String>) -> Self {
        self.base_currency = Some(currency.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn effective_timeout_ms(&self) -> u64 {
        if self.request_timeout_ms == 0 {
            DEFAULT_REQUEST_TIMEOUT_MS
        } else {
            self.request_timeout_ms
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }
}

impl fmt::Debug for ExternalDataSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalDataSourceConfig")
            .field("domain", &self.domain)
            .field("provider", &self.provider)
            .field("base_currency", &self.base_currency)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("proxy", &self.proxy)
            .field("update_frequency", &self.update_frequency)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .finish()
    }
}

/// A single quoted symbol inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePrice {
    pub symbol: String,
    /// Decimal string exactly as derived from the provider value.
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl QuotePrice {
    pub fn new(symbol: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: price.into(),
            currency: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

/// Canonical record produced by every source adapter.
///
/// For the exchange-rate domain each entry is a currency code and the number of
/// units of that currency per one unit of `base_currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub data_source: String,
    pub reference_url: String,
    /// Unix seconds.
    pub update_time: i64,
    pub base_currency: String,
    pub prices: Vec<QuotePrice>,
}

impl PriceSnapshot {
    pub fn new(
        data_source: impl Into<String>,
        reference_url: impl Into<String>,
        captured_at: DateTime<Utc>,
        base_currency: impl Into<String>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            reference_url: reference_url.into(),
            update_time: captured_at.timestamp(),
            base_currency: base_currency.into(),
            prices: Vec::new(),
        }
    }

    pub fn with_prices(mut self, prices: Vec<QuotePrice>) -> Self {
        self.prices = prices;
        self.normalize();
        self
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.update_time, 0)
            .single()
            .unwrap_or_default()
    }

    /// Case-insensitive lookup by symbol.
    pub fn get(&self, symbol: &str) -> Option<&QuotePrice> {
        self.prices
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Sorts entries by symbol and keeps the first entry for each symbol.
    pub fn normalize(&mut self) {
        self.prices.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        self.prices.dedup_by(|later, earlier| later.symbol == earlier.symbol);
    }
}
