use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;

use super::providers::{
    AlphaVantageSource, CoinGeckoSource, ExchangeRateApiSource, FinancialModelingPrepSource,
    FrankfurterSource, SinaFinanceSource, TencentFinanceSource, YahooFinanceSource,
};
use super::{DataDomain, ExternalDataSourceConfig, MarketDataError, MarketDataResult, PriceSnapshot};

/// An outbound GET built by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl QuoteRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A provider adapter: turns symbols into requests and bodies into snapshots.
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    /// Human readable provider name, used as the snapshot's `data_source`.
    fn name(&self) -> &str;

    /// Acquires any session state the quote call depends on.
    async fn prepare(&self, _client: &Client) -> MarketDataResult<()> {
        Ok(())
    }

    /// Called when the provider answered 401, so session state can be dropped.
    fn on_unauthorized(&self) {}

    fn build_requests(
        &self,
        symbols: &[String],
        api_key: Option<&str>,
    ) -> MarketDataResult<Vec<QuoteRequest>>;

    fn parse(&self, body: &[u8], captured_at: DateTime<Utc>) -> MarketDataResult<PriceSnapshot>;
}

/// The active adapter of a container, identified by provider and captured parameters.
///
/// Two equal kinds produce interchangeable adapters, so a container only
/// rebuilds its adapter when the configured kind changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKind {
    CoinGecko { vs_currency: String },
    YahooFinance,
    AlphaVantage,
    FinancialModelingPrep,
    SinaFinance,
    TencentFinance,
    Frankfurter { base: String },
    ExchangeRateApi { base: String },
}

impl SourceKind {
    pub const PROVIDER_IDS: [&'static str; 8] = [
        "coingecko",
        "yahoo_finance",
        "alpha_vantage",
        "financial_modeling_prep",
        "sina_finance",
        "tencent_finance",
        "frankfurter",
        "exchangerate_api",
    ];

    /// Resolves a configuration row to an adapter kind for its domain.
    pub fn from_config(config: &ExternalDataSourceConfig) -> MarketDataResult<Self> {
        let provider = config.provider.trim().to_ascii_lowercase();
        let base = config
            .base_currency
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase);

        let kind = match provider.as_str() {
            "coingecko" => Self::CoinGecko {
                vs_currency: base.unwrap_or_else(|| "USD".to_string()).to_lowercase(),
            },
            "yahoo_finance" | "yahoo" => Self::YahooFinance,
            "alpha_vantage" | "alphavantage" => Self::AlphaVantage,
            "financial_modeling_prep" | "fmp" => Self::FinancialModelingPrep,
            "sina_finance" | "sina" => Self::SinaFinance,
            "tencent_finance" | "tencent" => Self::TencentFinance,
            "frankfurter" | "ecb" => Self::Frankfurter {
                base: base.unwrap_or_else(|| "EUR".to_string()),
            },
            "exchangerate_api" | "open_er_api" => Self::ExchangeRateApi {
                base: base.unwrap_or_else(|| "USD".to_string()),
            },
            other => {
                return Err(MarketDataError::ConfigInvalid(format!(
                    "unknown provider '{other}'"
                )))
            }
        };

        if kind.domain() != config.domain {
            return Err(MarketDataError::ConfigInvalid(format!(
                "provider '{}' serves {} data, not {}",
                kind.provider_id(),
                kind.domain(),
                config.domain
            )));
        }

        Ok(kind)
    }

    pub fn provider_id(&self) -> &'static str {
        match self {
            Self::CoinGecko { .. } => "coingecko",
            Self::YahooFinance => "yahoo_finance",
            Self::AlphaVantage => "alpha_vantage",
            Self::FinancialModelingPrep => "financial_modeling_prep",
            Self::SinaFinance => "sina_finance",
            Self::TencentFinance => "tencent_finance",
            Self::Frankfurter { .. } => "frankfurter",
            Self::ExchangeRateApi { .. } => "exchangerate_api",
        }
    }

    pub fn domain(&self) -> DataDomain {
        match self {
            Self::CoinGecko { .. } => DataDomain::Crypto,
            Self::YahooFinance
            | Self::AlphaVantage
            | Self::FinancialModelingPrep
            | Self::SinaFinance
            | Self::TencentFinance => DataDomain::Stock,
            Self::Frankfurter { .. } | Self::ExchangeRateApi { .. } => DataDomain::ExchangeRate,
        }
    }

    /// Whether the provider refuses to serve requests without an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::AlphaVantage | Self::FinancialModelingPrep)
    }
}

/// Builds adapters for a [`SourceKind`], optionally pointing them at other endpoints.
#[derive(Debug, Clone, Default)]
pub struct SourceFactory {
    endpoint_overrides: Vec<(&'static str, String)>,
}

impl SourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the API base URL for one provider id. Used for mirrors and tests.
    pub fn with_endpoint(mut self, provider_id: &'static str, base_url: impl Into<String>) -> Self {
        self.endpoint_overrides.retain(|(id, _)| *id != provider_id);
        self.endpoint_overrides.push((provider_id, base_url.into()));
        self
    }

    fn endpoint(&self, provider_id: &str) -> Option<&str> {
        self.endpoint_overrides
            .iter()
            .find(|(id, _)| *id == provider_id)
            .map(|(_, url)| url.as_str())
    }

    pub fn create(&self, kind: &SourceKind) -> Arc<dyn QuoteSource> {
        let endpoint = self.endpoint(kind.provider_id());
        match kind {
            SourceKind::CoinGecko { vs_currency } => {
                let mut source = CoinGeckoSource::new().with_vs_currency(vs_currency);
                if let Some(url) = endpoint {
                    source = source.with_base_url(url);
                }
                Arc::new(source)
            }
            SourceKind::YahooFinance => {
                let mut source = YahooFinanceSource::new();
                if let Some(url) = endpoint {
                    source = source.with_base_url(url);
                }
                Arc::new(source)
            }
            SourceKind::AlphaVantage => {
                let mut source = AlphaVantageSource::new();
                if let Some(url) = endpoint {
                    source = source.with_base_url(url);
                }
                Arc::new(source)
            }
            SourceKind::FinancialModelingPrep => {
                let mut source = FinancialModelingPrepSource::new();
                if let Some(url) = endpoint {
                    source = source.with_base_url(url);
                }
                Arc::new(source)
            }
            SourceKind::SinaFinance => {
                let mut source = SinaFinanceSource::new();
                if let Some(url) = endpoint {
                    source = source.with_base_url(url);
                }
                Arc::new(source)
            }
            SourceKind::TencentFinance => {
                let mut source = TencentFinanceSource::new();
                if let Some(url) = endpoint {
                    source = source.with_base_url(url);
                }
                Arc::new(source)
            }
            SourceKind::Frankfurter { base } => {
                let mut source = FrankfurterSource::new().with_base_currency(base);
                if let Some(url) = endpoint {
                    source = source.with_base_url(url);
                }
                Arc::new(source)
            }
            SourceKind::ExchangeRateApi { base } => {
                let mut source = ExchangeRateApiSource::new().with_base_currency(base);
                if let Some(url) = endpoint {
                    source = source.with_base_url(url);
                }
                Arc::new(source)
            }
        }
    }
}

/// Quote currency implied by an exchange suffix on a stock symbol.
pub fn currency_for_symbol(symbol: &str) -> &'static str {
    let upper = symbol.to_ascii_uppercase();
    if upper.ends_with(".HK") {
        "HKD"
    } else if upper.ends_with(".SS") || upper.ends_with(".SZ") {
        "CNY"
    } else {
        "USD"
    }
}

/// Shortest decimal rendering of a provider float, never in exponent form.
pub fn format_price(value: f64) -> String {
    value.to_string()
}

/// Uppercased, trimmed, non-empty symbols in request order.
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A short prefix of a response body for log lines.
pub(crate) fn body_excerpt(body: &[u8]) -> String {
    const MAX: usize = 512;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX {
        text.into_owned()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_heuristic() {
        assert_eq!(currency_for_symbol("0700.HK"), "HKD");
        assert_eq!(currency_for_symbol("600519.ss"), "CNY");
        assert_eq!(currency_for_symbol("000001.SZ"), "CNY");
        assert_eq!(currency_for_symbol("AAPL"), "USD");
    }

    #[test]
    fn format_price_avoids_exponents() {
        assert_eq!(format_price(150.25), "150.25");
        assert_eq!(format_price(60000.0), "60000");
        assert_eq!(format_price(0.00001234), "0.00001234");
    }

    #[test]
    fn unknown_provider_is_config_invalid() {
        let config = ExternalDataSourceConfig::new(DataDomain::Stock, "bloomberg");
        assert!(matches!(
            SourceKind::from_config(&config),
            Err(MarketDataError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn provider_must_match_domain() {
        let config = ExternalDataSourceConfig::new(DataDomain::Crypto, "yahoo_finance");
        assert!(matches!(
            SourceKind::from_config(&config),
            Err(MarketDataError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn kinds_capture_base_currency() -> anyhow::Result<()> {
        let config = ExternalDataSourceConfig::new(DataDomain::ExchangeRate, "frankfurter")
            .with_base_currency("usd");
        assert_eq!(
            SourceKind::from_config(&config)?,
            SourceKind::Frankfurter { base: "USD".into() }
        );

        let config = ExternalDataSourceConfig::new(DataDomain::Crypto, "CoinGecko");
        assert_eq!(
            SourceKind::from_config(&config)?,
            SourceKind::CoinGecko { vs_currency: "usd".into() }
        );
        Ok(())
    }

    #[test]
    fn every_provider_id_round_trips() -> anyhow::Result<()> {
        for id in SourceKind::PROVIDER_IDS {
            let domain = DataDomain::ALL
                .into_iter()
                .find(|domain| {
                    SourceKind::from_config(&ExternalDataSourceConfig::new(*domain, id)).is_ok()
                })
                .ok_or_else(|| anyhow::anyhow!("no domain accepts {id}"))?;
            let kind = SourceKind::from_config(&ExternalDataSourceConfig::new(domain, id))?;
            assert_eq!(kind.provider_id(), id);
        }
        Ok(())
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let body = "x".repeat(2000);
        let excerpt = body_excerpt(body.as_bytes());
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.len(), 515);
    }
}
