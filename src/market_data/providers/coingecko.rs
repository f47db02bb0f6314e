//! CoinGecko crypto price provider.
//!
//! Uses the free `/simple/price` endpoint, which quotes many coins in one
//! request. No API key is required, though rate limits apply.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::market_data::sources::{format_price, normalize_symbols};
use crate::market_data::{
    MarketDataError, MarketDataResult, PriceSnapshot, QuotePrice, QuoteRequest, QuoteSource,
};

const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
const COINGECKO_REFERENCE_URL: &str = "https://www.coingecko.com/";
const NAME: &str = "CoinGecko";

/// Built-in symbol to CoinGecko coin id mappings.
const COIN_IDS: [(&str, &str); 20] = [
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("BNB", "binancecoin"),
    ("SOL", "solana"),
    ("ADA", "cardano"),
    ("XRP", "ripple"),
    ("DOT", "polkadot"),
    ("DOGE", "dogecoin"),
    ("MATIC", "matic-network"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("DAI", "dai"),
    ("LTC", "litecoin"),
    ("BCH", "bitcoin-cash"),
    ("LINK", "chainlink"),
    ("XLM", "stellar"),
    ("UNI", "uniswap"),
    ("ATOM", "cosmos"),
    ("XMR", "monero"),
    ("ETC", "ethereum-classic"),
];

/// `{"bitcoin": {"usd": 60000.0}, ...}`
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

pub struct CoinGeckoSource {
    base_url: String,
    /// Lowercase CoinGecko vs-currency, e.g. "usd".
    vs_currency: String,
}

impl CoinGeckoSource {
    pub fn new() -> Self {
        Self {
            base_url: COINGECKO_API_BASE.to_string(),
            vs_currency: "usd".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_vs_currency(mut self, currency: impl Into<String>) -> Self {
        self.vs_currency = currency.into().to_lowercase();
        self
    }

    pub fn coin_id(symbol: &str) -> Option<&'static str> {
        let upper = symbol.to_ascii_uppercase();
        COIN_IDS
            .iter()
            .find(|(sym, _)| *sym == upper)
            .map(|(_, id)| *id)
    }

    fn symbol_for_id(id: &str) -> Option<&'static str> {
        COIN_IDS
            .iter()
            .find(|(_, coin)| *coin == id)
            .map(|(sym, _)| *sym)
    }

    /// USD quotes are reported against USDT, matching how exchanges list them.
    fn base_currency(&self) -> String {
        if self.vs_currency == "usd" {
            "USDT".to_string()
        } else {
            self.vs_currency.to_uppercase()
        }
    }
}

impl Default for CoinGeckoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for CoinGeckoSource {
    fn name(&self) -> &str {
        NAME
    }

    fn build_requests(
        &self,
        symbols: &[String],
        _api_key: Option<&str>,
    ) -> MarketDataResult<Vec<QuoteRequest>> {
        let mut ids: Vec<&str> = Vec::new();
        for symbol in normalize_symbols(symbols) {
            if let Some(id) = Self::coin_id(&symbol) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        if ids.is_empty() {
            return Err(MarketDataError::invalid_symbol(NAME, symbols));
        }

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            ids.join(","),
            self.vs_currency
        );
        Ok(vec![QuoteRequest::get(url).header("Accept", "application/json")])
    }

    fn parse(&self, body: &[u8], captured_at: DateTime<Utc>) -> MarketDataResult<PriceSnapshot> {
        let data: SimplePriceResponse = serde_json::from_slice(body)
            .map_err(|err| MarketDataError::parse(NAME, err.to_string()))?;

        let prices = data
            .iter()
            .filter_map(|(id, quotes)| {
                let symbol = Self::symbol_for_id(id)?;
                let price = quotes.get(&self.vs_currency)?;
                Some(QuotePrice::new(symbol, format_price(*price)))
            })
            .collect();

        Ok(
            PriceSnapshot::new(NAME, COINGECKO_REFERENCE_URL, captured_at, self.base_currency())
                .with_prices(prices),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_batched_request() -> anyhow::Result<()> {
        let source = CoinGeckoSource::new();
        let requests = source.build_requests(
            &["btc".to_string(), "ETH".to_string(), "NOPE".to_string(), "BTC".to_string()],
            None,
        )?;
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin,ethereum&vs_currencies=usd"
        );
        Ok(())
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        let source = CoinGeckoSource::new();
        let err = source
            .build_requests(&["NOPE".to_string()], None)
            .unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidSymbol { .. }));
        assert!(source.build_requests(&[], None).is_err());
    }

    #[test]
    fn parses_simple_price_body() -> anyhow::Result<()> {
        let source = CoinGeckoSource::new();
        let body = br#"{"bitcoin":{"usd":60000.0},"ethereum":{"usd":3012.5},"mystery":{"usd":1}}"#;
        let snapshot = source.parse(body, Utc::now())?;

        assert_eq!(snapshot.data_source, "CoinGecko");
        assert_eq!(snapshot.base_currency, "USDT");
        assert_eq!(snapshot.prices.len(), 2);
        assert_eq!(snapshot.get("BTC").map(|p| p.price.as_str()), Some("60000"));
        assert_eq!(snapshot.get("ETH").map(|p| p.price.as_str()), Some("3012.5"));
        Ok(())
    }

    #[test]
    fn non_usd_quotes_use_that_base() -> anyhow::Result<()> {
        let source = CoinGeckoSource::new().with_vs_currency("EUR");
        let snapshot = source.parse(br#"{"bitcoin":{"eur":55000.1}}"#, Utc::now())?;
        assert_eq!(snapshot.base_currency, "EUR");
        assert_eq!(snapshot.prices, vec![QuotePrice::new("BTC", "55000.1")]);
        Ok(())
    }

    #[test]
    fn malformed_body_is_parse_error() {
        let source = CoinGeckoSource::new();
        let err = source.parse(b"<html>busy</html>", Utc::now()).unwrap_err();
        assert!(matches!(err, MarketDataError::Parse { .. }));
    }
}
