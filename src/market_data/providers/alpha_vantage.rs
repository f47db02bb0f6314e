//! Alpha Vantage stock quote provider.
//!
//! `GLOBAL_QUOTE` answers one symbol per call, so a batch becomes one request
//! per symbol and the executor merges the results. Error and rate-limit
//! notices come back with HTTP 200 and must be detected in the body.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::market_data::sources::{currency_for_symbol, normalize_symbols};
use crate::market_data::{
    MarketDataError, MarketDataResult, PriceSnapshot, QuotePrice, QuoteRequest, QuoteSource,
};

const ALPHA_VANTAGE_API_BASE: &str = "https://www.alphavantage.co";
const ALPHA_VANTAGE_REFERENCE_URL: &str = "https://www.alphavantage.co/";
const NAME: &str = "Alpha Vantage";

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol", default)]
    symbol: String,
    #[serde(rename = "05. price", default)]
    price: String,
    #[serde(rename = "07. latest trading day")]
    #[allow(dead_code)]
    latest_trading_day: Option<String>,
}

pub struct AlphaVantageSource {
    base_url: String,
}

impl AlphaVantageSource {
    pub fn new() -> Self {
        Self {
            base_url: ALPHA_VANTAGE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for AlphaVantageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for AlphaVantageSource {
    fn name(&self) -> &str {
        NAME
    }

    fn build_requests(
        &self,
        symbols: &[String],
        api_key: Option<&str>,
    ) -> MarketDataResult<Vec<QuoteRequest>> {
        let api_key = api_key.ok_or_else(|| {
            MarketDataError::ConfigInvalid("Alpha Vantage requires an API key".to_string())
        })?;

        let symbols_upper = normalize_symbols(symbols);
        if symbols_upper.is_empty() {
            return Err(MarketDataError::invalid_symbol(NAME, symbols));
        }

        symbols_upper
            .iter()
            .map(|symbol| {
                let url = Url::parse_with_params(
                    &format!("{}/query", self.base_url),
                    &[
                        ("function", "GLOBAL_QUOTE"),
                        ("symbol", symbol.as_str()),
                        ("apikey", api_key),
                    ],
                )
                .map_err(|err| MarketDataError::ConfigInvalid(format!("Alpha Vantage URL: {err}")))?;
                Ok(QuoteRequest::get(url.to_string()))
            })
            .collect()
    }

    fn parse(&self, body: &[u8], captured_at: DateTime<Utc>) -> MarketDataResult<PriceSnapshot> {
        let response: GlobalQuoteResponse = serde_json::from_slice(body)
            .map_err(|err| MarketDataError::parse(NAME, err.to_string()))?;

        let quote = response
            .global_quote
            .filter(|q| !q.symbol.is_empty());

        let Some(quote) = quote else {
            let message = response
                .error_message
                .or(response.information)
                .or(response.note)
                .unwrap_or_else(|| "empty Global Quote".to_string());
            return Err(MarketDataError::parse(NAME, message));
        };

        let price = quote.price.trim();
        if !Decimal::from_str(price).is_ok_and(|p| !p.is_zero()) {
            return Err(MarketDataError::parse(
                NAME,
                format!("no valid quotes for {}", quote.symbol),
            ));
        }

        let symbol = quote.symbol.to_uppercase();
        let currency = currency_for_symbol(&symbol);

        Ok(
            PriceSnapshot::new(NAME, ALPHA_VANTAGE_REFERENCE_URL, captured_at, currency)
                .with_prices(vec![QuotePrice::new(symbol, price).with_currency(currency)]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_request_per_symbol() -> anyhow::Result<()> {
        let source = AlphaVantageSource::new();
        let requests =
            source.build_requests(&["ibm".into(), "0700.HK".into()], Some("demo"))?;
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].url,
            "https://www.alphavantage.co/query?function=GLOBAL_QUOTE&symbol=IBM&apikey=demo"
        );
        assert!(requests[1].url.contains("symbol=0700.HK"));
        Ok(())
    }

    #[test]
    fn missing_api_key_is_config_invalid() {
        let err = AlphaVantageSource::new()
            .build_requests(&["IBM".into()], None)
            .unwrap_err();
        assert!(matches!(err, MarketDataError::ConfigInvalid(_)));
    }

    #[test]
    fn parses_global_quote() -> anyhow::Result<()> {
        let body = br#"{"Global Quote":{"01. symbol":"IBM","02. open":"181.0","05. price":"182.5300","07. latest trading day":"2024-05-10"}}"#;
        let snapshot = AlphaVantageSource::new().parse(body, Utc::now())?;
        assert_eq!(
            snapshot.prices,
            vec![QuotePrice::new("IBM", "182.5300").with_currency("USD")]
        );
        assert_eq!(snapshot.base_currency, "USD");
        Ok(())
    }

    #[test]
    fn rate_limit_note_is_parse_error() {
        let body = br#"{"Note":"Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        let err = AlphaVantageSource::new().parse(body, Utc::now()).unwrap_err();
        match err {
            MarketDataError::Parse { message, .. } => assert!(message.contains("5 calls per minute")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_or_zero_price_is_parse_error() {
        for price in ["", "0.0000", "n/a"] {
            let body = format!(r#"{{"Global Quote":{{"01. symbol":"600519.SS","05. price":"{price}"}}}}"#);
            let err = AlphaVantageSource::new()
                .parse(body.as_bytes(), Utc::now())
                .unwrap_err();
            assert!(matches!(err, MarketDataError::Parse { .. }), "{price:?}");
        }
    }

    #[test]
    fn suffix_sets_currency() -> anyhow::Result<()> {
        let body = br#"{"Global Quote":{"01. symbol":"600519.SS","05. price":"1650.00"}}"#;
        let snapshot = AlphaVantageSource::new().parse(body, Utc::now())?;
        assert_eq!(snapshot.base_currency, "CNY");
        assert_eq!(snapshot.prices[0].price, "1650.00");
        Ok(())
    }
}
