//! ExchangeRate-API open access endpoint (`open.er-api.com`).
//!
//! Updated once a day and requires no key. Failures are reported in-band with
//! `"result": "error"`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::market_data::sources::format_price;
use crate::market_data::{
    MarketDataError, MarketDataResult, PriceSnapshot, QuotePrice, QuoteRequest, QuoteSource,
};

const ER_API_BASE: &str = "https://open.er-api.com";
const ER_API_REFERENCE_URL: &str = "https://www.exchangerate-api.com/";
const NAME: &str = "ExchangeRate-API";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(default)]
    base_code: Option<String>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

pub struct ExchangeRateApiSource {
    base_url: String,
    base_currency: String,
}

impl ExchangeRateApiSource {
    pub fn new() -> Self {
        Self {
            base_url: ER_API_BASE.to_string(),
            base_currency: "USD".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_base_currency(mut self, currency: impl Into<String>) -> Self {
        self.base_currency = currency.into().to_uppercase();
        self
    }
}

impl Default for ExchangeRateApiSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for ExchangeRateApiSource {
    fn name(&self) -> &str {
        NAME
    }

    fn build_requests(
        &self,
        _symbols: &[String],
        _api_key: Option<&str>,
    ) -> MarketDataResult<Vec<QuoteRequest>> {
        let url = format!("{}/v6/latest/{}", self.base_url, self.base_currency);
        Ok(vec![QuoteRequest::get(url)])
    }

    fn parse(&self, body: &[u8], captured_at: DateTime<Utc>) -> MarketDataResult<PriceSnapshot> {
        let response: LatestResponse = serde_json::from_slice(body)
            .map_err(|err| MarketDataError::parse(NAME, err.to_string()))?;

        if response.result != "success" {
            let reason = response.error_type.unwrap_or(response.result);
            return Err(MarketDataError::parse(NAME, reason));
        }
        if response.rates.is_empty() {
            return Err(MarketDataError::parse(NAME, "no rates in response"));
        }

        let base = response
            .base_code
            .map(|b| b.to_uppercase())
            .unwrap_or_else(|| self.base_currency.clone());
        let prices = response
            .rates
            .into_iter()
            .map(|(code, rate)| QuotePrice::new(code.to_uppercase(), format_price(rate)))
            .collect();

        Ok(PriceSnapshot::new(NAME, ER_API_REFERENCE_URL, captured_at, base).with_prices(prices))
    }
}
