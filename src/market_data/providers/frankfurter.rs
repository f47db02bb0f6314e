//! Frankfurter exchange-rate provider using ECB daily reference rates.
//!
//! ECB publishes rates against EUR; Frankfurter rebases them when asked via
//! `from=`, so the snapshot base is whatever the configuration requests.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::market_data::sources::format_price;
use crate::market_data::{
    MarketDataError, MarketDataResult, PriceSnapshot, QuotePrice, QuoteRequest, QuoteSource,
};

const FRANKFURTER_BASE_URL: &str = "https://api.frankfurter.app";
const FRANKFURTER_REFERENCE_URL: &str = "https://www.frankfurter.app/";
const NAME: &str = "Frankfurter";

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    /// The amount (always 1 for our requests).
    #[allow(dead_code)]
    amount: f64,
    base: String,
    #[allow(dead_code)]
    date: NaiveDate,
    /// Map of currency codes to units per one `base`.
    rates: HashMap<String, f64>,
}

pub struct FrankfurterSource {
    base_url: String,
    base_currency: String,
}

impl FrankfurterSource {
    pub fn new() -> Self {
        Self {
            base_url: FRANKFURTER_BASE_URL.to_string(),
            base_currency: "EUR".to_string(),
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

impl Default for FrankfurterSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for FrankfurterSource {
    fn name(&self) -> &str {
        NAME
    }

    /// The full rate table is always requested; symbols are ignored.
    fn build_requests(
        &self,
        _symbols: &[String],
        _api_key: Option<&str>,
    ) -> MarketDataResult<Vec<QuoteRequest>> {
        let url = format!("{}/latest?from={}", self.base_url, self.base_currency);
        Ok(vec![QuoteRequest::get(url).header("Accept", "application/json")])
    }

    fn parse(&self, body: &[u8], captured_at: DateTime<Utc>) -> MarketDataResult<PriceSnapshot> {
        let response: FrankfurterResponse = serde_json::from_slice(body)
            .map_err(|err| MarketDataError::parse(NAME, err.to_string()))?;

        if response.rates.is_empty() {
            return Err(MarketDataError::parse(NAME, "no rates in response"));
        }

        let prices = response
            .rates
            .into_iter()
            .map(|(code, rate)| QuotePrice::new(code.to_uppercase(), format_price(rate)))
            .collect();

        Ok(PriceSnapshot::new(
            NAME,
            FRANKFURTER_REFERENCE_URL,
            captured_at,
            response.base.to_uppercase(),
        )
        .with_prices(prices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_full_table_for_base() -> anyhow::Result<()> {
        let source = FrankfurterSource::new().with_base_currency("usd");
        let requests = source.build_requests(&[], None)?;
        assert_eq!(requests[0].url, "https://api.frankfurter.app/latest?from=USD");
        Ok(())
    }

    #[test]
    fn parses_rates() -> anyhow::Result<()> {
        let body = br#"{"amount":1.0,"base":"EUR","date":"2024-05-10","rates":{"USD":1.08,"JPY":167.5}}"#;
        let snapshot = FrankfurterSource::new().parse(body, Utc::now())?;
        assert_eq!(snapshot.base_currency, "EUR");
        assert_eq!(
            snapshot.prices,
            vec![QuotePrice::new("JPY", "167.5"), QuotePrice::new("USD", "1.08")]
        );
        Ok(())
    }

    #[test]
    fn empty_rates_is_parse_error() {
        let body = br#"{"amount":1.0,"base":"EUR","date":"2024-05-10","rates":{}}"#;
        assert!(FrankfurterSource::new().parse(body, Utc::now()).is_err());
    }
}
