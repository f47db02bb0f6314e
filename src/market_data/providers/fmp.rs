//! Financial Modeling Prep stock quote provider.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;

use crate::market_data::sources::{currency_for_symbol, format_price, normalize_symbols};
use crate::market_data::{
    MarketDataError, MarketDataResult, PriceSnapshot, QuotePrice, QuoteRequest, QuoteSource,
};

const FMP_API_BASE: &str = "https://financialmodelingprep.com";
const FMP_REFERENCE_URL: &str = "https://site.financialmodelingprep.com/";
const NAME: &str = "Financial Modeling Prep";

/// FMP has shipped both capitalizations of these fields.
#[derive(Debug, Deserialize)]
struct FmpQuote {
    #[serde(alias = "Symbol", default)]
    symbol: String,
    #[serde(alias = "Price")]
    price: Option<f64>,
    #[serde(alias = "Currency")]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FmpResponse {
    Quotes(Vec<FmpQuote>),
    Error {
        #[serde(rename = "Error Message", alias = "message")]
        message: String,
    },
}

pub struct FinancialModelingPrepSource {
    base_url: String,
}

impl FinancialModelingPrepSource {
    pub fn new() -> Self {
        Self {
            base_url: FMP_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for FinancialModelingPrepSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for FinancialModelingPrepSource {
    fn name(&self) -> &str {
        NAME
    }

    fn build_requests(
        &self,
        symbols: &[String],
        api_key: Option<&str>,
    ) -> MarketDataResult<Vec<QuoteRequest>> {
        let api_key = api_key.ok_or_else(|| {
            MarketDataError::ConfigInvalid("Financial Modeling Prep requires an API key".to_string())
        })?;

        let symbols_upper = normalize_symbols(symbols);
        if symbols_upper.is_empty() {
            return Err(MarketDataError::invalid_symbol(NAME, symbols));
        }

        let invalid_url = |err: String| MarketDataError::ConfigInvalid(format!("{NAME} URL: {err}"));
        let mut url = Url::parse(&format!("{}/api/v3/quote", self.base_url))
            .map_err(|err| invalid_url(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid_url("base URL cannot carry a path".to_string()))?
            .push(&symbols_upper.join(","));
        url.query_pairs_mut().append_pair("apikey", api_key);
        Ok(vec![QuoteRequest::get(url.to_string())])
    }

    fn parse(&self, body: &[u8], captured_at: DateTime<Utc>) -> MarketDataResult<PriceSnapshot> {
        let response: FmpResponse = serde_json::from_slice(body)
            .map_err(|err| MarketDataError::parse(NAME, err.to_string()))?;

        let quotes = match response {
            FmpResponse::Quotes(quotes) => quotes,
            FmpResponse::Error { message } => return Err(MarketDataError::parse(NAME, message)),
        };

        let prices: Vec<QuotePrice> = quotes
            .into_iter()
            .filter(|q| !q.symbol.is_empty())
            .filter_map(|quote| {
                let price = quote.price.filter(|p| p.is_finite() && *p != 0.0)?;
                let symbol = quote.symbol.to_uppercase();
                let currency = quote
                    .currency
                    .filter(|c| !c.is_empty())
                    .map(|c| c.to_uppercase())
                    .unwrap_or_else(|| currency_for_symbol(&symbol).to_string());
                Some(QuotePrice::new(symbol, format_price(price)).with_currency(currency))
            })
            .collect();

        if prices.is_empty() {
            return Err(MarketDataError::parse(NAME, "no valid quotes"));
        }

        Ok(PriceSnapshot::new(NAME, FMP_REFERENCE_URL, captured_at, "USD").with_prices(prices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_batched_path() -> anyhow::Result<()> {
        let requests = FinancialModelingPrepSource::new()
            .build_requests(&["aapl".into(), " msft ".into()], Some("k3y"))?;
        assert_eq!(
            requests,
            vec![QuoteRequest::get(
                "https://financialmodelingprep.com/api/v3/quote/AAPL,MSFT?apikey=k3y"
            )]
        );
        Ok(())
    }

    #[test]
    fn parses_quote_array_with_either_casing() -> anyhow::Result<()> {
        let body = br#"[{"symbol":"AAPL","price":189.84,"currency":"USD"},{"Symbol":"0700.HK","Price":301.2}]"#;
        let snapshot = FinancialModelingPrepSource::new().parse(body, Utc::now())?;
        assert_eq!(
            snapshot.prices,
            vec![
                QuotePrice::new("0700.HK", "301.2").with_currency("HKD"),
                QuotePrice::new("AAPL", "189.84").with_currency("USD"),
            ]
        );
        Ok(())
    }

    #[test]
    fn query_values_are_encoded() -> anyhow::Result<()> {
        let requests = FinancialModelingPrepSource::new()
            .build_requests(&["brk/b".into()], Some("a&b#c"))?;
        assert_eq!(
            requests,
            vec![QuoteRequest::get(
                "https://financialmodelingprep.com/api/v3/quote/BRK%2FB?apikey=a%26b%23c"
            )]
        );
        Ok(())
    }

    #[test]
    fn quotes_without_price_are_dropped() -> anyhow::Result<()> {
        let body = br#"[{"symbol":"AAPL","price":189.84},{"symbol":"DEAD","price":null},{"symbol":"ZERO","price":0}]"#;
        let snapshot = FinancialModelingPrepSource::new().parse(body, Utc::now())?;
        assert_eq!(
            snapshot.prices,
            vec![QuotePrice::new("AAPL", "189.84").with_currency("USD")]
        );

        let err = FinancialModelingPrepSource::new()
            .parse(br#"[{"symbol":"DEAD"}]"#, Utc::now())
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Parse { .. }));
        Ok(())
    }

    #[test]
    fn error_object_is_parse_error() {
        let body = br#"{"Error Message":"Invalid API KEY."}"#;
        let err = FinancialModelingPrepSource::new()
            .parse(body, Utc::now())
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Parse { .. }));
    }

    #[test]
    fn empty_list_is_parse_error() {
        let err = FinancialModelingPrepSource::new()
            .parse(b"[]", Utc::now())
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Parse { .. }));
    }
}
