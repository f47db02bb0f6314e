//! Yahoo Finance stock quote provider.
//!
//! The quote API needs a session: a cookie from `fc.yahoo.com` and a crumb
//! token obtained with that cookie. The pair is cached for a day, separately
//! from any price cache.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::market_data::sources::{currency_for_symbol, format_price, normalize_symbols};
use crate::market_data::{
    DataDomain, MarketDataError, MarketDataResult, PriceSnapshot, QuotePrice, QuoteRequest,
    QuoteSource,
};

use super::BROWSER_USER_AGENT;

const YAHOO_QUOTE_BASE: &str = "https://query1.finance.yahoo.com";
const YAHOO_COOKIE_URL: &str = "https://fc.yahoo.com";
const YAHOO_REFERENCE_URL: &str = "https://finance.yahoo.com/";
const NAME: &str = "Yahoo Finance";
const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEnvelope {
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<YahooQuote>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    regular_market_price: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Clone)]
struct Session {
    cookie: String,
    crumb: String,
    acquired_at: Instant,
}

impl Session {
    fn is_valid(&self) -> bool {
        self.acquired_at.elapsed() < SESSION_TTL
    }
}

pub struct YahooFinanceSource {
    quote_base: String,
    cookie_url: String,
    session: RwLock<Option<Session>>,
}

impl YahooFinanceSource {
    pub fn new() -> Self {
        Self {
            quote_base: YAHOO_QUOTE_BASE.to_string(),
            cookie_url: YAHOO_COOKIE_URL.to_string(),
            session: RwLock::new(None),
        }
    }

    /// Points both the cookie and the API calls at one host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        self.cookie_url = format!("{base}/");
        self.quote_base = base;
        self
    }

    fn current_session(&self) -> Option<Session> {
        let guard = self.session.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().filter(|s| s.is_valid()).cloned()
    }

    fn fetch_failed() -> MarketDataError {
        MarketDataError::RemoteFetchFailed {
            domain: DataDomain::Stock,
            provider: NAME.to_string(),
        }
    }

    async fn acquire_session(&self, client: &Client) -> MarketDataResult<Session> {
        // fc.yahoo.com usually answers 404 but still sets the cookie.
        let response = client
            .get(&self.cookie_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|err| {
                error!(url = %self.cookie_url, error = %err, "Yahoo cookie request failed");
                Self::fetch_failed()
            })?;

        let cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .collect::<Vec<_>>()
            .join("; ");

        let crumb_url = format!("{}/v1/test/getcrumb", self.quote_base);
        let response = client
            .get(&crumb_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(COOKIE, cookie.as_str())
            .send()
            .await
            .map_err(|err| {
                error!(url = %crumb_url, error = %err, "Yahoo crumb request failed");
                Self::fetch_failed()
            })?;

        let status = response.status();
        let crumb = response.text().await.unwrap_or_default();
        let crumb = crumb.trim();
        if status != StatusCode::OK || crumb.is_empty() {
            error!(url = %crumb_url, status = %status, "Yahoo crumb unavailable");
            return Err(Self::fetch_failed());
        }

        debug!("acquired Yahoo Finance session");
        Ok(Session {
            cookie,
            crumb: crumb.to_string(),
            acquired_at: Instant::now(),
        })
    }
}

impl Default for YahooFinanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for YahooFinanceSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn prepare(&self, client: &Client) -> MarketDataResult<()> {
        if self.current_session().is_some() {
            return Ok(());
        }

        let fresh = self.acquire_session(client).await?;

        let mut guard = self.session.write().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().is_none_or(|s| !s.is_valid()) {
            *guard = Some(fresh);
        }
        Ok(())
    }

    fn on_unauthorized(&self) {
        warn!("Yahoo Finance rejected the session crumb; it will be renewed on the next fetch");
        let mut guard = self.session.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    fn build_requests(
        &self,
        symbols: &[String],
        _api_key: Option<&str>,
    ) -> MarketDataResult<Vec<QuoteRequest>> {
        let symbols_upper = normalize_symbols(symbols);
        if symbols_upper.is_empty() {
            return Err(MarketDataError::invalid_symbol(NAME, symbols));
        }

        let session = self.current_session();
        let mut params = vec![
            ("symbols", symbols_upper.join(",")),
            ("fields", "symbol,regularMarketPrice,currency".to_string()),
        ];
        if let Some(session) = &session {
            params.push(("crumb", session.crumb.clone()));
        }

        let url = Url::parse_with_params(&format!("{}/v7/finance/quote", self.quote_base), &params)
            .map_err(|err| MarketDataError::ConfigInvalid(format!("Yahoo quote URL: {err}")))?;

        let mut request = QuoteRequest::get(url.to_string()).header("User-Agent", BROWSER_USER_AGENT);
        if let Some(session) = session {
            request = request.header("Cookie", session.cookie);
        }
        Ok(vec![request])
    }

    fn parse(&self, body: &[u8], captured_at: DateTime<Utc>) -> MarketDataResult<PriceSnapshot> {
        let envelope: QuoteEnvelope = serde_json::from_slice(body)
            .map_err(|err| MarketDataError::parse(NAME, err.to_string()))?;

        if let Some(err) = envelope.quote_response.error.filter(|e| !e.is_null()) {
            return Err(MarketDataError::parse(NAME, err.to_string()));
        }

        let prices = envelope
            .quote_response
            .result
            .into_iter()
            .filter_map(|quote| {
                let price = quote.regular_market_price?;
                let symbol = quote.symbol.to_uppercase();
                let currency = quote
                    .currency
                    .filter(|c| !c.is_empty())
                    .map(|c| c.to_uppercase())
                    .unwrap_or_else(|| currency_for_symbol(&symbol).to_string());
                Some(QuotePrice::new(symbol, format_price(price)).with_currency(currency))
            })
            .collect();

        Ok(PriceSnapshot::new(NAME, YAHOO_REFERENCE_URL, captured_at, "USD").with_prices(prices))
    }
}
