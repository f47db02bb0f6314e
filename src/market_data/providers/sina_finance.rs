//! Sina Finance stock quote provider.
//!
//! The response is not JSON but a series of JavaScript assignments:
//!
//! ```text
//! var hq_str_gb_aapl="Apple,189.84,...";
//! var hq_str_hk00700="TENCENT,...";
//! ```
//!
//! The variable suffix encodes the market, so symbols are mapped to a market
//! prefix on the way out and back on the way in.

use chrono::{DateTime, Utc};

use crate::market_data::sources::{format_price, normalize_symbols};
use crate::market_data::{
    MarketDataError, MarketDataResult, PriceSnapshot, QuotePrice, QuoteRequest, QuoteSource,
};

use super::BROWSER_USER_AGENT;

const SINA_API_BASE: &str = "http://hq.sinajs.cn";
const SINA_REFERENCE_URL: &str = "https://finance.sina.com.cn/";
const SINA_REFERER: &str = "https://finance.sina.com.cn/";
const NAME: &str = "Sina Finance";

pub struct SinaFinanceSource {
    base_url: String,
}

impl SinaFinanceSource {
    pub fn new() -> Self {
        Self {
            base_url: SINA_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `0700.HK` -> `hk0700`, `600519.SS` -> `sh600519`, `AAPL` -> `gb_aapl`.
    fn to_sina_code(symbol: &str) -> String {
        if let Some(code) = symbol.strip_suffix(".HK") {
            format!("hk{code}")
        } else if let Some(code) = symbol.strip_suffix(".SS") {
            format!("sh{code}")
        } else if let Some(code) = symbol.strip_suffix(".SZ") {
            format!("sz{code}")
        } else {
            format!("gb_{}", symbol.to_lowercase())
        }
    }

    /// Inverse of [`Self::to_sina_code`], yielding the symbol and its currency.
    fn from_sina_code(code: &str) -> Option<(String, &'static str)> {
        if let Some(rest) = code.strip_prefix("gb_") {
            Some((rest.to_uppercase(), "USD"))
        } else if let Some(rest) = code.strip_prefix("hk") {
            Some((format!("{}.HK", rest.to_uppercase()), "HKD"))
        } else if let Some(rest) = code.strip_prefix("sh") {
            Some((format!("{rest}.SS"), "CNY"))
        } else if let Some(rest) = code.strip_prefix("sz") {
            Some((format!("{rest}.SZ"), "CNY"))
        } else {
            None
        }
    }

    fn parse_line(line: &str) -> Option<QuotePrice> {
        let (_, after) = line.split_once("hq_str_")?;
        let (code, _) = after.split_once('=')?;
        let start = line.find('"')?;
        let end = line.rfind('"')?;
        if end <= start {
            return None;
        }

        let fields: Vec<&str> = line[start + 1..end].split(',').collect();
        let price: f64 = fields.get(1)?.trim().parse().ok()?;
        let (symbol, currency) = Self::from_sina_code(code.trim())?;
        Some(QuotePrice::new(symbol, format_price(price)).with_currency(currency))
    }
}

impl Default for SinaFinanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for SinaFinanceSource {
    fn name(&self) -> &str {
        NAME
    }

    fn build_requests(
        &self,
        symbols: &[String],
        _api_key: Option<&str>,
    ) -> MarketDataResult<Vec<QuoteRequest>> {
        let codes: Vec<String> = normalize_symbols(symbols)
            .iter()
            .map(|s| Self::to_sina_code(s))
            .collect();
        if codes.is_empty() {
            return Err(MarketDataError::invalid_symbol(NAME, symbols));
        }

        let url = format!("{}/list={}", self.base_url, codes.join(","));
        Ok(vec![QuoteRequest::get(url)
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Referer", SINA_REFERER)])
    }

    fn parse(&self, body: &[u8], captured_at: DateTime<Utc>) -> MarketDataResult<PriceSnapshot> {
        let text = String::from_utf8_lossy(body);
        let prices: Vec<QuotePrice> = text
            .split(';')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(Self::parse_line)
            .collect();

        if prices.is_empty() {
            return Err(MarketDataError::parse(NAME, "no prices in response"));
        }

        Ok(PriceSnapshot::new(NAME, SINA_REFERENCE_URL, captured_at, "USD").with_prices(prices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_markets_to_prefixes() -> anyhow::Result<()> {
        let requests = SinaFinanceSource::new().build_requests(
            &["aapl".into(), "0700.hk".into(), "600519.SS".into(), "000001.SZ".into()],
            None,
        )?;
        assert_eq!(
            requests[0].url,
            "http://hq.sinajs.cn/list=gb_aapl,hk0700,sh600519,sz000001"
        );
        assert!(requests[0]
            .headers
            .contains(&("Referer".to_string(), SINA_REFERER.to_string())));
        Ok(())
    }

    #[test]
    fn parses_assignment_lines() -> anyhow::Result<()> {
        let body = concat!(
            "var hq_str_gb_aapl=\"Apple,189.8400,0.52,2024-05-10\";\n",
            "var hq_str_hk0700=\"TENCENT,366.200,1.2\";\n",
            "var hq_str_sh600519=\"Moutai,1715.00,1720.00\";\n",
            "var hq_str_gb_bogus=\"\";\n"
        );
        let snapshot = SinaFinanceSource::new().parse(body.as_bytes(), Utc::now())?;
        assert_eq!(
            snapshot.prices,
            vec![
                QuotePrice::new("0700.HK", "366.2").with_currency("HKD"),
                QuotePrice::new("600519.SS", "1715").with_currency("CNY"),
                QuotePrice::new("AAPL", "189.84").with_currency("USD"),
            ]
        );
        Ok(())
    }

    #[test]
    fn body_without_prices_is_parse_error() {
        let err = SinaFinanceSource::new()
            .parse(b"var hq_str_gb_zzzz=\"\";", Utc::now())
            .unwrap_err();
        assert!(matches!(err, MarketDataError::Parse { .. }));
    }
}
