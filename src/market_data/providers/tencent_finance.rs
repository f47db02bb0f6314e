//! Tencent Finance stock quote provider.
//!
//! Responses are `v_<market><code>="f0~f1~f2~..."` assignments separated by
//! semicolons. Field 2 carries the symbol, field 3 the last price and, on
//! newer payloads, field 34 the quote currency.

use chrono::{DateTime, Utc};

use crate::market_data::sources::{format_price, normalize_symbols};
use crate::market_data::{
    MarketDataError, MarketDataResult, PriceSnapshot, QuotePrice, QuoteRequest, QuoteSource,
};

use super::BROWSER_USER_AGENT;

const TENCENT_API_BASE: &str = "http://qt.gtimg.cn";
const TENCENT_REFERENCE_URL: &str = "https://gu.qq.com/";
const NAME: &str = "Tencent Finance";
const CURRENCY_FIELD: usize = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Market {
    HongKong,
    Shanghai,
    Shenzhen,
    Us,
}

impl Market {
    fn from_var(name: &str) -> Option<Self> {
        let code = name.trim().strip_prefix("v_")?;
        if code.starts_with("hk") {
            Some(Self::HongKong)
        } else if code.starts_with("sh") {
            Some(Self::Shanghai)
        } else if code.starts_with("sz") {
            Some(Self::Shenzhen)
        } else if code.starts_with("us") {
            Some(Self::Us)
        } else {
            None
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::HongKong => ".HK",
            Self::Shanghai => ".SS",
            Self::Shenzhen => ".SZ",
            Self::Us => "",
        }
    }

    fn currency(self) -> &'static str {
        match self {
            Self::HongKong => "HKD",
            Self::Shanghai | Self::Shenzhen => "CNY",
            Self::Us => "USD",
        }
    }
}

pub struct TencentFinanceSource {
    base_url: String,
}

impl TencentFinanceSource {
    pub fn new() -> Self {
        Self {
            base_url: TENCENT_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_tencent_code(symbol: &str) -> String {
        if let Some(code) = symbol.strip_suffix(".HK") {
            format!("hk{code}")
        } else if let Some(code) = symbol.strip_suffix(".SS") {
            format!("sh{code}")
        } else if let Some(code) = symbol.strip_suffix(".SZ") {
            format!("sz{code}")
        } else {
            format!("us{symbol}")
        }
    }

    fn parse_line(line: &str) -> Option<QuotePrice> {
        let (var, _) = line.split_once('=')?;
        let start = line.find('"')?;
        let end = line.rfind('"')?;
        if end <= start {
            return None;
        }

        let fields: Vec<&str> = line[start + 1..end].split('~').collect();
        if fields.len() < 4 {
            return None;
        }

        let raw = fields[2].split('.').next().unwrap_or_default().trim().to_uppercase();
        if raw.is_empty() {
            return None;
        }
        let price: f64 = fields[3].trim().parse().ok()?;
        let market = Market::from_var(var);

        let symbol = match market {
            Some(market) => format!("{raw}{}", market.suffix()),
            // Five-digit codes with a leading zero are Hong Kong listings.
            None if raw.len() == 5 && raw.starts_with('0') => format!("{raw}.HK"),
            None => raw,
        };

        let currency = fields
            .get(CURRENCY_FIELD)
            .map(|c| c.trim())
            .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
            .map(str::to_uppercase)
            .unwrap_or_else(|| market.map_or("USD", Market::currency).to_string());

        Some(QuotePrice::new(symbol, format_price(price)).with_currency(currency))
    }
}

impl Default for TencentFinanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuoteSource for TencentFinanceSource {
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
            .map(|s| Self::to_tencent_code(s))
            .collect();
        if codes.is_empty() {
            return Err(MarketDataError::invalid_symbol(NAME, symbols));
        }

        let url = format!("{}/q={}", self.base_url, codes.join(","));
        Ok(vec![QuoteRequest::get(url).header("User-Agent", BROWSER_USER_AGENT)])
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

        Ok(PriceSnapshot::new(NAME, TENCENT_REFERENCE_URL, captured_at, "USD").with_prices(prices))
    }
}
