pub mod alpha_vantage;
pub mod coingecko;
pub mod exchangerate_api;
pub mod fmp;
pub mod frankfurter;
pub mod sina_finance;
pub mod tencent_finance;
pub mod yahoo_finance;

pub use alpha_vantage::AlphaVantageSource;
pub use coingecko::CoinGeckoSource;
pub use exchangerate_api::ExchangeRateApiSource;
pub use fmp::FinancialModelingPrepSource;
pub use frankfurter::FrankfurterSource;
pub use sina_finance::SinaFinanceSource;
pub use tencent_finance::TencentFinanceSource;
pub use yahoo_finance::YahooFinanceSource;

/// Some quote endpoints refuse requests that do not look like a browser.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
