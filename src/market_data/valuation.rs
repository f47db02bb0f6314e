//! Converts an account tree into totals in one default currency.
//!
//! All totals are integers in the default currency's minor units. Missing
//! prices or rates zero the affected account quietly; nothing here fails.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::fraction::fraction_digits;
use super::PriceSnapshot;
use crate::models::{Account, AccountTree, AssetKind, Id};

/// Stablecoins valued at their USD peg when a rate table does not list them.
const USD_PEGGED: [&str; 3] = ["USDT", "USDC", "DAI"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountValuation {
    pub id: Id,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub kind: AssetKind,
    pub currency: String,
    /// Stored balance in the account's own minor units.
    pub balance: i64,
    /// Balance in the default currency's minor units.
    pub total_balance: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AccountValuation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationReport {
    pub default_currency: String,
    pub accounts: Vec<AccountValuation>,
}

impl ValuationReport {
    /// Total for any account in the tree.
    pub fn total_of(&self, id: &Id) -> Option<i64> {
        fn find(nodes: &[AccountValuation], id: &Id) -> Option<i64> {
            nodes.iter().find_map(|node| {
                if node.id == *id {
                    Some(node.total_balance)
                } else {
                    find(&node.children, id)
                }
            })
        }
        find(&self.accounts, id)
    }

    /// Sum of the top-level totals.
    pub fn grand_total(&self) -> i64 {
        self.accounts
            .iter()
            .fold(0i64, |acc, a| acc.saturating_add(a.total_balance))
    }
}

/// Pure valuation over already-fetched snapshots.
pub struct ValuationEngine<'a> {
    default_currency: String,
    rates: RateTable,
    crypto: Option<&'a PriceSnapshot>,
    stock: Option<&'a PriceSnapshot>,
}

impl<'a> ValuationEngine<'a> {
    pub fn new(
        default_currency: &str,
        exchange: Option<&PriceSnapshot>,
        crypto: Option<&'a PriceSnapshot>,
        stock: Option<&'a PriceSnapshot>,
    ) -> Self {
        Self {
            default_currency: default_currency.trim().to_uppercase(),
            rates: RateTable::from_snapshot(exchange),
            crypto,
            stock,
        }
    }

    pub fn valuate(&self, tree: &AccountTree) -> ValuationReport {
        ValuationReport {
            default_currency: self.default_currency.clone(),
            accounts: tree.roots().map(|root| self.valuate_node(tree, root)).collect(),
        }
    }

    fn valuate_node(&self, tree: &AccountTree, account: &Account) -> AccountValuation {
        let children: Vec<AccountValuation> = tree
            .children(&account.id)
            .map(|child| self.valuate_node(tree, child))
            .collect();

        let total_balance = if account.is_group() {
            children
                .iter()
                .fold(0i64, |acc, c| acc.saturating_add(c.total_balance))
        } else {
            self.account_total(account)
        };

        AccountValuation {
            id: account.id.clone(),
            name: account.name.clone(),
            kind: account.kind,
            currency: account.currency.clone(),
            balance: account.balance,
            total_balance,
            children,
        }
    }

    /// Total for a single account, ignoring any children.
    pub fn account_total(&self, account: &Account) -> i64 {
        let code = account.currency.trim().to_uppercase();
        let result = match account.kind {
            AssetKind::Fiat => self.convert_fiat(account.balance, &code),
            AssetKind::Crypto => self.crypto.and_then(|snapshot| {
                let quote = snapshot.get(&code)?;
                self.convert_priced(
                    account.balance,
                    fraction_digits(&code),
                    &quote.price,
                    &snapshot.base_currency,
                )
            }),
            AssetKind::Stock => self.stock.and_then(|snapshot| {
                let quote = snapshot.get(&code)?;
                let currency = quote
                    .currency
                    .as_deref()
                    .unwrap_or(snapshot.base_currency.as_str());
                // Share counts scale by the quote currency, never by the ticker.
                self.convert_priced(account.balance, fraction_digits(currency), &quote.price, currency)
            }),
            AssetKind::Other => Some(Decimal::from(account.balance)),
        };

        result.map_or(0, |value| to_minor_units(value, &account.id))
    }

    /// Units of the default currency per one unit of `from`.
    fn cross_rate(&self, from: &str) -> Option<(Decimal, Decimal)> {
        let source = self.rates.rate(from)?;
        let target = self.rates.rate(&self.default_currency)?;
        if source.is_zero() {
            return None;
        }
        Some((target, source))
    }

    fn convert_fiat(&self, balance: i64, currency: &str) -> Option<Decimal> {
        if currency == self.default_currency {
            return Some(Decimal::from(balance));
        }
        let (target, source) = self.cross_rate(currency)?;
        let value = Decimal::from(balance)
            .checked_mul(target)?
            .checked_div(source)?;
        let shift = fraction_digits(&self.default_currency) as i32 - fraction_digits(currency) as i32;
        scale(value, shift)
    }

    /// Values `balance` units of an asset quoted at `price` in `price_currency`.
    /// `balance` carries `asset_fraction` minor digits.
    fn convert_priced(
        &self,
        balance: i64,
        asset_fraction: u32,
        price: &str,
        price_currency: &str,
    ) -> Option<Decimal> {
        let price = Decimal::from_str(price.trim()).ok()?;
        let mut value = Decimal::from(balance).checked_mul(price)?;

        let price_currency = price_currency.trim().to_uppercase();
        if price_currency != self.default_currency {
            let (target, source) = self.cross_rate(&price_currency)?;
            value = value.checked_mul(target)?.checked_div(source)?;
        }

        let shift = fraction_digits(&self.default_currency) as i32 - asset_fraction as i32;
        scale(value, shift)
    }
}

/// Convenience wrapper around [`ValuationEngine`].
pub fn valuate(
    tree: &AccountTree,
    default_currency: &str,
    exchange: Option<&PriceSnapshot>,
    crypto: Option<&PriceSnapshot>,
    stock: Option<&PriceSnapshot>,
) -> ValuationReport {
    ValuationEngine::new(default_currency, exchange, crypto, stock).valuate(tree)
}

/// Exchange rates keyed by uppercase code, relative to the snapshot base.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<String, Decimal>,
}

impl RateTable {
    /// The snapshot base gets rate 1 unless the snapshot lists it.
    pub fn from_snapshot(exchange: Option<&PriceSnapshot>) -> Self {
        let mut rates = HashMap::new();
        let Some(snapshot) = exchange else {
            return Self { rates };
        };

        for entry in &snapshot.prices {
            if let Ok(rate) = Decimal::from_str(entry.price.trim()) {
                rates.insert(entry.symbol.to_uppercase(), rate);
            }
        }
        rates
            .entry(snapshot.base_currency.to_uppercase())
            .or_insert(Decimal::ONE);
        Self { rates }
    }

    /// Units of `code` per one unit of the base. USD-pegged stablecoins fall back to USD.
    pub fn rate(&self, code: &str) -> Option<Decimal> {
        let code = code.trim().to_uppercase();
        self.rates.get(&code).copied().or_else(|| {
            USD_PEGGED
                .contains(&code.as_str())
                .then(|| self.rates.get("USD").copied())
                .flatten()
        })
    }
}

fn scale(value: Decimal, shift: i32) -> Option<Decimal> {
    let factor = Decimal::from(10i64.checked_pow(shift.unsigned_abs())?);
    if shift >= 0 {
        value.checked_mul(factor)
    } else {
        value.checked_div(factor)
    }
}

fn to_minor_units(value: Decimal, account_id: &Id) -> i64 {
    match value.trunc().to_i64() {
        Some(total) => total,
        None => {
            warn!(account_id = %account_id, value = %value, "valuation overflowed i64, using 0");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::market_data::QuotePrice;

    fn snapshot(base: &str, prices: Vec<QuotePrice>) -> PriceSnapshot {
        PriceSnapshot::new("test", "https://example.test/", Utc::now(), base).with_prices(prices)
    }

    #[test]
    fn same_currency_is_unchanged() {
        let engine = ValuationEngine::new("USD", None, None, None);
        assert_eq!(engine.account_total(&Account::fiat("a", "usd", 1234)), 1234);
    }

    #[test]
    fn fraction_shift_between_currencies() {
        // 1000 JPY (no minor units) at 150 JPY per USD is 6.66 USD.
        let rates = snapshot(
            "USD",
            vec![QuotePrice::new("JPY", "150")],
        );
        let engine = ValuationEngine::new("USD", Some(&rates), None, None);
        assert_eq!(engine.account_total(&Account::fiat("a", "JPY", 1000)), 666);

        let engine = ValuationEngine::new("JPY", Some(&rates), None, None);
        assert_eq!(engine.account_total(&Account::fiat("b", "USD", 100)), 150);
    }

    #[test]
    fn missing_rate_is_zero() {
        let rates = snapshot("EUR", vec![QuotePrice::new("USD", "1.08")]);
        let engine = ValuationEngine::new("USD", Some(&rates), None, None);
        assert_eq!(engine.account_total(&Account::fiat("a", "GBP", 5000)), 0);

        let engine = ValuationEngine::new("USD", None, None, None);
        assert_eq!(engine.account_total(&Account::fiat("a", "EUR", 5000)), 0);
    }

    #[test]
    fn zero_source_rate_is_zero() {
        let rates = snapshot("USD", vec![QuotePrice::new("XYZ", "0")]);
        let engine = ValuationEngine::new("USD", Some(&rates), None, None);
        assert_eq!(engine.account_total(&Account::fiat("a", "XYZ", 5000)), 0);
    }

    #[test]
    fn stablecoin_base_falls_back_to_usd_rate() {
        let rates = snapshot("EUR", vec![QuotePrice::new("USD", "1.25")]);
        let crypto = snapshot("USDT", vec![QuotePrice::new("BTC", "50000")]);
        let engine = ValuationEngine::new("EUR", Some(&rates), Some(&crypto), None);
        // 0.5 BTC = 25000 USDT ~ 25000 USD = 20000 EUR.
        assert_eq!(
            engine.account_total(&Account::crypto("w", "BTC", 50_000_000)),
            2_000_000
        );
    }

    #[test]
    fn stock_uses_symbol_currency() {
        let rates = snapshot("USD", vec![QuotePrice::new("HKD", "7.8")]);
        let stocks = snapshot(
            "USD",
            vec![
                QuotePrice::new("0700.HK", "390").with_currency("HKD"),
                QuotePrice::new("AAPL", "150.25").with_currency("USD"),
            ],
        );
        let engine = ValuationEngine::new("USD", Some(&rates), None, Some(&stocks));

        // 2.00 shares at 150.25 USD.
        assert_eq!(engine.account_total(&Account::stock("s1", "AAPL", 200)), 30050);
        // 1.00 share at 390 HKD is 50.00 USD.
        assert_eq!(engine.account_total(&Account::stock("s2", "0700.HK", 100)), 5000);
    }

    #[test]
    fn stock_ticker_matching_a_coin_keeps_share_fraction() {
        let stocks = snapshot(
            "USD",
            vec![
                QuotePrice::new("ATOM", "5").with_currency("USD"),
                QuotePrice::new("LINK", "5").with_currency("USD"),
                QuotePrice::new("AAPL", "5").with_currency("USD"),
            ],
        );
        let engine = ValuationEngine::new("USD", None, None, Some(&stocks));

        // 1.00 share at 5 USD, whatever the ticker.
        assert_eq!(engine.account_total(&Account::stock("atom", "ATOM", 100)), 500);
        assert_eq!(engine.account_total(&Account::stock("link", "LINK", 100)), 500);
        assert_eq!(engine.account_total(&Account::stock("aapl", "AAPL", 100)), 500);
    }

    #[test]
    fn crypto_still_uses_coin_fraction() {
        let crypto = snapshot("USD", vec![QuotePrice::new("ATOM", "5")]);
        let engine = ValuationEngine::new("USD", None, Some(&crypto), None);
        // 1.0000 ATOM at 5 USD.
        assert_eq!(engine.account_total(&Account::crypto("w", "ATOM", 10_000)), 500);
    }

    #[test]
    fn other_kinds_pass_through() {
        let engine = ValuationEngine::new("USD", None, None, None);
        let account = Account::new("house", AssetKind::Other, "HOUSE", 42);
        assert_eq!(engine.account_total(&account), 42);
    }

    #[test]
    fn overflow_yields_zero() {
        let rates = snapshot("USD", vec![QuotePrice::new("JPY", "0.0000001")]);
        let engine = ValuationEngine::new("USD", Some(&rates), None, None);
        assert_eq!(engine.account_total(&Account::fiat("a", "JPY", i64::MAX)), 0);
    }

    #[test]
    fn grand_total_sums_roots() -> anyhow::Result<()> {
        let tree = AccountTree::build(vec![
            Account::fiat("a", "USD", 100),
            Account::fiat("b", "USD", 250),
        ])?;
        let report = valuate(&tree, "USD", None, None, None);
        assert_eq!(report.grand_total(), 350);
        assert_eq!(report.total_of(&Id::from("b")), Some(250));
        assert_eq!(report.total_of(&Id::from("zzz")), None);
        Ok(())
    }
}
