use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::id::ROOT_SENTINEL;
use super::{AssetKind, Id};

/// How an account relates to its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountArrangement {
    #[default]
    Single,
    /// A container whose value is the sum of its sub-accounts.
    MultiSubAccounts,
}

/// A bookkeeping account as seen by the valuation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Id,
    /// `None` for top-level accounts; serialized as `"root"`.
    #[serde(
        default,
        serialize_with = "serialize_parent",
        deserialize_with = "deserialize_parent"
    )]
    pub parent_id: Option<Id>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: AssetKind,
    /// ISO code for fiat, ticker symbol for crypto and stocks.
    #[serde(default)]
    pub currency: String,
    /// Integer balance in the currency's minor units.
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub arrangement: AccountArrangement,
}

impl Account {
    pub fn new(id: impl Into<Id>, kind: AssetKind, currency: impl Into<String>, balance: i64) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            name: String::new(),
            kind,
            currency: currency.into(),
            balance,
            arrangement: AccountArrangement::Single,
        }
    }

    pub fn fiat(id: impl Into<Id>, currency: impl Into<String>, balance: i64) -> Self {
        Self::new(id, AssetKind::Fiat, currency, balance)
    }

    pub fn crypto(id: impl Into<Id>, symbol: impl Into<String>, balance: i64) -> Self {
        Self::new(id, AssetKind::Crypto, symbol, balance)
    }

    pub fn stock(id: impl Into<Id>, symbol: impl Into<String>, balance: i64) -> Self {
        Self::new(id, AssetKind::Stock, symbol, balance)
    }

    /// A multi-sub-account parent. Its own balance is never used for valuation.
    pub fn group(id: impl Into<Id>, currency: impl Into<String>) -> Self {
        let mut account = Self::new(id, AssetKind::Fiat, currency, 0);
        account.arrangement = AccountArrangement::MultiSubAccounts;
        account
    }

    pub fn with_parent(mut self, parent_id: impl Into<Id>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_balance(mut self, balance: i64) -> Self {
        self.balance = balance;
        self
    }

    pub fn is_group(&self) -> bool {
        self.arrangement == AccountArrangement::MultiSubAccounts
    }
}

fn serialize_parent<S>(parent: &Option<Id>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match parent {
        Some(id) => serializer.serialize_str(id.as_str()),
        None => serializer.serialize_str(ROOT_SENTINEL),
    }
}

fn deserialize_parent<'de, D>(deserializer: D) -> Result<Option<Id>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|value| Id::is_valid(value))
        .map(Id::from_string))
}
