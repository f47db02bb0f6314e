use serde::{Deserialize, Serialize};

/// What an account's balance is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// A fiat currency identified by its ISO code.
    Fiat,
    /// A crypto asset identified by its ticker symbol.
    Crypto,
    /// A listed security identified by its ticker, possibly with an exchange suffix.
    Stock,
    /// Anything the valuation engine should pass through unchanged.
    #[default]
    #[serde(other)]
    Other,
}
