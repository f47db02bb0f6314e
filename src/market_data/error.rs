use thiserror::Error;

use super::DataDomain;

/// Failure kinds surfaced by the market-data layer.
///
/// Provider-specific detail (URL, status, body excerpt) is logged where it
/// happens; callers only ever see one of these variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketDataError {
    #[error("invalid data source configuration: {0}")]
    ConfigInvalid(String),

    #[error("no data source configured for {0}")]
    ServiceNotEnabled(DataDomain),

    #[error("{provider} does not recognize any of the requested symbols: {symbols}")]
    InvalidSymbol { provider: String, symbols: String },

    #[error("failed to fetch {domain} data from {provider}")]
    RemoteFetchFailed {
        domain: DataDomain,
        provider: String,
    },

    #[error("failed to parse {provider} response: {message}")]
    Parse { provider: String, message: String },

    #[error("data source configuration store failed: {0}")]
    ConfigStore(String),
}

impl MarketDataError {
    pub fn parse(provider: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_symbol(provider: &str, symbols: &[String]) -> Self {
        Self::InvalidSymbol {
            provider: provider.to_string(),
            symbols: symbols.join(","),
        }
    }

    /// Whether the provider container may answer this failure with a stale snapshot.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RemoteFetchFailed { .. })
    }
}

pub type MarketDataResult<T> = std::result::Result<T, MarketDataError>;
