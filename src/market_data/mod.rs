mod config_store;
mod container;
mod error;
mod executor;
pub mod fraction;
mod models;
pub mod providers;
mod scheduler;
mod service;
pub mod sources;
pub mod transport;
mod valuation;

pub use config_store::{
    default_configs, seed_missing, DataSourceConfigStore, JsonFileConfigStore, MemoryConfigStore,
};
pub use container::{ProviderContainer, FRESHNESS_WINDOW};
pub use error::{MarketDataError, MarketDataResult};
pub use executor::execute;
pub use models::{
    DataDomain, ExternalDataSourceConfig, PriceSnapshot, QuotePrice, DEFAULT_REQUEST_TIMEOUT_MS,
};
pub use scheduler::{RefreshOutcome, RefreshScheduler, Watchlist, DEFAULT_REFRESH_INTERVAL};
pub use service::MarketDataService;
pub use sources::{QuoteRequest, QuoteSource, SourceFactory, SourceKind};
pub use transport::{ProxyPolicy, TransportSettings, DEFAULT_USER_AGENT};
pub use valuation::{valuate, AccountValuation, RateTable, ValuationEngine, ValuationReport};
