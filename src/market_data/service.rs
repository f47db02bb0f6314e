use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::config_store::{default_configs, seed_missing, DataSourceConfigStore};
use super::container::ProviderContainer;
use super::valuation::{RateTable, ValuationEngine, ValuationReport};
use super::{
    DataDomain, ExternalDataSourceConfig, MarketDataError, MarketDataResult, PriceSnapshot,
    QuotePrice, SourceFactory, SourceKind,
};
use crate::clock::Clock;
use crate::duration::parse_duration;
use crate::models::{AccountTree, AssetKind};

/// Entry point for market data: one container per domain plus the
/// persisted source configuration.
pub struct MarketDataService {
    configs: Arc<dyn DataSourceConfigStore>,
    crypto: ProviderContainer,
    stock: ProviderContainer,
    exchange_rate: ProviderContainer,
}

impl MarketDataService {
    pub fn new(configs: Arc<dyn DataSourceConfigStore>) -> Self {
        Self {
            configs,
            crypto: ProviderContainer::new(DataDomain::Crypto),
            stock: ProviderContainer::new(DataDomain::Stock),
            exchange_rate: ProviderContainer::new(DataDomain::ExchangeRate),
        }
    }

    pub fn with_factory(self, factory: SourceFactory) -> Self {
        self.map_containers(|c| c.with_factory(factory.clone()))
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.map_containers(|c| c.with_clock(Arc::clone(&clock)))
    }

    pub fn with_freshness_window(self, window: std::time::Duration) -> Self {
        self.map_containers(|c| c.with_freshness_window(window))
    }

    pub fn with_user_agent(self, user_agent: Option<String>) -> Self {
        self.map_containers(|c| c.with_user_agent(user_agent.clone()))
    }

    fn map_containers(self, f: impl Fn(ProviderContainer) -> ProviderContainer) -> Self {
        Self {
            configs: self.configs,
            crypto: f(self.crypto),
            stock: f(self.stock),
            exchange_rate: f(self.exchange_rate),
        }
    }

    pub fn container(&self, domain: DataDomain) -> &ProviderContainer {
        match domain {
            DataDomain::Crypto => &self.crypto,
            DataDomain::Stock => &self.stock,
            DataDomain::ExchangeRate => &self.exchange_rate,
        }
    }

    /// Latest snapshot for `domain` using whatever row is currently saved.
    pub async fn latest(
        &self,
        domain: DataDomain,
        symbols: &[String],
    ) -> MarketDataResult<Arc<PriceSnapshot>> {
        let config = self.get_config(domain).await?;
        self.container(domain).latest(symbols, config.as_ref()).await
    }

    pub async fn get_config(
        &self,
        domain: DataDomain,
    ) -> MarketDataResult<Option<ExternalDataSourceConfig>> {
        self.configs
            .get(domain)
            .await
            .map_err(|e| MarketDataError::ConfigStore(format!("{e:#}")))
    }

    /// Validates and stores `config`. The next `latest` call for its domain
    /// picks up the change.
    pub async fn save_config(&self, config: ExternalDataSourceConfig) -> MarketDataResult<()> {
        let kind = SourceKind::from_config(&config)?;
        if kind.requires_api_key() && config.api_key().is_none() {
            return Err(MarketDataError::ConfigInvalid(format!(
                "{} requires an API key",
                kind.provider_id()
            )));
        }
        if let Some(frequency) = config.update_frequency.as_deref() {
            parse_duration(frequency).map_err(|e| {
                MarketDataError::ConfigInvalid(format!("update_frequency {frequency:?}: {e}"))
            })?;
        }

        info!(domain = %config.domain, provider = kind.provider_id(), "saving data source");
        self.configs
            .save(config)
            .await
            .map_err(|e| MarketDataError::ConfigStore(format!("{e:#}")))
    }

    /// Writes the built-in rows plus `extra` for every domain that has none.
    pub async fn seed_defaults(
        &self,
        extra: Vec<ExternalDataSourceConfig>,
    ) -> MarketDataResult<Vec<DataDomain>> {
        let rows = extra.into_iter().chain(default_configs());
        let seeded = seed_missing(self.configs.as_ref(), rows)
            .await
            .map_err(|e| MarketDataError::ConfigStore(format!("{e:#}")))?;
        if !seeded.is_empty() {
            info!(domains = ?seeded, "seeded data source configuration");
        }
        Ok(seeded)
    }

    /// Fetches whatever the tree needs and values it in `default_currency`.
    ///
    /// Domains that cannot be fetched are valued as missing; valuation itself
    /// never fails.
    pub async fn valuate(&self, tree: &AccountTree, default_currency: &str) -> ValuationReport {
        let fiat = tree.codes_of_kind(AssetKind::Fiat);
        let crypto = tree.codes_of_kind(AssetKind::Crypto);
        let stock = tree.codes_of_kind(AssetKind::Stock);

        let exchange = self.latest_or_none(DataDomain::ExchangeRate, &fiat).await;
        let crypto = if crypto.is_empty() {
            None
        } else {
            self.latest_or_none(DataDomain::Crypto, &crypto).await
        };
        let stock = if stock.is_empty() {
            None
        } else {
            self.latest_or_none(DataDomain::Stock, &stock).await
        };

        ValuationEngine::new(
            default_currency,
            exchange.as_deref(),
            crypto.as_deref(),
            stock.as_deref(),
        )
        .valuate(tree)
    }

    /// The exchange-rate snapshot extended with crypto and stock symbols,
    /// each expressed as units of the symbol per one unit of the base.
    pub async fn combined_exchange_rates(
        &self,
        crypto_symbols: &[String],
        stock_symbols: &[String],
    ) -> MarketDataResult<PriceSnapshot> {
        let exchange = self.latest(DataDomain::ExchangeRate, &[]).await?;
        let rates = RateTable::from_snapshot(Some(exchange.as_ref()));
        let mut combined = exchange.as_ref().clone();

        for (domain, symbols) in [
            (DataDomain::Crypto, crypto_symbols),
            (DataDomain::Stock, stock_symbols),
        ] {
            if symbols.is_empty() {
                continue;
            }
            let Some(snapshot) = self.latest_or_none(domain, symbols).await else {
                continue;
            };
            combined
                .prices
                .extend(inverted_quotes(&snapshot, &rates));
        }

        combined.normalize();
        Ok(combined)
    }

    async fn latest_or_none(
        &self,
        domain: DataDomain,
        symbols: &[String],
    ) -> Option<Arc<PriceSnapshot>> {
        match self.latest(domain, symbols).await {
            Ok(snapshot) => Some(snapshot),
            Err(MarketDataError::ServiceNotEnabled(_)) => {
                debug!(%domain, "no data source configured");
                None
            }
            Err(err) => {
                warn!(%domain, error = %err, "market data unavailable");
                None
            }
        }
    }
}

/// `rate(quote currency) / price` for every positive quote in `snapshot`.
fn inverted_quotes(snapshot: &PriceSnapshot, rates: &RateTable) -> Vec<QuotePrice> {
    snapshot
        .prices
        .iter()
        .filter_map(|quote| {
            let currency = quote
                .currency
                .as_deref()
                .unwrap_or(snapshot.base_currency.as_str());
            let rate = rates.rate(currency)?;
            let price = Decimal::from_str(quote.price.trim()).ok()?;
            if price <= Decimal::ZERO {
                return None;
            }
            let inverted = rate.checked_div(price)?.normalize();
            Some(QuotePrice::new(quote.symbol.clone(), inverted.to_string()))
        })
        .collect()
}
