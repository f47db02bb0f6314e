//! Background refresh of every configured domain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{DataDomain, ExternalDataSourceConfig, MarketDataError, MarketDataService, PriceSnapshot};
use crate::duration::parse_duration;

/// Used when a row carries no usable update frequency.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Symbols kept warm for the symbol-based domains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Watchlist {
    pub crypto: Vec<String>,
    pub stock: Vec<String>,
}

impl Watchlist {
    /// `None` for a symbol-based domain with nothing to watch.
    fn symbols(&self, domain: DataDomain) -> Option<&[String]> {
        let symbols: &[String] = match domain {
            DataDomain::Crypto => &self.crypto,
            DataDomain::Stock => &self.stock,
            DataDomain::ExchangeRate => return Some(&[]),
        };
        (!symbols.is_empty()).then_some(symbols)
    }
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Skipped,
    Refreshed(Arc<PriceSnapshot>),
    Failed(MarketDataError),
}

pub struct RefreshScheduler {
    service: Arc<MarketDataService>,
    watchlist: Watchlist,
    default_interval: Duration,
}

impl RefreshScheduler {
    pub fn new(service: Arc<MarketDataService>, watchlist: Watchlist) -> Self {
        Self {
            service,
            watchlist,
            default_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.default_interval = interval;
        }
        self
    }

    /// Refresh interval for a domain given its row.
    pub fn interval_for(&self, config: Option<&ExternalDataSourceConfig>) -> Duration {
        let Some(hint) = config.and_then(|c| c.update_frequency.as_deref()) else {
            return self.default_interval;
        };
        match parse_duration(hint) {
            Ok(interval) if !interval.is_zero() => interval,
            Ok(_) => self.default_interval,
            Err(err) => {
                warn!(hint, error = %err, "ignoring unparseable update frequency");
                self.default_interval
            }
        }
    }

    /// Refreshes one domain if it is configured and has something to fetch.
    pub async fn refresh(&self, domain: DataDomain) -> RefreshOutcome {
        let Some(symbols) = self.watchlist.symbols(domain) else {
            debug!(%domain, "watchlist empty, skipping refresh");
            return RefreshOutcome::Skipped;
        };

        match self.service.latest(domain, symbols).await {
            Ok(snapshot) => {
                debug!(%domain, prices = snapshot.prices.len(), "refreshed");
                RefreshOutcome::Refreshed(snapshot)
            }
            Err(MarketDataError::ServiceNotEnabled(_)) => {
                debug!(%domain, "no data source configured, skipping refresh");
                RefreshOutcome::Skipped
            }
            Err(err) => {
                warn!(%domain, error = %err, "scheduled refresh failed");
                RefreshOutcome::Failed(err)
            }
        }
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(default_interval = ?self.default_interval, "refresh scheduler started");
        let start = Instant::now();
        let mut next_due: HashMap<DataDomain, Instant> =
            DataDomain::ALL.iter().map(|d| (*d, start)).collect();

        loop {
            if *shutdown.borrow() {
                break;
            }

            for domain in DataDomain::ALL {
                if next_due.get(&domain).is_some_and(|due| *due > Instant::now()) {
                    continue;
                }
                self.refresh(domain).await;
                let config = self.service.get_config(domain).await.ok().flatten();
                next_due.insert(domain, Instant::now() + self.interval_for(config.as_ref()));
            }

            let wake = next_due
                .values()
                .min()
                .copied()
                .unwrap_or_else(|| Instant::now() + self.default_interval);

            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("refresh scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::MemoryConfigStore;

    fn scheduler(watchlist: Watchlist) -> RefreshScheduler {
        let service = MarketDataService::new(Arc::new(MemoryConfigStore::new()));
        RefreshScheduler::new(Arc::new(service), watchlist)
    }

    #[test]
    fn interval_prefers_row_hint() {
        let scheduler = scheduler(Watchlist::default());
        let mut row = ExternalDataSourceConfig::new(DataDomain::Crypto, "coingecko");
        assert_eq!(scheduler.interval_for(Some(&row)), DEFAULT_REFRESH_INTERVAL);

        row.update_frequency = Some("30s".into());
        assert_eq!(scheduler.interval_for(Some(&row)), Duration::from_secs(30));

        row.update_frequency = Some("whenever".into());
        assert_eq!(scheduler.interval_for(Some(&row)), DEFAULT_REFRESH_INTERVAL);

        row.update_frequency = Some("0s".into());
        assert_eq!(scheduler.interval_for(Some(&row)), DEFAULT_REFRESH_INTERVAL);
    }

    #[tokio::test]
    async fn unconfigured_and_unwatched_domains_are_skipped() {
        let scheduler = scheduler(Watchlist::default());
        for domain in DataDomain::ALL {
            assert!(matches!(
                scheduler.refresh(domain).await,
                RefreshOutcome::Skipped
            ));
        }
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let scheduler = scheduler(Watchlist::default());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
