//! Per-domain provider container: adapter selection, snapshot cache and
//! request coalescing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::executor;
use super::transport::TransportSettings;
use super::{
    DataDomain, ExternalDataSourceConfig, MarketDataError, MarketDataResult, PriceSnapshot,
    QuoteSource, SourceFactory, SourceKind,
};
use crate::clock::{Clock, SystemClock};

/// How long a fetched snapshot is served without contacting the provider.
pub const FRESHNESS_WINDOW: std::time::Duration = std::time::Duration::from_secs(5 * 60);

type SharedFetch = Shared<BoxFuture<'static, MarketDataResult<Arc<PriceSnapshot>>>>;

#[derive(Clone)]
struct ActiveSource {
    kind: SourceKind,
    source: Arc<dyn QuoteSource>,
}

struct CachedSnapshot {
    snapshot: Arc<PriceSnapshot>,
    fetched_at: DateTime<Utc>,
    kind: SourceKind,
}

#[derive(Default)]
struct ContainerState {
    active: Option<ActiveSource>,
    cached: Option<CachedSnapshot>,
}

#[derive(Default)]
struct SharedState {
    /// Held only for pointer swaps, never across a network call.
    state: RwLock<ContainerState>,
    /// The fetch currently running for this domain, if any.
    in_flight: Mutex<Option<SharedFetch>>,
}

/// Serves the latest snapshot for one [`DataDomain`].
///
/// Cheap to clone; clones share the same cache and in-flight fetch.
#[derive(Clone)]
pub struct ProviderContainer {
    domain: DataDomain,
    factory: SourceFactory,
    clock: Arc<dyn Clock>,
    freshness: chrono::Duration,
    user_agent: Option<String>,
    shared: Arc<SharedState>,
}

impl ProviderContainer {
    pub fn new(domain: DataDomain) -> Self {
        Self {
            domain,
            factory: SourceFactory::new(),
            clock: Arc::new(SystemClock),
            freshness: default_freshness(),
            user_agent: None,
            shared: Arc::new(SharedState::default()),
        }
    }

    pub fn with_factory(mut self, factory: SourceFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_freshness_window(mut self, window: std::time::Duration) -> Self {
        self.freshness = chrono::Duration::from_std(window).unwrap_or_else(|_| default_freshness());
        self
    }

    /// Overrides the default identification header for requests that set none.
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn domain(&self) -> DataDomain {
        self.domain
    }

    /// Returns the latest snapshot, fetching it when the cache is missing or stale.
    ///
    /// Fails with `ServiceNotEnabled` when `config` is absent. A failed refresh
    /// is answered with the previous snapshot when one exists.
    ///
    /// Coalescing is per domain, not per provider: a caller arriving while a
    /// fetch for a replaced provider is still running receives that fetch's
    /// snapshot. The next call after it lands fetches from the new provider.
    pub async fn latest(
        &self,
        symbols: &[String],
        config: Option<&ExternalDataSourceConfig>,
    ) -> MarketDataResult<Arc<PriceSnapshot>> {
        let config = config.ok_or(MarketDataError::ServiceNotEnabled(self.domain))?;
        if config.domain != self.domain {
            return Err(MarketDataError::ConfigInvalid(format!(
                "{} configuration passed to the {} container",
                config.domain, self.domain
            )));
        }

        let active = self.ensure_source(config).await?;

        if let Some(snapshot) = self.fresh_snapshot(&active.kind).await {
            debug!(domain = %self.domain, "serving cached snapshot");
            return Ok(snapshot);
        }

        let fetch = self.join_or_start_fetch(active, symbols, config).await;
        match fetch.await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) if err.is_recoverable() => self.stale_fallback(err).await,
            Err(err) => Err(err),
        }
    }

    /// The cached snapshot regardless of age.
    pub async fn cached(&self) -> Option<Arc<PriceSnapshot>> {
        let state = self.shared.state.read().await;
        state.cached.as_ref().map(|c| Arc::clone(&c.snapshot))
    }

    pub async fn active_kind(&self) -> Option<SourceKind> {
        let state = self.shared.state.read().await;
        state.active.as_ref().map(|a| a.kind.clone())
    }

    /// Installs the adapter for `config` unless an equal one is already active.
    async fn ensure_source(
        &self,
        config: &ExternalDataSourceConfig,
    ) -> MarketDataResult<ActiveSource> {
        let kind = SourceKind::from_config(config)?;

        {
            let state = self.shared.state.read().await;
            if let Some(active) = state.active.as_ref().filter(|a| a.kind == kind) {
                return Ok(active.clone());
            }
        }

        let mut state = self.shared.state.write().await;
        if let Some(active) = state.active.as_ref().filter(|a| a.kind == kind) {
            return Ok(active.clone());
        }

        info!(
            domain = %self.domain,
            provider = kind.provider_id(),
            previous = state.active.as_ref().map(|a| a.kind.provider_id()),
            "activating data source"
        );
        let active = ActiveSource {
            source: self.factory.create(&kind),
            kind,
        };
        state.active = Some(active.clone());
        Ok(active)
    }

    async fn fresh_snapshot(&self, kind: &SourceKind) -> Option<Arc<PriceSnapshot>> {
        let state = self.shared.state.read().await;
        let cached = state.cached.as_ref()?;
        let age = self.clock.now() - cached.fetched_at;
        (cached.kind == *kind && age < self.freshness).then(|| Arc::clone(&cached.snapshot))
    }

    async fn join_or_start_fetch(
        &self,
        active: ActiveSource,
        symbols: &[String],
        config: &ExternalDataSourceConfig,
    ) -> SharedFetch {
        let mut slot = self.shared.in_flight.lock().await;
        if let Some(fetch) = slot.as_ref() {
            debug!(domain = %self.domain, "joining in-flight fetch");
            return fetch.clone();
        }
        // A fetch may have finished between the freshness check and taking the slot.
        if let Some(snapshot) = self.fresh_snapshot(&active.kind).await {
            return futures::future::ready(Ok(snapshot)).boxed().shared();
        }

        let domain = self.domain;
        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);
        let settings = self.transport_settings(config);
        let symbols = symbols.to_vec();
        let api_key = config.api_key().map(str::to_string);

        let fetch = async move {
            let result = fetch_once(
                domain,
                &active,
                &settings,
                &symbols,
                api_key.as_deref(),
                clock.as_ref(),
            )
            .await;

            if let Ok(snapshot) = &result {
                let mut state = shared.state.write().await;
                state.cached = Some(CachedSnapshot {
                    snapshot: Arc::clone(snapshot),
                    fetched_at: clock.now(),
                    kind: active.kind.clone(),
                });
            }
            shared.in_flight.lock().await.take();
            result
        }
        .boxed()
        .shared();

        *slot = Some(fetch.clone());
        fetch
    }

    async fn stale_fallback(&self, err: MarketDataError) -> MarketDataResult<Arc<PriceSnapshot>> {
        let state = self.shared.state.read().await;
        match state.cached.as_ref() {
            Some(cached) => {
                let age = self.clock.now() - cached.fetched_at;
                warn!(
                    domain = %self.domain,
                    error = %err,
                    age_secs = age.num_seconds(),
                    fetched_at = %cached.fetched_at,
                    "failed to get latest market data, using stale snapshot"
                );
                Ok(Arc::clone(&cached.snapshot))
            }
            None => Err(err),
        }
    }

    fn transport_settings(&self, config: &ExternalDataSourceConfig) -> TransportSettings {
        let settings = TransportSettings::from_config(config);
        match &self.user_agent {
            Some(agent) => settings.with_user_agent(agent.clone()),
            None => settings,
        }
    }
}

fn default_freshness() -> chrono::Duration {
    chrono::Duration::seconds(FRESHNESS_WINDOW.as_secs() as i64)
}

async fn fetch_once(
    domain: DataDomain,
    active: &ActiveSource,
    settings: &TransportSettings,
    symbols: &[String],
    api_key: Option<&str>,
    clock: &dyn Clock,
) -> MarketDataResult<Arc<PriceSnapshot>> {
    let client = settings.build_client()?;
    active.source.prepare(&client).await?;
    let requests = active.source.build_requests(symbols, api_key)?;
    let snapshot =
        executor::execute(&client, active.source.as_ref(), domain, &requests, clock.now()).await?;
    Ok(Arc::new(snapshot))
}
