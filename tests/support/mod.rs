#![allow(dead_code)]

use std::sync::Arc;

use bookfeed::clock::ManualClock;
use bookfeed::market_data::{
    DataDomain, ExternalDataSourceConfig, MarketDataService, MemoryConfigStore, ProviderContainer,
    SourceFactory, SourceKind,
};
use chrono::{DateTime, TimeZone, Utc};
use wiremock::MockServer;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Points every provider at the mock server.
pub fn mock_factory(server: &MockServer) -> SourceFactory {
    SourceKind::PROVIDER_IDS
        .iter()
        .fold(SourceFactory::new(), |factory, id| {
            factory.with_endpoint(*id, server.uri())
        })
}

pub fn mock_container(
    domain: DataDomain,
    server: &MockServer,
) -> (ProviderContainer, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let container = ProviderContainer::new(domain)
        .with_factory(mock_factory(server))
        .with_clock(clock.clone());
    (container, clock)
}

pub fn mock_service(
    server: &MockServer,
    rows: Vec<ExternalDataSourceConfig>,
) -> (MarketDataService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let service = MarketDataService::new(Arc::new(MemoryConfigStore::with_rows(rows)))
        .with_factory(mock_factory(server))
        .with_clock(clock.clone());
    (service, clock)
}

/// Requests the server received for `path`.
pub async fn hits(server: &MockServer, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == path)
        .count()
}

pub fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn coingecko_row() -> ExternalDataSourceConfig {
    ExternalDataSourceConfig::new(DataDomain::Crypto, "coingecko").with_base_currency("USD")
}

pub fn frankfurter_body(base: &str, rates: &str) -> String {
    format!(r#"{{"amount":1.0,"base":"{base}","date":"2024-03-01","rates":{rates}}}"#)
}
