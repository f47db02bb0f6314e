mod support;

use anyhow::Result;
use bookfeed::market_data::{DataDomain, ExternalDataSourceConfig, MarketDataError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{hits, mock_container, symbols};

const QUOTE_PATH: &str = "/v7/finance/quote";
const CRUMB_PATH: &str = "/v1/test/getcrumb";

fn yahoo_row() -> ExternalDataSourceConfig {
    ExternalDataSourceConfig::new(DataDomain::Stock, "yahoo_finance")
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("set-cookie", "A3=d=session123; Path=/; Secure; HttpOnly"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(CRUMB_PATH))
        .and(header("cookie", "A3=d=session123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("crumb-abc"))
        .mount(server)
        .await;
}

fn quote_body() -> &'static str {
    r#"{"quoteResponse":{"result":[
        {"symbol":"AAPL","regularMarketPrice":150.25,"currency":"USD"},
        {"symbol":"0700.HK","regularMarketPrice":390.2,"currency":"HKD"}
    ],"error":null}}"#
}

#[tokio::test]
async fn session_is_acquired_once_and_reused() -> Result<()> {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .and(query_param("crumb", "crumb-abc"))
        .and(query_param("symbols", "AAPL,0700.HK"))
        .and(header("cookie", "A3=d=session123"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(quote_body(), "application/json"))
        .mount(&server)
        .await;

    let (container, clock) = mock_container(DataDomain::Stock, &server);
    let wanted = symbols(&["aapl", "0700.hk"]);

    let snapshot = container.latest(&wanted, Some(&yahoo_row())).await?;
    assert_eq!(snapshot.data_source, "Yahoo Finance");
    assert_eq!(snapshot.get("AAPL").map(|q| q.price.as_str()), Some("150.25"));
    assert_eq!(
        snapshot.get("0700.HK").and_then(|q| q.currency.as_deref()),
        Some("HKD")
    );

    clock.advance(chrono::Duration::minutes(10));
    container.latest(&wanted, Some(&yahoo_row())).await?;

    assert_eq!(hits(&server, QUOTE_PATH).await, 2);
    assert_eq!(hits(&server, CRUMB_PATH).await, 1);
    assert_eq!(hits(&server, "/").await, 1);

    Ok(())
}

#[tokio::test]
async fn unauthorized_quote_renews_the_session() -> Result<()> {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_raw(
            r#"{"finance":{"result":null,"error":{"code":"Unauthorized","description":"Invalid Crumb"}}}"#,
            "application/json",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUOTE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(quote_body(), "application/json"))
        .mount(&server)
        .await;

    let (container, _clock) = mock_container(DataDomain::Stock, &server);
    let wanted = symbols(&["AAPL"]);

    let err = container.latest(&wanted, Some(&yahoo_row())).await.unwrap_err();
    assert!(matches!(err, MarketDataError::RemoteFetchFailed { .. }));

    let snapshot = container.latest(&wanted, Some(&yahoo_row())).await?;
    assert!(snapshot.get("AAPL").is_some());
    assert_eq!(hits(&server, CRUMB_PATH).await, 2);

    Ok(())
}

#[tokio::test]
async fn missing_crumb_fails_without_quoting() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CRUMB_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;

    let (container, _clock) = mock_container(DataDomain::Stock, &server);
    let err = container
        .latest(&symbols(&["AAPL"]), Some(&yahoo_row()))
        .await
        .unwrap_err();

    assert!(err.is_recoverable());
    assert_eq!(hits(&server, QUOTE_PATH).await, 0);

    Ok(())
}
