//! Drives one adapter's requests through a transport client.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

use super::sources::body_excerpt;
use super::{
    DataDomain, MarketDataError, MarketDataResult, PriceSnapshot, QuoteRequest, QuoteSource,
};

/// Executes `requests` and returns one snapshot.
///
/// A single request must succeed. With several requests, individual failures
/// are skipped and the successful partial snapshots are merged under the
/// metadata of the first success; only a batch where every request failed is
/// an error. Every failure surfaces as [`MarketDataError::RemoteFetchFailed`].
pub async fn execute(
    client: &Client,
    source: &dyn QuoteSource,
    domain: DataDomain,
    requests: &[QuoteRequest],
    captured_at: DateTime<Utc>,
) -> MarketDataResult<PriceSnapshot> {
    let failed = || MarketDataError::RemoteFetchFailed {
        domain,
        provider: source.name().to_string(),
    };

    match requests {
        [] => Err(failed()),
        [request] => execute_one(client, source, request, captured_at)
            .await
            .map_err(|_| failed()),
        _ => {
            let mut merged: Option<PriceSnapshot> = None;
            let mut failures = 0usize;

            for request in requests {
                match execute_one(client, source, request, captured_at).await {
                    Ok(partial) => match merged.as_mut() {
                        Some(snapshot) => snapshot.prices.extend(partial.prices),
                        None => merged = Some(partial),
                    },
                    Err(err) => {
                        failures += 1;
                        warn!(
                            provider = source.name(),
                            url = %request.url,
                            error = %err,
                            "skipping failed request in batch"
                        );
                    }
                }
            }

            let mut snapshot = merged.ok_or_else(|| {
                error!(
                    provider = source.name(),
                    requests = requests.len(),
                    "every request in batch failed"
                );
                failed()
            })?;
            snapshot.normalize();

            if failures > 0 {
                debug!(
                    provider = source.name(),
                    failures,
                    succeeded = requests.len() - failures,
                    "merged partial batch"
                );
            }
            Ok(snapshot)
        }
    }
}

/// Runs one request. Errors carry the cause for logging only.
async fn execute_one(
    client: &Client,
    source: &dyn QuoteSource,
    request: &QuoteRequest,
    captured_at: DateTime<Utc>,
) -> anyhow::Result<PriceSnapshot> {
    debug!(provider = source.name(), url = %request.url, "requesting quotes");

    let mut builder = client.get(&request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await.map_err(|err| {
        error!(provider = source.name(), url = %request.url, error = %err, "request failed");
        anyhow!("transport: {err}")
    })?;

    let status = response.status();
    let body = response.bytes().await.map_err(|err| {
        error!(
            provider = source.name(),
            url = %request.url,
            status = %status,
            error = %err,
            "failed to read response body"
        );
        anyhow!("reading body: {err}")
    })?;

    if status != StatusCode::OK {
        if status == StatusCode::UNAUTHORIZED {
            source.on_unauthorized();
        }
        error!(
            provider = source.name(),
            url = %request.url,
            status = %status,
            body = %body_excerpt(&body),
            "unexpected response status"
        );
        return Err(anyhow!("status {status}"));
    }

    source.parse(&body, captured_at).map_err(|err| {
        error!(
            provider = source.name(),
            url = %request.url,
            error = %err,
            body = %body_excerpt(&body),
            "failed to parse response"
        );
        anyhow::Error::new(err)
    })
}
