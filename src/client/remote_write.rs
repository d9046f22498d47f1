use std::time::Duration;

use backoff::ExponentialBackoff;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Method, Request, Uri};
use metrics_model::MetricFamily;
use prost::Message;

const CONTENT_ENCODING: &str = "content-encoding";
const REMOTE_WRITE_VERSION_HEADER: &str = "x-prometheus-remote-write-version";

use super::error::Error;
use super::{classify_status, read_error_body, HttpClient, USER_AGENT_VALUE};

/// Chunk size matching the upstream remote-write receiver's practical
/// per-request series limit.
const MAX_SERIES_PER_REQUEST: usize = 10_000;

/// Fixed per-chunk request timeout, independent of the outer scrape
/// interval or client-wide timeout.
const CHUNK_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Converts `families` to remote-write timeseries and pushes them,
/// chunked at `MAX_SERIES_PER_REQUEST` series per request, snappy-
/// compressed per the remote-write wire protocol. Each chunk is retried
/// with exponential backoff bounded so the whole call can't run past half
/// of `scrape_interval` — a failed forward should not still be retrying
/// when the next scrape is already due.
pub async fn remote_write(
    client: &HttpClient,
    url: &Uri,
    bearer_token: &str,
    families: &[MetricFamily],
    cluster_id: &str,
    scrape_interval: Duration,
) -> Result<(), Error> {
    let series = metrics_model::delimited::to_timeseries(families, cluster_id);
    if series.is_empty() {
        return Ok(());
    }

    let divisor = std::cmp::max(2, 2 * series.len() / 10_000) as u32;
    let max_elapsed_time = scrape_interval / divisor;

    for chunk in series.chunks(MAX_SERIES_PER_REQUEST) {
        let write_request = metrics_model::proto::prometheus_remote::WriteRequest {
            timeseries: chunk.to_vec(),
        };
        let encoded = write_request.encode_to_vec();
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&encoded)
            .map_err(|e| Error::Compress {
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(max_elapsed_time),
            ..ExponentialBackoff::default()
        };

        send_chunk_with_retry(client, url, bearer_token, &compressed, backoff).await?;
    }
    Ok(())
}

async fn send_chunk_with_retry(
    client: &HttpClient,
    url: &Uri,
    bearer_token: &str,
    compressed: &[u8],
    backoff: ExponentialBackoff,
) -> Result<(), Error> {
    let attempt = || async {
        let request = Request::builder()
            .method(Method::POST)
            .uri(url.clone())
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header(CONTENT_ENCODING, "snappy")
            .header(REMOTE_WRITE_VERSION_HEADER, "0.1.0")
            .header(AUTHORIZATION, format!("Bearer {bearer_token}"))
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Body::from(compressed.to_vec()))
            .map_err(|e| {
                backoff::Error::permanent(Error::InvalidUrl {
                    message: e.to_string(),
                })
            })?;

        let response = tokio::time::timeout(CHUNK_REQUEST_TIMEOUT, client.request(request))
            .await
            .map_err(|_| {
                backoff::Error::transient(Error::Timeout {
                    elapsed: CHUNK_REQUEST_TIMEOUT,
                })
            })?
            .map_err(|source| backoff::Error::transient(Error::Transport { source }))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = read_error_body(response).await;
        let err = classify_status(&url.to_string(), status, body);
        if err.is_retryable() {
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        }
    };

    backoff::future::retry(backoff, attempt)
        .await
        .map_err(|e| match e {
            backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use metrics_model::{Metric, MetricType, MetricValue};

    #[test]
    fn max_elapsed_time_scales_with_series_count() {
        let small = std::cmp::max(2, 2 * 100 / 10_000);
        assert_eq!(small, 2);
        let large = std::cmp::max(2, 2 * 50_000 / 10_000);
        assert_eq!(large, 10);
    }

    #[test]
    fn skips_histogram_only_input_without_a_request() {
        let mut family = MetricFamily::new("req_duration", MetricType::Histogram);
        family.metrics.push(Metric::new(MetricValue::Histogram(Default::default())));
        let series = metrics_model::delimited::to_timeseries(&[family], "");
        assert!(series.is_empty());
    }
}
