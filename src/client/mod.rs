//! The HTTP client used to scrape a federation endpoint and forward the
//! result, either as a raw delimited-protobuf push (`send`) or as
//! remote-write timeseries (`remote_write`).

pub mod error;
mod remote_write;
mod retrieve;
mod send;
mod transport;

use std::time::Duration;

use hyper::{Body, Response, StatusCode, Uri};
use metrics_model::MetricFamily;

pub use error::Error;
pub use transport::{HttpClient, TlsConfig};

pub(crate) const USER_AGENT_VALUE: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Caps how much of an error response body gets captured for diagnostics.
const ERROR_BODY_CAP: u64 = 8 * 1024;

pub struct MetricsClient {
    http: HttpClient,
    max_scrape_bytes: u64,
    request_timeout: Duration,
}

impl MetricsClient {
    pub fn new(tls: &TlsConfig, max_scrape_bytes: u64, request_timeout: Duration) -> Result<Self, Error> {
        Ok(MetricsClient {
            http: transport::build(tls)?,
            max_scrape_bytes,
            request_timeout,
        })
    }

    /// Exposes the shared transport so `Authorizer` can issue the
    /// authorize handshake over the same connection pool.
    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    pub async fn retrieve(
        &self,
        url: &Uri,
        match_exprs: &[String],
        bearer_token: Option<&str>,
    ) -> Result<Vec<MetricFamily>, Error> {
        let result = retrieve::retrieve(
            &self.http,
            url,
            match_exprs,
            bearer_token,
            self.max_scrape_bytes,
            self.request_timeout,
        )
        .await;
        record_request("metricsclient_request_retrieve", &result);
        result
    }

    pub async fn send(
        &self,
        url: &Uri,
        bearer_token: &str,
        families: &[MetricFamily],
    ) -> Result<(), Error> {
        let result = send::send(&self.http, url, bearer_token, families, self.request_timeout).await;
        record_request("metricsclient_request_send", &result);
        result
    }

    pub async fn remote_write(
        &self,
        url: &Uri,
        bearer_token: &str,
        families: &[MetricFamily],
        cluster_id: &str,
        scrape_interval: Duration,
    ) -> Result<(), Error> {
        let result = remote_write::remote_write(
            &self.http,
            url,
            bearer_token,
            families,
            cluster_id,
            scrape_interval,
        )
        .await;
        record_request("metricsclient_request_send", &result);
        result
    }
}

/// Mirrors the original implementation's `metricsclient_request_{retrieve,send}`
/// counters: incremented exactly once per call, labeled by outcome.
fn record_request<T>(name: &'static str, result: &Result<T, Error>) {
    let status_code = match result {
        Ok(_) => "200".to_owned(),
        Err(Error::Unauthorized { .. }) => "401".to_owned(),
        Err(Error::Forbidden { .. }) => "403".to_owned(),
        Err(Error::BadRequest { .. }) => "400".to_owned(),
        Err(Error::Upstream { status, .. }) => status.to_string(),
        Err(_) => "error".to_owned(),
    };
    metrics::counter!(name, "status_code" => status_code).increment(1);
}

fn classify_status(url: &str, status: StatusCode, body: String) -> Error {
    match status.as_u16() {
        401 => Error::Unauthorized { url: url.to_owned() },
        403 => Error::Forbidden { url: url.to_owned() },
        400 => Error::BadRequest {
            url: url.to_owned(),
            body,
        },
        other => Error::Upstream {
            url: url.to_owned(),
            status: other,
            body,
        },
    }
}

async fn read_error_body(response: Response<Body>) -> String {
    use crate::reader::LimitedReader;

    let mut reader = LimitedReader::new(response.into_body(), ERROR_BODY_CAP);
    match reader.read_to_end().await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

