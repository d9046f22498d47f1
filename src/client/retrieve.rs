use std::time::Duration;

use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Method, Request, Uri};
use metrics_model::MetricFamily;
use snafu::ResultExt;

use crate::reader::LimitedReader;

use super::error::{BodySnafu, DecodeSnafu, Error, ParseTextSnafu};
use super::{classify_status, read_error_body, HttpClient, USER_AGENT_VALUE};

const ACCEPT_HEADER: &str =
    "application/vnd.google.protobuf;proto=io.prometheus.client.MetricFamily;encoding=delimited;q=0.7,text/plain;version=0.0.4;q=0.3,*/*;q=0.1";

/// Scrapes `url` as a Prometheus federation endpoint, appending one
/// `match[]` query parameter per entry in `match_exprs`, and parses the
/// response according to its `Content-Type`. The response body is capped
/// at `max_bytes`; exceeding the cap truncates rather than fails the
/// scrape, matching `LimitedReader`'s contract.
pub async fn retrieve(
    client: &HttpClient,
    url: &Uri,
    match_exprs: &[String],
    bearer_token: Option<&str>,
    max_bytes: u64,
    timeout: Duration,
) -> Result<Vec<MetricFamily>, Error> {
    let uri = build_federate_uri(url, match_exprs)?;
    let url_string = uri.to_string();

    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(ACCEPT, ACCEPT_HEADER)
        .header(USER_AGENT, USER_AGENT_VALUE);
    if let Some(token) = bearer_token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder
        .body(Body::empty())
        .map_err(|e| Error::InvalidUrl {
            message: e.to_string(),
        })?;

    let response = tokio::time::timeout(timeout, client.request(request))
        .await
        .map_err(|_| Error::Timeout { elapsed: timeout })?
        .map_err(|source| Error::Transport { source })?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    if !status.is_success() {
        let body = read_error_body(response).await;
        return Err(classify_status(&url_string, status, body));
    }

    let mut reader = LimitedReader::new(response.into_body(), max_bytes);
    let bytes = reader.read_to_end().await.context(BodySnafu)?;

    if content_type.starts_with("application/vnd.google.protobuf") {
        metrics_model::delimited::decode_delimited(&bytes).context(DecodeSnafu)
    } else {
        let text = String::from_utf8_lossy(&bytes);
        metrics_model::parse_text(&text).context(ParseTextSnafu)
    }
}

fn build_federate_uri(base: &Uri, match_exprs: &[String]) -> Result<Uri, Error> {
    if match_exprs.is_empty() {
        return Ok(base.clone());
    }
    let mut url = url::Url::parse(&base.to_string()).map_err(|e| Error::InvalidUrl {
        message: e.to_string(),
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        for expr in match_exprs {
            pairs.append_pair("match[]", expr);
        }
    }
    url.as_str().parse::<Uri>().map_err(|e| Error::InvalidUrl {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn appends_match_expressions_as_query_params() {
        let base: Uri = "http://localhost:9090/federate".parse().unwrap();
        let uri = build_federate_uri(&base, &["up".to_owned(), "alerts".to_owned()]).unwrap();
        let s = uri.to_string();
        assert!(s.contains("match%5B%5D=up") || s.contains("match[]=up"));
        assert!(s.contains("alerts"));
    }

    #[test]
    fn leaves_url_untouched_with_no_match_expressions() {
        let base: Uri = "http://localhost:9090/federate".parse().unwrap();
        let uri = build_federate_uri(&base, &[]).unwrap();
        assert_eq!(uri, base);
    }
}
