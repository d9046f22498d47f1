use std::time::Duration;

use hyper::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Method, Request, Uri};
use metrics_model::MetricFamily;

const CONTENT_ENCODING: &str = "content-encoding";

use super::error::Error;
use super::{classify_status, read_error_body, HttpClient, USER_AGENT_VALUE};

/// Pushes `families` as a single snappy-compressed delimited-protobuf
/// `MetricFamily` stream to an upload endpoint that speaks the same wire
/// format the federation source does (the "richer" upload variant, as
/// opposed to remote-write).
pub async fn send(
    client: &HttpClient,
    url: &Uri,
    bearer_token: &str,
    families: &[MetricFamily],
    timeout: Duration,
) -> Result<(), Error> {
    let body = metrics_model::delimited::encode_delimited(families);
    let compressed = snap::raw::Encoder::new()
        .compress_vec(&body)
        .map_err(|e| Error::Compress {
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

    let request = Request::builder()
        .method(Method::POST)
        .uri(url.clone())
        .header(CONTENT_TYPE, "application/vnd.google.protobuf;encoding=delimited")
        .header(CONTENT_ENCODING, "snappy")
        .header(AUTHORIZATION, format!("Bearer {bearer_token}"))
        .header(USER_AGENT, USER_AGENT_VALUE)
        .body(Body::from(compressed))
        .map_err(|e| Error::InvalidUrl {
            message: e.to_string(),
        })?;

    let response = tokio::time::timeout(timeout, client.request(request))
        .await
        .map_err(|_| Error::Timeout { elapsed: timeout })?
        .map_err(|source| Error::Transport { source })?;

    let status = response.status();
    if !status.is_success() {
        let body = read_error_body(response).await;
        return Err(classify_status(&url.to_string(), status, body));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::client::transport;
    use crate::test_util::upload_mock::UploadMock;
    use metrics_model::{Metric, MetricType, MetricValue};

    #[tokio::test]
    async fn body_is_snappy_compressed_and_labeled_as_such() {
        let mock = UploadMock::start().await;
        let client = transport::build(&Default::default()).unwrap();

        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(Metric::new(MetricValue::Gauge(1.0)));

        send(&client, &mock.uri, "tok", &[family.clone()], Duration::from_secs(5))
            .await
            .unwrap();

        let uploads = mock.uploads().await;
        assert_eq!(uploads.len(), 1);
        let upload = &uploads[0];
        assert_eq!(upload.headers.get("content-encoding").unwrap(), "snappy");

        let decompressed = snap::raw::Decoder::new().decompress_vec(&upload.body).unwrap();
        let expected = metrics_model::delimited::encode_delimited(&[family]);
        assert_eq!(decompressed, expected);
    }
}
