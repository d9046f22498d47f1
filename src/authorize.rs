//! Component E: the token-exchange handshake that trades a long-lived
//! authorization token and cluster id for a short-lived upload token,
//! performed once per forward attempt before scraping.

use std::time::Duration;

use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Method, Request, Uri};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::client::{HttpClient, USER_AGENT_VALUE};
use crate::reader::LimitedReader;

const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

#[derive(Debug, snafu::Snafu)]
pub enum Error {
    #[snafu(display("building authorize request: {}", message))]
    InvalidRequest { message: String },

    #[snafu(display("request timed out after {:?}", elapsed))]
    Timeout { elapsed: Duration },

    #[snafu(display("sending authorize request: {}", source))]
    Transport { source: hyper::Error },

    #[snafu(display("reading authorize response body: {}", source))]
    Body { source: hyper::Error },

    #[snafu(display("authorization token rejected (401)"))]
    Unauthorized,

    #[snafu(display("cluster forbidden from uploading (403)"))]
    Forbidden,

    #[snafu(display("authorize server rejected the request (400): {}", body))]
    BadRequest { body: String },

    #[snafu(display("authorize server returned unexpected status {}: {}", status, body))]
    Upstream { status: u16, body: String },

    #[snafu(display("authorize response carried no upload token"))]
    EmptyToken,
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Unauthorized | Error::Forbidden | Error::BadRequest { .. } | Error::EmptyToken
        )
    }
}

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    authorization_token: &'a str,
    cluster_id: &'a str,
}

#[derive(Deserialize, Default)]
struct AuthorizeResponse {
    #[serde(default)]
    token: String,
}

/// Performs the authorize handshake and caches the most recently issued
/// upload token, so callers that only need "the current token" don't have
/// to re-authorize on every use.
pub struct Authorizer {
    url: Uri,
    authorization_token: String,
    cluster_id: String,
    cached_token: RwLock<Option<String>>,
}

impl Authorizer {
    pub fn new(url: Uri, authorization_token: String, cluster_id: String) -> Self {
        Authorizer {
            url,
            authorization_token,
            cluster_id,
            cached_token: RwLock::new(None),
        }
    }

    pub async fn cached_token(&self) -> Option<String> {
        self.cached_token.read().await.clone()
    }

    pub async fn authorize(&self, client: &HttpClient, timeout: Duration) -> Result<String, Error> {
        let payload = serde_json::to_vec(&AuthorizeRequest {
            authorization_token: &self.authorization_token,
            cluster_id: &self.cluster_id,
        })
        .expect("AuthorizeRequest is always representable as JSON");

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Body::from(payload))
            .map_err(|e| Error::InvalidRequest {
                message: e.to_string(),
            })?;

        let response = tokio::time::timeout(timeout, client.request(request))
            .await
            .map_err(|_| Error::Timeout { elapsed: timeout })?
            .map_err(|source| Error::Transport { source })?;

        let status = response.status();
        let mut reader = LimitedReader::new(response.into_body(), MAX_RESPONSE_BYTES);
        let bytes = reader
            .read_to_end()
            .await
            .map_err(|source| Error::Body { source })?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            return Err(match status.as_u16() {
                401 => Error::Unauthorized,
                403 => Error::Forbidden,
                400 => Error::BadRequest { body },
                other => Error::Upstream { status: other, body },
            });
        }

        let parsed: AuthorizeResponse = serde_json::from_slice(&bytes).unwrap_or_default();
        if parsed.token.is_empty() {
            return Err(Error::EmptyToken);
        }

        *self.cached_token.write().await = Some(parsed.token.clone());
        Ok(parsed.token)
    }
}
