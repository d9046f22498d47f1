//! In-process stand-in for the remote aggregator's upload endpoint
//! (`/upload` push, or `/api/v1/receive` remote-write). Records every
//! request it receives so tests can assert on headers and body bytes,
//! and can be configured to fail the next N requests to exercise retry.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode, Uri};
use hyper::Body;
use tokio::sync::RwLock;

use super::http::spawn_blackhole_http_server;

#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct UploadMock {
    pub uri: Uri,
    uploads: Arc<RwLock<Vec<ReceivedUpload>>>,
    fail_next: Arc<RwLock<u32>>,
}

impl UploadMock {
    pub async fn start() -> Self {
        let uploads: Arc<RwLock<Vec<ReceivedUpload>>> = Arc::new(RwLock::new(Vec::new()));
        let fail_next = Arc::new(RwLock::new(0));

        let handler_uploads = uploads.clone();
        let handler_fail_next = fail_next.clone();
        let uri = spawn_blackhole_http_server(move |req: Request<Body>| {
            let uploads = handler_uploads.clone();
            let fail_next = handler_fail_next.clone();
            async move {
                let (parts, body) = req.into_parts();
                let body = hyper::body::to_bytes(body).await.unwrap_or_default();
                uploads.write().await.push(ReceivedUpload {
                    headers: parts.headers,
                    body,
                });

                let mut remaining = fail_next.write().await;
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(Response::builder()
                        .status(StatusCode::SERVICE_UNAVAILABLE)
                        .body(Body::empty())
                        .expect("response is always well-formed"));
                }

                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::empty())
                    .expect("response is always well-formed"))
            }
        })
        .await;

        UploadMock {
            uri,
            uploads,
            fail_next,
        }
    }

    /// The next `count` requests receive a 503, to exercise the client's
    /// retry/backoff path.
    pub async fn fail_next(&self, count: u32) {
        *self.fail_next.write().await = count;
    }

    pub async fn uploads(&self) -> Vec<ReceivedUpload> {
        self.uploads.read().await.clone()
    }
}
