//! In-process stand-in for the upstream Prometheus federation endpoint,
//! built on [`spawn_blackhole_http_server`].

use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::{Request, Response, Uri};
use hyper::Body;
use metrics_model::{write_text, MetricFamily};
use tokio::sync::RwLock;

use super::http::spawn_blackhole_http_server;

/// What the mock saw on one scrape request, for assertions on the headers
/// and query string the scraper sent.
#[derive(Debug, Clone, Default)]
pub struct ReceivedRequest {
    pub authorization: Option<String>,
    pub query: Option<String>,
}

pub struct FederateMock {
    pub uri: Uri,
    families: Arc<RwLock<Vec<MetricFamily>>>,
    requests: Arc<RwLock<Vec<ReceivedRequest>>>,
}

impl FederateMock {
    /// Starts the mock serving `families` as Prometheus text at every path.
    pub async fn start(families: Vec<MetricFamily>) -> Self {
        let families = Arc::new(RwLock::new(families));
        let requests: Arc<RwLock<Vec<ReceivedRequest>>> = Arc::new(RwLock::new(Vec::new()));

        let handler_families = families.clone();
        let handler_requests = requests.clone();
        let uri = spawn_blackhole_http_server(move |req: Request<Body>| {
            let families = handler_families.clone();
            let requests = handler_requests.clone();
            async move {
                let seen = ReceivedRequest {
                    authorization: req
                        .headers()
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned),
                    query: req.uri().query().map(str::to_owned),
                };
                requests.write().await.push(seen);
                let body = write_text(&families.read().await);
                Ok(Response::new(Body::from(body)))
            }
        })
        .await;

        FederateMock { uri, families, requests }
    }

    /// Replaces the families served on the next request on.
    pub async fn set_families(&self, families: Vec<MetricFamily>) {
        *self.families.write().await = families;
    }

    pub async fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.read().await.clone()
    }
}
