//! Component G: the HTTP server exposing health, self-observability
//! metrics, and the federation debug surface. Every route is a thin
//! adapter over the worker's snapshot and reconfigure channel; none of
//! them drive a scrape or forward directly.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::info;

use crate::cli::Cli;
use crate::config::Config;
use crate::worker::{self, Snapshot};

pub struct HttpState {
    pub snapshot: Arc<RwLock<Snapshot>>,
    pub reconfigure_tx: mpsc::Sender<Config>,
    pub metrics_handle: PrometheusHandle,
    pub cli: Cli,
}

pub async fn serve(
    addr: SocketAddr,
    state: Arc<HttpState>,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), hyper::Error> {
    let make_service = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone()))) }
    });

    let server = Server::bind(&addr).serve(make_service);
    info!(message = "http server listening", %addr);

    server
        .with_graceful_shutdown(async move {
            let _ = cancel.changed().await;
        })
        .await
}

async fn handle(req: Request<Body>, state: Arc<HttpState>) -> Result<Response<Body>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => healthz(),
        (&Method::GET, "/healthz/ready") => ready(&state).await,
        (&Method::GET, "/metrics") => metrics(&state),
        (&Method::GET, "/federate") => federate(&state).await,
        (&Method::POST, "/-/reload") => reload(&state).await,
        (&Method::GET, path) if path.starts_with("/debug/pprof/") => {
            not_implemented("profiling endpoints have no supported equivalent in this build")
        }
        _ => not_found(),
    };
    Ok(response)
}

fn healthz() -> Response<Body> {
    Response::new(Body::from("ok"))
}

async fn ready(state: &HttpState) -> Response<Body> {
    let snapshot = state.snapshot.read().await;
    if snapshot.first_attempt_complete {
        Response::new(Body::from("ready"))
    } else {
        let mut response = Response::new(Body::from("no scrape/forward attempt has completed yet"));
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        response
    }
}

fn metrics(state: &HttpState) -> Response<Body> {
    Response::new(Body::from(state.metrics_handle.render()))
}

async fn federate(state: &HttpState) -> Response<Body> {
    let snapshot = state.snapshot.read().await;
    let body = metrics_model::write_text(&snapshot.families);
    Response::builder()
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

async fn reload(state: &HttpState) -> Response<Body> {
    crate::reload(&state.cli, &state.reconfigure_tx).await;
    Response::new(Body::from("reloaded"))
}

fn not_implemented(message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = StatusCode::NOT_IMPLEMENTED;
    response
}

fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("not found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
