//! Scrapes a Prometheus federation endpoint, transforms the result, and
//! forwards it to a remote aggregator. See `SPEC_FULL.md` for the full
//! component breakdown; `main.rs` is a thin wrapper around [`run`].

pub mod authorize;
pub mod cli;
pub mod client;
pub mod config;
pub mod http;
pub mod reader;
pub mod transform;
pub mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;

/// Runs the process to completion: validates `cli` into a `Config`,
/// starts the worker/HTTP/signal tasks, and blocks until a shutdown
/// signal is observed. Returns the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let config = match Config::from_cli(cli.clone()) {
        Ok(config) => config,
        Err(error) => {
            error!(message = "invalid configuration", %error);
            return exitcode::CONFIG;
        }
    };

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(error) => {
            error!(message = "failed to install metrics recorder", %error);
            return exitcode::SOFTWARE;
        }
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (reconfigure_tx, reconfigure_rx) = worker::reconfigure_channel();

    let worker = worker::Worker::new();
    let snapshot = worker.snapshot_handle();
    let listen = config.listen;

    let worker_task = tokio::spawn(worker.run(config, reconfigure_rx, cancel_rx.clone()));

    let http_state = Arc::new(http::HttpState {
        snapshot,
        reconfigure_tx: reconfigure_tx.clone(),
        metrics_handle,
        cli: cli.clone(),
    });
    let http_task = tokio::spawn(http::serve(listen, http_state, cancel_rx.clone()));

    let signal_task = tokio::spawn(listen_for_signals(cancel_tx, reconfigure_tx, cli));

    info!(message = "metrics federator started", %listen);

    let _ = worker_task.await;
    let _ = http_task.await;
    signal_task.abort();

    exitcode::OK
}

pub fn init_logging(cli: &Cli) {
    let directive = cli.log_level.clone().unwrap_or_else(|| match cli.verbose {
        0 => "info".to_owned(),
        1 => "debug".to_owned(),
        _ => "trace".to_owned(),
    });
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_ansi(true).init();
}

/// Listens for `SIGHUP` (reconfigure: re-validates `cli` into a fresh
/// `Config`, re-reading any token/match/salt files along the way, and
/// pushes it to the worker) and `SIGINT`/`SIGTERM` (graceful shutdown).
#[cfg(unix)]
async fn listen_for_signals(
    cancel_tx: watch::Sender<bool>,
    reconfigure_tx: mpsc::Sender<Config>,
    cli: Cli,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                info!(message = "received SIGHUP, reloading configuration");
                reload(&cli, &reconfigure_tx).await;
            }
            _ = sigterm.recv() => {
                info!(message = "received SIGTERM, shutting down");
                let _ = cancel_tx.send(true);
                return;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(message = "received SIGINT, shutting down");
                let _ = cancel_tx.send(true);
                return;
            }
        }
    }
}

#[cfg(not(unix))]
async fn listen_for_signals(
    cancel_tx: watch::Sender<bool>,
    _reconfigure_tx: mpsc::Sender<Config>,
    _cli: Cli,
) {
    let _ = tokio::signal::ctrl_c().await;
    info!(message = "received shutdown signal");
    let _ = cancel_tx.send(true);
}

/// Re-validates `cli` into a `Config` and pushes it to the worker. Shared
/// by the `SIGHUP` handler and the `/-/reload` HTTP route.
pub async fn reload(cli: &Cli, reconfigure_tx: &mpsc::Sender<Config>) {
    match Config::from_cli(cli.clone()) {
        Ok(config) => worker::send_reconfigure(reconfigure_tx, config).await,
        Err(error) => error!(message = "reload failed, keeping previous configuration", %error),
    }
}
