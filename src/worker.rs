//! Component F: the Forwarder worker. Owns the scrape → transform →
//! publish → forward tick loop, the reconfigure channel, and the
//! "last families" snapshot the HTTP server's `/federate` and debug
//! surfaces read from.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use metrics_model::MetricFamily;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, warn};

use crate::authorize::Authorizer;
use crate::client::MetricsClient;
use crate::config::{Config, UploadKind};
use crate::transform::{
    Anonymize, AddLabels, DropInvalidFederateSamples, MultiTransformer, Pack, RenameMetrics, Sort, Transformer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Scraping,
    Transforming,
    Publishing,
    Forwarding,
    Reconfiguring,
    Stopped,
}

#[derive(Debug, Default)]
pub struct Snapshot {
    pub families: Vec<MetricFamily>,
    pub state: Option<State>,
    pub last_forward_error: Option<String>,
    pub last_success_unix_ms: Option<i64>,
    pub tick_count: u64,
    /// Set once the first scrape/forward attempt has run to completion,
    /// success or failure. `/healthz/ready` stays unready until this is set.
    pub first_attempt_complete: bool,
}

/// Capacity-1, coalescing: a reconfigure that arrives while one is still
/// pending replaces it rather than queuing behind it, since only the most
/// recent configuration matters.
pub fn reconfigure_channel() -> (mpsc::Sender<Config>, mpsc::Receiver<Config>) {
    mpsc::channel(1)
}

pub async fn send_reconfigure(tx: &mpsc::Sender<Config>, config: Config) {
    match tx.try_send(config) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(config)) => {
            // Drop the stale, unconsumed config and replace it. A
            // concurrent consumer may win the race and drain the channel
            // first, in which case this simply queues behind it.
            let _ = tx.try_send(config);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

pub struct Worker {
    snapshot: Arc<RwLock<Snapshot>>,
}

impl Worker {
    pub fn new() -> Self {
        Worker {
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
        }
    }

    pub fn snapshot_handle(&self) -> Arc<RwLock<Snapshot>> {
        self.snapshot.clone()
    }

    /// Runs the tick loop until `cancel`'s value becomes `true`.
    pub async fn run(
        self,
        mut config: Config,
        mut reconfigure_rx: mpsc::Receiver<Config>,
        mut cancel: watch::Receiver<bool>,
    ) {
        let mut client = build_client(&config);
        let mut pipeline = build_pipeline(&config);
        let mut authorizer = build_authorizer(&config);

        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        self.set_state(State::Stopped).await;
                        return;
                    }
                }
                Some(new_config) = reconfigure_rx.recv() => {
                    self.set_state(State::Reconfiguring).await;
                    debug!(message = "worker reconfigured");
                    config = new_config;
                    client = build_client(&config);
                    pipeline = build_pipeline(&config);
                    authorizer = build_authorizer(&config);
                    ticker = tokio::time::interval(config.interval);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                }
                _ = ticker.tick() => {
                    self.tick(&config, &client, &mut pipeline, authorizer.as_ref()).await;
                }
            }
        }
    }

    async fn tick(
        &self,
        config: &Config,
        client: &MetricsClient,
        pipeline: &mut MultiTransformer,
        authorizer: Option<&Authorizer>,
    ) {
        self.attempt(config, client, pipeline, authorizer).await;
        let mut snapshot = self.snapshot.write().await;
        snapshot.first_attempt_complete = true;
    }

    /// The scrape → transform → publish → forward body of a tick. Every
    /// exit path, success or failure, counts as the attempt completing.
    async fn attempt(
        &self,
        config: &Config,
        client: &MetricsClient,
        pipeline: &mut MultiTransformer,
        authorizer: Option<&Authorizer>,
    ) {
        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.tick_count += 1;
        }

        self.set_state(State::Scraping).await;
        let from_token = config.from_bearer_token.as_deref();
        let families = match client.retrieve(&config.from, &config.match_exprs, from_token).await {
            Ok(families) => families,
            Err(error) => {
                warn!(component = "federate_source", url = %config.from, error = %error, "scrape failed");
                self.record_error(error.to_string()).await;
                return;
            }
        };

        self.set_state(State::Transforming).await;
        let min_time_ms = now_unix_ms() - 24 * 3600 * 1000;
        let families = match pipeline.apply(families, min_time_ms) {
            Ok(families) => families,
            Err(error) => {
                warn!(component = "transform", error = %error, "transform failed");
                self.record_error(error.to_string()).await;
                return;
            }
        };

        self.set_state(State::Publishing).await;
        self.publish(families.clone()).await;

        let Some(upload) = &config.upload else {
            self.set_state(State::Idle).await;
            return;
        };

        self.set_state(State::Forwarding).await;
        if let Err(error) = self.forward(config, client, authorizer, upload.kind, &families).await {
            warn!(component = "forward", url = %upload.upload_url, error = %error, "forward failed");
            self.record_error(error).await;
            self.set_state(State::Idle).await;
            return;
        }

        let mut snapshot = self.snapshot.write().await;
        snapshot.last_forward_error = None;
        snapshot.last_success_unix_ms = Some(now_unix_ms());
        drop(snapshot);
        self.set_state(State::Idle).await;
    }

    async fn forward(
        &self,
        config: &Config,
        client: &MetricsClient,
        authorizer: Option<&Authorizer>,
        kind: UploadKind,
        families: &[MetricFamily],
    ) -> Result<(), String> {
        let upload = config.upload.as_ref().expect("forward only called when upload is configured");

        let token = match authorizer {
            Some(authorizer) => match authorizer.authorize(client.http(), config.interval).await {
                Ok(token) => token,
                Err(error) if !error.is_retryable() => return Err(error.to_string()),
                Err(error) => {
                    warn!(component = "authorize", error = %error, "using cached upload token after authorize failure");
                    authorizer
                        .cached_token()
                        .await
                        .ok_or_else(|| error.to_string())?
                }
            },
            None => String::new(),
        };

        match kind {
            UploadKind::Push => client
                .send(&upload.upload_url, &token, families)
                .await
                .map_err(|e| e.to_string()),
            UploadKind::RemoteWrite => client
                .remote_write(&upload.upload_url, &token, families, &upload.cluster_id, config.interval)
                .await
                .map_err(|e| e.to_string()),
        }
    }

    async fn publish(&self, families: Vec<MetricFamily>) {
        self.snapshot.write().await.families = families;
    }

    async fn record_error(&self, error: String) {
        self.snapshot.write().await.last_forward_error = Some(error);
    }

    async fn set_state(&self, state: State) {
        self.snapshot.write().await.state = Some(state);
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(config: &Config) -> MetricsClient {
    MetricsClient::new(&config.from_tls, config.limit_bytes, config.interval)
        .expect("TLS configuration was already validated at startup")
}

fn build_authorizer(config: &Config) -> Option<Authorizer> {
    config.upload.as_ref().map(|upload| {
        Authorizer::new(
            upload.authorize_url.clone(),
            upload.authorization_token.clone(),
            upload.cluster_id.clone(),
        )
    })
}

fn build_pipeline(config: &Config) -> MultiTransformer {
    let mut stages: Vec<Box<dyn Transformer>> = Vec::new();
    if !config.labels.is_empty() {
        stages.push(Box::new(AddLabels::new(config.labels.clone())));
    }
    stages.push(Box::new(RenameMetrics::new(config.renames.clone())));
    stages.push(Box::new(DropInvalidFederateSamples::new()));
    if !config.anonymize_labels.is_empty() {
        stages.push(Box::new(Anonymize::new(
            config.anonymize_salt.clone(),
            config.anonymize_labels.clone(),
        )));
    }
    stages.push(Box::new(Pack::new()));
    stages.push(Box::new(Sort::new()));
    MultiTransformer::new(stages)
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as i64
}
