//! End-to-end scenarios against an in-process federation source, authorize
//! endpoint, and upload sink.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hyper::Uri;
use metrics_federator::client::{MetricsClient, TlsConfig};
use metrics_federator::config::Config;
use metrics_federator::test_util::federate_mock::FederateMock;
use metrics_federator::test_util::upload_mock::UploadMock;
use metrics_federator::transform::{
    AddLabels, DropInvalidFederateSamples, MultiTransformer, Pack, RenameMetrics, Sort, Transformer,
};
use metrics_model::{Metric, MetricFamily, MetricType, MetricValue};

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

fn base_config(from: Uri) -> Config {
    Config {
        from,
        from_bearer_token: None,
        from_tls: TlsConfig::default(),
        match_exprs: vec!["up".to_owned()],
        listen: "127.0.0.1:0".parse().unwrap(),
        interval: Duration::from_secs(270),
        limit_bytes: 200 * 1024,
        labels: vec![],
        renames: HashMap::new(),
        anonymize_labels: vec![],
        anonymize_salt: vec![],
        upload: None,
    }
}

fn pipeline(config: &Config) -> MultiTransformer {
    let mut stages: Vec<Box<dyn Transformer>> = Vec::new();
    if !config.labels.is_empty() {
        stages.push(Box::new(AddLabels::new(config.labels.clone())));
    }
    stages.push(Box::new(RenameMetrics::new(config.renames.clone())));
    stages.push(Box::new(DropInvalidFederateSamples::new()));
    stages.push(Box::new(Pack::new()));
    stages.push(Box::new(Sort::new()));
    MultiTransformer::new(stages)
}

fn gauge(name: &str, labels: &[(&str, &str)], value: f64, timestamp_ms: i64) -> MetricFamily {
    let mut family = MetricFamily::new(name, MetricType::Gauge);
    let mut metric = Metric::new(MetricValue::Gauge(value));
    metric.timestamp_ms = Some(timestamp_ms);
    for (name, value) in labels {
        metric.set_label(name, value, true);
    }
    family.metrics.push(metric);
    family
}

#[tokio::test]
async fn s1_passthrough_sorts_instances_within_one_family() {
    let now = now_ms();
    let federate = FederateMock::start(vec![
        gauge("up", &[("instance", "b")], 0.0, now),
        gauge("up", &[("instance", "a")], 1.0, now),
    ])
    .await;

    let config = base_config(federate.uri.clone());
    let client = MetricsClient::new(&config.from_tls, config.limit_bytes, config.interval).unwrap();
    let families = client.retrieve(&config.from, &config.match_exprs, None).await.unwrap();

    let mut pipeline = pipeline(&config);
    let out = pipeline.apply(families, now - 60_000).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].name, "up");
    assert_eq!(out[0].metrics.len(), 2);
    assert_eq!(out[0].metrics[0].label("instance"), Some("a"));
    assert_eq!(out[0].metrics[1].label("instance"), Some("b"));
}

#[tokio::test]
async fn s2_label_add_and_rename() {
    let now = now_ms();
    let federate = FederateMock::start(vec![gauge("ALERTS", &[("alertname", "X")], 1.0, now)]).await;

    let mut config = base_config(federate.uri.clone());
    config.labels = vec![("cluster".to_owned(), "c1".to_owned())];
    config.renames = HashMap::from([("ALERTS".to_owned(), "alerts".to_owned())]);

    let client = MetricsClient::new(&config.from_tls, config.limit_bytes, config.interval).unwrap();
    let families = client.retrieve(&config.from, &config.match_exprs, None).await.unwrap();

    let mut pipeline = pipeline(&config);
    let out = pipeline.apply(families, now - 60_000).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].name, "alerts");
    let metric = &out[0].metrics[0];
    assert_eq!(metric.label("alertname"), Some("X"));
    assert_eq!(metric.label("cluster"), Some("c1"));
}

#[tokio::test]
async fn s3_drop_stale_leaves_an_empty_output() {
    let now = now_ms();
    let stale = now - Duration::from_secs(25 * 3600).as_millis() as i64;
    let federate = FederateMock::start(vec![gauge("up", &[], 1.0, stale)]).await;

    let config = base_config(federate.uri.clone());
    let client = MetricsClient::new(&config.from_tls, config.limit_bytes, config.interval).unwrap();
    let families = client.retrieve(&config.from, &config.match_exprs, None).await.unwrap();

    let mut pipeline = pipeline(&config);
    let out = pipeline.apply(families, now - Duration::from_secs(24 * 3600).as_millis() as i64).unwrap();

    assert!(out.is_empty());
}

#[tokio::test]
async fn s4_limit_enforcement_truncates_without_error() {
    let now = now_ms();
    let many: Vec<MetricFamily> = (0..5000)
        .map(|i| gauge("up", &[("instance", &format!("inst-{i}"))], 1.0, now))
        .collect();
    let federate = FederateMock::start(many).await;

    let mut config = base_config(federate.uri.clone());
    config.limit_bytes = 4096;
    let client = MetricsClient::new(&config.from_tls, config.limit_bytes, config.interval).unwrap();

    let families = client
        .retrieve(&config.from, &config.match_exprs, None)
        .await
        .expect("truncation is not an error");
    assert!(!families.is_empty());
    assert!(families.len() < 5000);
}

#[tokio::test]
async fn s5_remote_write_chunks_at_ten_thousand_series() {
    let upload = UploadMock::start().await;

    let mut family = MetricFamily::new("up", MetricType::Gauge);
    for i in 0..25_001 {
        let mut metric = Metric::new(MetricValue::Gauge(1.0));
        metric.set_label("instance", &format!("inst-{i}"), true);
        metric.timestamp_ms = Some(now_ms());
        family.metrics.push(metric);
    }

    let client = MetricsClient::new(&TlsConfig::default(), 200 * 1024, Duration::from_secs(600)).unwrap();

    client
        .remote_write(&upload.uri, "upload-token-for-cluster-1", &[family], "cluster-1", Duration::from_secs(600))
        .await
        .unwrap();

    let requests = upload.uploads().await;
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn s6_reload_reads_the_new_match_rule_before_the_next_scrape() {
    use metrics_federator::worker;

    let now = now_ms();
    let federate = FederateMock::start(vec![gauge("up", &[], 1.0, now)]).await;

    let mut config = base_config(federate.uri.clone());
    config.interval = Duration::from_millis(30);
    let (reconfigure_tx, reconfigure_rx) = worker::reconfigure_channel();
    let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    let worker = worker::Worker::new();
    let handle = tokio::spawn(worker.run(config, reconfigure_rx, cancel_rx));

    // Let the first tick (with the original `up` rule) fire.
    tokio::time::sleep(Duration::from_millis(15)).await;

    let mut new_config = base_config(federate.uri.clone());
    new_config.interval = Duration::from_millis(30);
    new_config.match_exprs = vec!["new_rule".to_owned()];
    worker::send_reconfigure(&reconfigure_tx, new_config).await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    handle.abort();

    let seen = federate.requests().await;
    assert!(
        seen.iter().any(|r| r.query.as_deref().unwrap_or_default().contains("new_rule")),
        "expected a scrape with the reloaded match rule, got {seen:?}"
    );
}
