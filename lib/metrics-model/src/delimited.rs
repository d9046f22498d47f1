//! Delimited-protobuf codec: `io.prometheus.client.MetricFamily` messages as
//! used by the federation endpoint's protobuf content type and the push
//! (`Send`) upload path, plus conversion to `prometheus.WriteRequest`
//! timeseries for the `RemoteWrite` upload path.

use bytes::{Buf, Bytes};
use prost::Message;

use crate::model::{
    HistogramBucket, HistogramValue, Label, Metric, MetricFamily, MetricType, MetricValue,
    SummaryQuantile, SummaryValue, METRIC_NAME_LABEL,
};
use crate::proto::{client_model, prometheus_remote};

/// Encodes each family as a varint-length-prefixed `MetricFamily` message,
/// concatenated in order. This is the wire format a federation endpoint
/// emits for `Accept: application/vnd.google.protobuf` and the one the
/// push upload path re-encodes into.
pub fn encode_delimited(families: &[MetricFamily]) -> Vec<u8> {
    let mut buf = Vec::new();
    for family in families {
        to_proto_family(family)
            .encode_length_delimited(&mut buf)
            .expect("Vec<u8> grows without bound");
    }
    buf
}

/// Decodes a stream of delimited `MetricFamily` messages.
pub fn decode_delimited(bytes: &[u8]) -> Result<Vec<MetricFamily>, prost::DecodeError> {
    let mut buf = Bytes::copy_from_slice(bytes);
    let mut families = Vec::new();
    while buf.has_remaining() {
        let proto = client_model::MetricFamily::decode_length_delimited(&mut buf)?;
        families.push(from_proto_family(proto));
    }
    Ok(families)
}

fn to_proto_type(t: MetricType) -> client_model::MetricType {
    match t {
        MetricType::Counter => client_model::MetricType::Counter,
        MetricType::Gauge => client_model::MetricType::Gauge,
        MetricType::Untyped => client_model::MetricType::Untyped,
        MetricType::Summary => client_model::MetricType::Summary,
        MetricType::Histogram => client_model::MetricType::Histogram,
    }
}

fn to_proto_family(family: &MetricFamily) -> client_model::MetricFamily {
    client_model::MetricFamily {
        name: Some(family.name.clone()),
        help: family.help.clone(),
        r#type: Some(to_proto_type(family.metric_type) as i32),
        metric: family.metrics.iter().map(to_proto_metric).collect(),
    }
}

fn to_proto_metric(metric: &Metric) -> client_model::Metric {
    let label = metric
        .labels
        .iter()
        .map(|l| client_model::LabelPair {
            name: Some(l.name.clone()),
            value: Some(l.value.clone()),
        })
        .collect();

    let mut proto = client_model::Metric {
        label,
        timestamp_ms: metric.timestamp_ms,
        ..Default::default()
    };
    match &metric.value {
        MetricValue::Counter(v) => proto.counter = Some(client_model::Counter { value: Some(*v) }),
        MetricValue::Gauge(v) => proto.gauge = Some(client_model::Gauge { value: Some(*v) }),
        MetricValue::Untyped(v) => proto.untyped = Some(client_model::Untyped { value: Some(*v) }),
        MetricValue::Histogram(hv) => {
            proto.histogram = Some(client_model::Histogram {
                sample_count: Some(hv.sample_count),
                sample_sum: Some(hv.sample_sum),
                bucket: hv
                    .buckets
                    .iter()
                    .map(|b| client_model::Bucket {
                        cumulative_count: Some(b.cumulative_count),
                        upper_bound: Some(b.upper_bound),
                    })
                    .collect(),
            })
        }
        MetricValue::Summary(sv) => {
            proto.summary = Some(client_model::Summary {
                sample_count: Some(sv.sample_count),
                sample_sum: Some(sv.sample_sum),
                quantile: sv
                    .quantiles
                    .iter()
                    .map(|q| client_model::Quantile {
                        quantile: Some(q.quantile),
                        value: Some(q.value),
                    })
                    .collect(),
            })
        }
    }
    proto
}

fn from_proto_family(f: client_model::MetricFamily) -> MetricFamily {
    let metric_type = match f.r#type.and_then(client_model::MetricType::from_i32) {
        Some(client_model::MetricType::Counter) => MetricType::Counter,
        Some(client_model::MetricType::Gauge) => MetricType::Gauge,
        Some(client_model::MetricType::Summary) => MetricType::Summary,
        Some(client_model::MetricType::Histogram) => MetricType::Histogram,
        _ => MetricType::Untyped,
    };
    let mut family = MetricFamily::new(f.name.unwrap_or_default(), metric_type);
    family.help = f.help;
    family.metrics = f.metric.into_iter().map(from_proto_metric).collect();
    family
}

fn from_proto_metric(m: client_model::Metric) -> Metric {
    let labels = m
        .label
        .into_iter()
        .map(|l| Label::new(l.name.unwrap_or_default(), l.value.unwrap_or_default()))
        .collect();

    let value = if let Some(c) = m.counter {
        MetricValue::Counter(c.value.unwrap_or_default())
    } else if let Some(g) = m.gauge {
        MetricValue::Gauge(g.value.unwrap_or_default())
    } else if let Some(u) = m.untyped {
        MetricValue::Untyped(u.value.unwrap_or_default())
    } else if let Some(h) = m.histogram {
        MetricValue::Histogram(HistogramValue {
            sample_count: h.sample_count.unwrap_or_default(),
            sample_sum: h.sample_sum.unwrap_or_default(),
            buckets: h
                .bucket
                .into_iter()
                .map(|b| HistogramBucket {
                    upper_bound: b.upper_bound.unwrap_or_default(),
                    cumulative_count: b.cumulative_count.unwrap_or_default(),
                })
                .collect(),
        })
    } else if let Some(s) = m.summary {
        MetricValue::Summary(SummaryValue {
            sample_count: s.sample_count.unwrap_or_default(),
            sample_sum: s.sample_sum.unwrap_or_default(),
            quantiles: s
                .quantile
                .into_iter()
                .map(|q| SummaryQuantile {
                    quantile: q.quantile.unwrap_or_default(),
                    value: q.value.unwrap_or_default(),
                })
                .collect(),
        })
    } else {
        MetricValue::Untyped(0.0)
    };

    Metric {
        labels,
        timestamp_ms: m.timestamp_ms,
        value,
    }
}

/// Flattens the simple-valued metrics (`Counter`/`Gauge`/`Untyped`) across
/// `families` into remote-write timeseries, one sample each, carrying the
/// family name as the `__name__` label. Histogram and summary metrics have
/// no single value to carry and are skipped, not errored — federated
/// Prometheus endpoints routinely include runtime histograms that were
/// never meant to leave the cluster as raw series.
pub fn to_timeseries(families: &[MetricFamily], cluster_id: &str) -> Vec<prometheus_remote::TimeSeries> {
    let mut series = Vec::new();
    for family in families {
        for metric in &family.metrics {
            let Some(value) = metric.value.as_f64() else {
                continue;
            };
            let mut labels = Vec::with_capacity(metric.labels.len() + 2);
            labels.push(prometheus_remote::Label {
                name: METRIC_NAME_LABEL.to_owned(),
                value: family.name.clone(),
            });
            if !cluster_id.is_empty() {
                labels.push(prometheus_remote::Label {
                    name: "cluster".to_owned(),
                    value: cluster_id.to_owned(),
                });
            }
            for l in &metric.labels {
                labels.push(prometheus_remote::Label {
                    name: l.name.clone(),
                    value: l.value.clone(),
                });
            }
            series.push(prometheus_remote::TimeSeries {
                labels,
                samples: vec![prometheus_remote::Sample {
                    value,
                    timestamp: metric.timestamp_ms.unwrap_or(0),
                }],
            });
        }
    }
    series
}
