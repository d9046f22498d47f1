//! Prometheus text exposition format: parsing (`parse_text`) and encoding
//! (`write_text`), grouped at the family level.

use std::collections::{BTreeMap, HashMap};

use snafu::ResultExt;

use crate::line::{self, HelpHeader, Line, MetricKind, RawMetric, TypeHeader};
use crate::model::{
    HistogramBucket, HistogramValue, Label, Metric, MetricFamily, MetricType, MetricValue,
    SummaryQuantile, SummaryValue,
};

#[derive(Debug, snafu::Snafu, PartialEq)]
pub enum ParserError {
    #[snafu(display("{}, line: `{}`", kind, line))]
    WithLine {
        line: String,
        #[snafu(source)]
        kind: line::ErrorKind,
    },
    #[snafu(display("expected \"le\" label on a histogram bucket"))]
    ExpectedLeLabel,
    #[snafu(display("expected \"quantile\" label on a summary metric"))]
    ExpectedQuantileLabel,
    #[snafu(display("invalid le/quantile bound: {}", error))]
    InvalidBound {
        #[snafu(source)]
        error: line::ErrorKind,
    },
}

fn convert_kind(kind: MetricKind) -> MetricType {
    match kind {
        MetricKind::Counter => MetricType::Counter,
        MetricKind::Gauge => MetricType::Gauge,
        MetricKind::Histogram => MetricType::Histogram,
        MetricKind::Summary => MetricType::Summary,
        MetricKind::Untyped => MetricType::Untyped,
    }
}

#[derive(Debug, Eq, Hash, PartialEq, Clone)]
struct GroupKey {
    timestamp: Option<i64>,
    labels: BTreeMap<String, String>,
}

fn labels_vec(labels: BTreeMap<String, String>) -> Vec<Label> {
    labels.into_iter().map(|(k, v)| Label::new(k, v)).collect()
}

/// Appends `raw` to `family`, assuming `raw.name` already matches (a prefix
/// of) `family.name`. `groups` tracks, per histogram/summary family, which
/// metric index an (timestamp, labels) group maps to so that `_bucket`/
/// `_sum`/`_count` (or quantile) rows belonging to the same series collapse
/// into a single `Metric`.
fn push_into_family(
    family: &mut MetricFamily,
    groups: &mut HashMap<GroupKey, usize>,
    raw: RawMetric,
) -> Result<(), ParserError> {
    let suffix = raw.name[family.name.len()..].to_owned();
    let labels = raw.labels;

    match family.metric_type {
        MetricType::Counter | MetricType::Gauge | MetricType::Untyped => {
            let value = match family.metric_type {
                MetricType::Counter => MetricValue::Counter(raw.value),
                MetricType::Gauge => MetricValue::Gauge(raw.value),
                _ => MetricValue::Untyped(raw.value),
            };
            family.metrics.push(Metric {
                labels: labels_vec(labels),
                timestamp_ms: raw.timestamp,
                value,
            });
        }
        MetricType::Histogram => {
            let key = GroupKey {
                timestamp: raw.timestamp,
                labels: strip_bound_label(&labels, "le", suffix == "_bucket"),
            };
            let idx = *groups.entry(key.clone()).or_insert_with(|| {
                family.metrics.push(Metric {
                    labels: labels_vec(key.labels.clone()),
                    timestamp_ms: raw.timestamp,
                    value: MetricValue::Histogram(HistogramValue::default()),
                });
                family.metrics.len() - 1
            });
            let MetricValue::Histogram(hv) = &mut family.metrics[idx].value else {
                unreachable!("group index always points at a Histogram value")
            };
            match suffix.as_str() {
                "_bucket" => {
                    let bound_str = labels.get("le").cloned().ok_or(ParserError::ExpectedLeLabel)?;
                    let (_, bound) = RawMetric::parse_value(&bound_str)
                        .map_err(line::ErrorKind::from)
                        .context(InvalidBoundSnafu)?;
                    hv.buckets.push(HistogramBucket {
                        upper_bound: bound,
                        cumulative_count: raw.value as u64,
                    });
                }
                "_sum" => hv.sample_sum = raw.value,
                "_count" => hv.sample_count = raw.value as u64,
                _ => {}
            }
        }
        MetricType::Summary => {
            let key = GroupKey {
                timestamp: raw.timestamp,
                labels: strip_bound_label(&labels, "quantile", suffix.is_empty()),
            };
            let idx = *groups.entry(key.clone()).or_insert_with(|| {
                family.metrics.push(Metric {
                    labels: labels_vec(key.labels.clone()),
                    timestamp_ms: raw.timestamp,
                    value: MetricValue::Summary(SummaryValue::default()),
                });
                family.metrics.len() - 1
            });
            let MetricValue::Summary(sv) = &mut family.metrics[idx].value else {
                unreachable!("group index always points at a Summary value")
            };
            match suffix.as_str() {
                "" => {
                    let q_str = labels
                        .get("quantile")
                        .cloned()
                        .ok_or(ParserError::ExpectedQuantileLabel)?;
                    let (_, quantile) = RawMetric::parse_value(&q_str)
                        .map_err(line::ErrorKind::from)
                        .context(InvalidBoundSnafu)?;
                    sv.quantiles.push(SummaryQuantile {
                        quantile,
                        value: raw.value,
                    });
                }
                "_sum" => sv.sample_sum = raw.value,
                "_count" => sv.sample_count = raw.value as u64,
                _ => {}
            }
        }
    }
    Ok(())
}

/// Removes `bound_label` from `labels` when `should_have` is true (the
/// normal case), returning the remaining labels as the group key. When
/// `should_have` is false the label, if present, is left untouched since it
/// isn't actually a bound marker on this row.
fn strip_bound_label(
    labels: &BTreeMap<String, String>,
    bound_label: &str,
    should_have: bool,
) -> BTreeMap<String, String> {
    let mut remaining = labels.clone();
    if should_have {
        remaining.remove(bound_label);
    }
    remaining
}

/// Parse the given text input into its constituent metric families.
pub fn parse_text(input: &str) -> Result<Vec<MetricFamily>, ParserError> {
    let mut families: Vec<MetricFamily> = Vec::new();
    let mut groups: HashMap<GroupKey, usize> = HashMap::new();

    for line in input.lines() {
        let parsed = Line::parse(line).with_context(|_| WithLineSnafu {
            line: line.to_owned(),
        })?;
        match parsed {
            None => {}
            Some(Line::Help(HelpHeader { metric_name, text })) => {
                if let Some(last) = families.last_mut() {
                    if last.name == metric_name && last.is_empty() {
                        last.help = Some(text);
                        continue;
                    }
                }
                groups.clear();
                let mut family = MetricFamily::new(metric_name, MetricType::Untyped);
                family.help = Some(text);
                families.push(family);
            }
            Some(Line::Type(TypeHeader { metric_name, kind })) => {
                let metric_type = convert_kind(kind);
                if let Some(last) = families.last_mut() {
                    if last.name == metric_name && last.is_empty() {
                        last.metric_type = metric_type;
                        continue;
                    }
                }
                groups.clear();
                families.push(MetricFamily::new(metric_name, metric_type));
            }
            Some(Line::Metric(raw)) => {
                let belongs_to_last = families
                    .last()
                    .is_some_and(|f| raw.name.starts_with(&f.name));
                if !belongs_to_last {
                    groups.clear();
                    families.push(MetricFamily::new(raw.name.clone(), MetricType::Untyped));
                }
                let family = families.last_mut().expect("just pushed or matched");
                push_into_family(family, &mut groups, raw)?;
            }
        }
    }

    Ok(families)
}

/// Encodes `families` in Prometheus text exposition format, skipping empty
/// families. Used for `/federate` and the debug surface.
pub fn write_text(families: &[MetricFamily]) -> String {
    let mut out = String::new();
    for family in families {
        if family.is_empty() {
            continue;
        }
        if let Some(help) = &family.help {
            out.push_str(&format!("# HELP {} {}\n", family.name, help));
        }
        out.push_str(&format!("# TYPE {} {}\n", family.name, type_str(family.metric_type)));
        for metric in &family.metrics {
            write_metric_lines(&mut out, family, metric);
        }
    }
    out
}

fn type_str(t: MetricType) -> &'static str {
    match t {
        MetricType::Counter => "counter",
        MetricType::Gauge => "gauge",
        MetricType::Untyped => "untyped",
        MetricType::Summary => "summary",
        MetricType::Histogram => "histogram",
    }
}

fn write_label_set(out: &mut String, labels: &[Label], extra: Option<(&str, String)>) {
    if labels.is_empty() && extra.is_none() {
        return;
    }
    out.push('{');
    let mut first = true;
    for l in labels {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&format!("{}=\"{}\"", l.name, escape(&l.value)));
    }
    if let Some((name, value)) = extra {
        if !first {
            out.push(',');
        }
        out.push_str(&format!("{}=\"{}\"", name, value));
    }
    out.push('}');
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn write_sample(out: &mut String, name: &str, labels: &[Label], extra: Option<(&str, String)>, value: f64, ts: Option<i64>) {
    out.push_str(name);
    write_label_set(out, labels, extra);
    out.push(' ');
    out.push_str(&format_value(value));
    if let Some(ts) = ts {
        out.push(' ');
        out.push_str(&ts.to_string());
    }
    out.push('\n');
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_owned()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".to_owned() } else { "-Inf".to_owned() }
    } else {
        v.to_string()
    }
}

fn write_metric_lines(out: &mut String, family: &MetricFamily, metric: &Metric) {
    let name = &family.name;
    match &metric.value {
        MetricValue::Counter(v) | MetricValue::Gauge(v) | MetricValue::Untyped(v) => {
            write_sample(out, name, &metric.labels, None, *v, metric.timestamp_ms);
        }
        MetricValue::Histogram(hv) => {
            for bucket in &hv.buckets {
                write_sample(
                    out,
                    &format!("{name}_bucket"),
                    &metric.labels,
                    Some(("le", format_value(bucket.upper_bound))),
                    bucket.cumulative_count as f64,
                    metric.timestamp_ms,
                );
            }
            write_sample(out, &format!("{name}_sum"), &metric.labels, None, hv.sample_sum, metric.timestamp_ms);
            write_sample(out, &format!("{name}_count"), &metric.labels, None, hv.sample_count as f64, metric.timestamp_ms);
        }
        MetricValue::Summary(sv) => {
            for q in &sv.quantiles {
                write_sample(
                    out,
                    name,
                    &metric.labels,
                    Some(("quantile", format_value(q.quantile))),
                    q.value,
                    metric.timestamp_ms,
                );
            }
            write_sample(out, &format!("{name}_sum"), &metric.labels, None, sv.sample_sum, metric.timestamp_ms);
            write_sample(out, &format!("{name}_count"), &metric.labels, None, sv.sample_count as f64, metric.timestamp_ms);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_simple_gauge() {
        let input = "# HELP up target reachability\n# TYPE up gauge\nup{instance=\"a\"} 1 100\nup{instance=\"b\"} 0 100\n";
        let families = parse_text(input).unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, "up");
        assert_eq!(families[0].metric_type, MetricType::Gauge);
        assert_eq!(families[0].metrics.len(), 2);
        let rendered = write_text(&families);
        let reparsed = parse_text(&rendered).unwrap();
        assert_eq!(reparsed, families);
    }

    #[test]
    fn groups_histogram_buckets() {
        let input = concat!(
            "# TYPE http_request_duration_seconds histogram\n",
            "http_request_duration_seconds_bucket{le=\"0.1\"} 10\n",
            "http_request_duration_seconds_bucket{le=\"+Inf\"} 12\n",
            "http_request_duration_seconds_sum 1.5\n",
            "http_request_duration_seconds_count 12\n",
        );
        let families = parse_text(input).unwrap();
        assert_eq!(families.len(), 1);
        let metric = &families[0].metrics[0];
        let MetricValue::Histogram(hv) = &metric.value else {
            panic!("expected histogram value")
        };
        assert_eq!(hv.buckets.len(), 2);
        assert_eq!(hv.sample_count, 12);
        assert_eq!(hv.sample_sum, 1.5);
    }

    #[test]
    fn untyped_metric_without_header() {
        let families = parse_text("orphan_metric 42\n").unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].metric_type, MetricType::Untyped);
    }

    #[test]
    fn propagates_line_errors_with_context() {
        let err = parse_text("bad{label=} 1\n").unwrap_err();
        assert!(matches!(err, ParserError::WithLine { .. }));
    }
}
