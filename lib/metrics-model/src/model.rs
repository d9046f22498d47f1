//! In-memory representation of Prometheus exposition families, metrics,
//! labels, and samples. Pure data: no I/O lives here.

/// A label name matching `[a-zA-Z_][a-zA-Z0-9_]*`. `__name__` is reserved
/// and is never stored as a `Label` on a `Metric` — it is encoded by the
/// family's `name` instead.
pub const METRIC_NAME_LABEL: &str = "__name__";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Label {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Returns true if `name` matches `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Untyped,
    Summary,
    Histogram,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramBucket {
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramValue {
    pub sample_count: u64,
    pub sample_sum: f64,
    pub buckets: Vec<HistogramBucket>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryQuantile {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryValue {
    pub sample_count: u64,
    pub sample_sum: f64,
    pub quantiles: Vec<SummaryQuantile>,
}

/// Exactly one of these is carried by a `Metric`, consistent with the
/// family's declared `MetricType`. Only `Counter`/`Gauge`/`Untyped` are
/// ever produced by the scrape path; `Histogram`/`Summary` values are
/// carried through unchanged when a passthrough family happens to be one.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    Untyped(f64),
    Histogram(HistogramValue),
    Summary(SummaryValue),
}

impl MetricValue {
    /// The plain sample value, for the three simple kinds. `None` for
    /// histograms and summaries, which have no single value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Counter(v) | MetricValue::Gauge(v) | MetricValue::Untyped(v) => Some(*v),
            MetricValue::Histogram(_) | MetricValue::Summary(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Unique by name; `__name__` never appears here.
    pub labels: Vec<Label>,
    pub timestamp_ms: Option<i64>,
    pub value: MetricValue,
}

impl Metric {
    pub fn new(value: MetricValue) -> Self {
        Metric {
            labels: Vec::new(),
            timestamp_ms: None,
            value,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Sets `name` to `value`. If the label already exists, it is replaced
    /// only when `overwrite` is true (or there was no prior value).
    pub fn set_label(&mut self, name: &str, value: &str, overwrite: bool) {
        if name == METRIC_NAME_LABEL {
            return;
        }
        if let Some(existing) = self.labels.iter_mut().find(|l| l.name == name) {
            if overwrite {
                existing.value = value.to_owned();
            }
        } else {
            self.labels.push(Label::new(name, value));
        }
    }

    pub fn remove_label(&mut self, name: &str) -> Option<Label> {
        let idx = self.labels.iter().position(|l| l.name == name)?;
        Some(self.labels.remove(idx))
    }

    /// Sort key used by the `Sort` transformer: the lexicographic order of
    /// (name, value) tuples across all labels.
    pub fn sort_key(&self) -> Vec<(&str, &str)> {
        let mut key: Vec<(&str, &str)> = self
            .labels
            .iter()
            .map(|l| (l.name.as_str(), l.value.as_str()))
            .collect();
        key.sort_unstable();
        key
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: Option<String>,
    pub metric_type: MetricType,
    pub metrics: Vec<Metric>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        MetricFamily {
            name: name.into(),
            help: None,
            metric_type,
            metrics: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Sorts this family's metrics by their label sort key. Stable.
    pub fn sort_metrics(&mut self) {
        self.metrics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }
}
