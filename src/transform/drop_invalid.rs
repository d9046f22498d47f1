use metrics_model::MetricFamily;

use super::{Error, Transformer};

/// Drops any federated sample timestamped before the current forward
/// attempt's floor. A federation endpoint that just restarted, or that is
/// still holding samples from before a scrape config reload, can otherwise
/// resurrect stale data well after it should have aged out upstream.
#[derive(Default)]
pub struct DropInvalidFederateSamples {
    min_time_ms: i64,
}

impl DropInvalidFederateSamples {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for DropInvalidFederateSamples {
    fn begin(&mut self, min_time_ms: i64) {
        self.min_time_ms = min_time_ms;
    }

    fn transform(&mut self, family: &mut MetricFamily) -> Result<bool, Error> {
        let floor = self.min_time_ms;
        family.metrics.retain(|m| is_valid(m, floor));
        Ok(!family.is_empty())
    }
}

/// A sample is valid if it has a timestamp no older than `floor`, its value
/// (when it has a single one) isn't NaN, and any `le`/`quantile` label it
/// carries parses as a float (`+Inf` included, for `le`).
fn is_valid(metric: &metrics_model::Metric, floor: i64) -> bool {
    let Some(ts) = metric.timestamp_ms else {
        return false;
    };
    if ts < floor {
        return false;
    }
    if metric.value.as_f64().is_some_and(f64::is_nan) {
        return false;
    }
    for label in ["le", "quantile"] {
        if let Some(value) = metric.label(label) {
            if value.parse::<f64>().is_err() {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use metrics_model::{Metric, MetricType, MetricValue};

    #[test]
    fn drops_stale_samples_and_empties_family() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        let mut stale = Metric::new(MetricValue::Gauge(1.0));
        stale.timestamp_ms = Some(10);
        family.metrics.push(stale);

        let mut stage = DropInvalidFederateSamples::new();
        stage.begin(1_000);
        assert!(!stage.transform(&mut family).unwrap());
        assert!(family.is_empty());
    }

    #[test]
    fn drops_samples_without_a_timestamp() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(Metric::new(MetricValue::Gauge(1.0)));

        let mut stage = DropInvalidFederateSamples::new();
        stage.begin(1_000_000);
        assert!(!stage.transform(&mut family).unwrap());
        assert!(family.is_empty());
    }

    #[test]
    fn drops_nan_values() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        let mut nan = Metric::new(MetricValue::Gauge(f64::NAN));
        nan.timestamp_ms = Some(2_000);
        family.metrics.push(nan);

        let mut stage = DropInvalidFederateSamples::new();
        stage.begin(1_000);
        assert!(!stage.transform(&mut family).unwrap());
        assert!(family.is_empty());
    }

    #[test]
    fn drops_unparseable_le_and_quantile_labels() {
        let mut family = MetricFamily::new("http_duration_bucket", MetricType::Gauge);
        let mut bad_bucket = Metric::new(MetricValue::Gauge(1.0));
        bad_bucket.timestamp_ms = Some(2_000);
        bad_bucket.set_label("le", "not-a-float", true);
        family.metrics.push(bad_bucket);

        let mut good = Metric::new(MetricValue::Gauge(1.0));
        good.timestamp_ms = Some(2_000);
        good.set_label("le", "+Inf", true);
        family.metrics.push(good.clone());

        let mut stage = DropInvalidFederateSamples::new();
        stage.begin(1_000);
        assert!(stage.transform(&mut family).unwrap());
        assert_eq!(family.metrics, vec![good]);
    }

    #[test]
    fn keeps_fresh_samples_with_a_timestamp() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        let mut fresh = Metric::new(MetricValue::Gauge(1.0));
        fresh.timestamp_ms = Some(2_000);
        family.metrics.push(fresh);

        let mut stage = DropInvalidFederateSamples::new();
        stage.begin(1_000);
        assert!(stage.transform(&mut family).unwrap());
        assert_eq!(family.metrics.len(), 1);
    }
}
