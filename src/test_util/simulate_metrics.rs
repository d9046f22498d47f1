//! Synthetic metric generator, ported from `pkg/simulator/simulator.go`.
//! Produces `SIMULATE_METRICS_NUM` metrics (env-overridable, default 1000)
//! of `SIMULATE_LABEL_NUM` labels each (default 10), grouped into families
//! of 1000 metrics apiece, used by load-oriented tests.

use std::env;

use metrics_model::{Metric, MetricFamily, MetricType, MetricValue};
use rand::Rng;

const DEFAULT_METRICS_NUMBER: usize = 1000;
const DEFAULT_LABEL_NUMBER: usize = 10;
const METRICS_NAME_PREFIX: &str = "simulated_metrics";
const LABEL_PREFIX: &str = "label";
const LABEL_VALUE_PREFIX: &str = "value";

pub fn simulate_metrics(now_unix_ms: i64) -> Vec<MetricFamily> {
    let metrics_number = env_usize("SIMULATE_METRICS_NUM").unwrap_or(DEFAULT_METRICS_NUMBER);
    let label_number = env_usize("SIMULATE_LABEL_NUM").unwrap_or(DEFAULT_LABEL_NUMBER);

    let mut families: Vec<MetricFamily> = Vec::new();
    let mut rng = rand::thread_rng();

    for i in 0..metrics_number {
        let family_name = format!("{METRICS_NAME_PREFIX}_{}", i / 1000);
        let family = match families.last_mut() {
            Some(family) if family.name == family_name => family,
            _ => {
                families.push(MetricFamily::new(family_name, MetricType::Untyped));
                families.last_mut().expect("just pushed")
            }
        };

        let mut metric = Metric::new(MetricValue::Untyped(rng.gen::<f64>()));
        metric.timestamp_ms = Some(now_unix_ms);
        for j in 0..label_number {
            let value = if j == 0 {
                format!("{LABEL_VALUE_PREFIX}-{}--{}", i / 10, i % 10)
            } else {
                format!("{LABEL_VALUE_PREFIX}-{}", i % 10)
            };
            metric.set_label(&format!("{LABEL_PREFIX}_{j}"), &value, true);
        }
        family.metrics.push(metric);
    }

    families
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn groups_metrics_into_families_of_a_thousand() {
        let families = simulate_metrics(0);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].metrics.len(), 1000);
    }

    #[test]
    fn first_label_encodes_tens_and_units_digits() {
        let families = simulate_metrics(0);
        let metric = &families[0].metrics[5];
        assert_eq!(metric.label("label_0"), Some("value-0--5"));
    }
}
