use metrics_model::MetricFamily;

use super::{Error, Transformer};

/// Sets (overwriting any existing value) a fixed set of labels on every
/// metric in every family. Configured from `--label name=value` flags.
pub struct AddLabels {
    labels: Vec<(String, String)>,
}

impl AddLabels {
    pub fn new(labels: Vec<(String, String)>) -> Self {
        AddLabels { labels }
    }
}

impl Transformer for AddLabels {
    fn transform(&mut self, family: &mut MetricFamily) -> Result<bool, Error> {
        for metric in &mut family.metrics {
            for (name, value) in &self.labels {
                metric.set_label(name, value, true);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use metrics_model::{Metric, MetricType, MetricValue};

    #[test]
    fn overwrites_existing_values() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        let mut metric = Metric::new(MetricValue::Gauge(1.0));
        metric.set_label("cluster", "old", true);
        family.metrics.push(metric);

        let mut stage = AddLabels::new(vec![("cluster".to_owned(), "new".to_owned())]);
        assert!(stage.transform(&mut family).unwrap());
        assert_eq!(family.metrics[0].label("cluster"), Some("new"));
    }
}
