use metrics_model::MetricFamily;
use sha2::{Digest, Sha256};

use super::{Error, Transformer};

/// Replaces the value of each listed label with a salted SHA-256 digest.
/// Values for the same label stay joinable against each other (same input,
/// same salt, same digest) without the original value ever leaving this
/// process.
pub struct Anonymize {
    salt: Vec<u8>,
    labels: Vec<String>,
}

impl Anonymize {
    pub fn new(salt: impl Into<Vec<u8>>, labels: Vec<String>) -> Self {
        Anonymize {
            salt: salt.into(),
            labels,
        }
    }

    fn digest(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.salt);
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl Transformer for Anonymize {
    fn transform(&mut self, family: &mut MetricFamily) -> Result<bool, Error> {
        for metric in &mut family.metrics {
            for name in &self.labels {
                if let Some(value) = metric.label(name) {
                    let digested = self.digest(value);
                    metric.set_label(name, &digested, true);
                }
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
    fn digest_is_deterministic_and_hides_the_value() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        let mut metric = Metric::new(MetricValue::Gauge(1.0));
        metric.set_label("instance", "10.0.0.1:9100", true);
        family.metrics.push(metric);

        let mut stage = Anonymize::new(b"pepper".to_vec(), vec!["instance".to_owned()]);
        stage.transform(&mut family).unwrap();
        let digested = family.metrics[0].label("instance").unwrap().to_owned();

        assert_ne!(digested, "10.0.0.1:9100");
        assert_eq!(digested.len(), 64);

        let mut again = MetricFamily::new("up", MetricType::Gauge);
        let mut metric = Metric::new(MetricValue::Gauge(1.0));
        metric.set_label("instance", "10.0.0.1:9100", true);
        again.metrics.push(metric);
        stage.transform(&mut again).unwrap();
        assert_eq!(again.metrics[0].label("instance").unwrap(), digested);
    }
}
