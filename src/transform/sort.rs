use metrics_model::MetricFamily;

use super::{Error, Transformer};

/// Sorts each family's metrics by label set, then sorts the family list by
/// name. Run last so the forwarded payload is deterministic regardless of
/// the order the federation endpoint happened to emit things in.
#[derive(Default)]
pub struct Sort;

impl Sort {
    pub fn new() -> Self {
        Sort
    }
}

impl Transformer for Sort {
    fn transform(&mut self, family: &mut MetricFamily) -> Result<bool, Error> {
        family.sort_metrics();
        Ok(true)
    }

    fn finish(&mut self, mut families: Vec<MetricFamily>) -> Result<Vec<MetricFamily>, Error> {
        // Sorted again here, not just in `transform`: an absorbing stage
        // earlier in the pipeline (e.g. `Pack`) can hand a family to
        // `finish` without it ever reaching our own `transform`.
        for family in &mut families {
            family.sort_metrics();
        }
        families.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(families)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use metrics_model::{Metric, MetricType, MetricValue};

    #[test]
    fn sorts_families_by_name_and_metrics_by_label() {
        let mut stage = Sort::new();
        let mut zeta = MetricFamily::new("zeta", MetricType::Gauge);
        let mut b = Metric::new(MetricValue::Gauge(0.0));
        b.set_label("instance", "b", true);
        let mut a = Metric::new(MetricValue::Gauge(1.0));
        a.set_label("instance", "a", true);
        zeta.metrics.push(b);
        zeta.metrics.push(a);
        stage.transform(&mut zeta).unwrap();
        assert_eq!(zeta.metrics[0].label("instance"), Some("a"));

        let alpha = MetricFamily::new("alpha", MetricType::Gauge);
        let out = stage.finish(vec![zeta, alpha]).unwrap();
        assert_eq!(out[0].name, "alpha");
        assert_eq!(out[1].name, "zeta");
    }

    #[test]
    fn finish_sorts_metrics_even_when_transform_never_ran() {
        let mut zeta = MetricFamily::new("zeta", MetricType::Gauge);
        let mut b = Metric::new(MetricValue::Gauge(0.0));
        b.set_label("instance", "b", true);
        let mut a = Metric::new(MetricValue::Gauge(1.0));
        a.set_label("instance", "a", true);
        zeta.metrics.push(b);
        zeta.metrics.push(a);

        let mut stage = Sort::new();
        let out = stage.finish(vec![zeta]).unwrap();
        assert_eq!(out[0].metrics[0].label("instance"), Some("a"));
    }
}
