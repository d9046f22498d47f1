use std::collections::{HashMap, HashSet};

use metrics_model::MetricFamily;

use super::{Error, Transformer};

/// Collapses families of the same name into one, deduplicating metrics by
/// their full label set (first occurrence wins). A chunked delimited-
/// protobuf scrape can legally repeat the same family header across
/// chunks; downstream consumers expect one `MetricFamily` per name.
#[derive(Default)]
pub struct Pack {
    order: Vec<String>,
    by_name: HashMap<String, MetricFamily>,
}

impl Pack {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for Pack {
    fn transform(&mut self, family: &mut MetricFamily) -> Result<bool, Error> {
        let name = family.name.clone();
        match self.by_name.get_mut(&name) {
            Some(existing) => {
                if existing.help.is_none() {
                    existing.help = family.help.clone();
                }
                let mut seen: HashSet<Vec<(String, String)>> = existing
                    .metrics
                    .iter()
                    .map(owned_sort_key)
                    .collect();
                for metric in family.metrics.drain(..) {
                    let key = owned_sort_key(&metric);
                    if seen.insert(key) {
                        existing.metrics.push(metric);
                    }
                }
            }
            None => {
                self.order.push(name.clone());
                let empty = MetricFamily::new(String::new(), family.metric_type);
                self.by_name.insert(name, std::mem::replace(family, empty));
            }
        }
        // The family is always absorbed into internal storage; `finish`
        // emits the packed result.
        Ok(false)
    }

    fn finish(&mut self, _families: Vec<MetricFamily>) -> Result<Vec<MetricFamily>, Error> {
        let order = std::mem::take(&mut self.order);
        let mut by_name = std::mem::take(&mut self.by_name);
        Ok(order.into_iter().filter_map(|name| by_name.remove(&name)).collect())
    }
}

fn owned_sort_key(metric: &metrics_model::Metric) -> Vec<(String, String)> {
    metric
        .sort_key()
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use metrics_model::{Metric, MetricType, MetricValue};

    fn family(name: &str, instance: &str) -> MetricFamily {
        let mut family = MetricFamily::new(name, MetricType::Gauge);
        let mut metric = Metric::new(MetricValue::Gauge(1.0));
        metric.set_label("instance", instance, true);
        family.metrics.push(metric);
        family
    }

    #[test]
    fn merges_same_name_families_and_dedupes_metrics() {
        let mut stage = Pack::new();
        let mut f1 = family("up", "a");
        let mut f2 = family("up", "a");
        let mut f3 = family("up", "b");
        assert!(!stage.transform(&mut f1).unwrap());
        assert!(!stage.transform(&mut f2).unwrap());
        assert!(!stage.transform(&mut f3).unwrap());

        let out = stage.finish(Vec::new()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metrics.len(), 2);
    }

    #[test]
    fn preserves_first_seen_family_order() {
        let mut stage = Pack::new();
        let mut zeta = family("zeta", "a");
        let mut alpha = family("alpha", "a");
        stage.transform(&mut zeta).unwrap();
        stage.transform(&mut alpha).unwrap();
        let out = stage.finish(Vec::new()).unwrap();
        assert_eq!(out[0].name, "zeta");
        assert_eq!(out[1].name, "alpha");
    }
}
