//! The transform pipeline: a fixed, ordered chain of `Transformer`s applied
//! to every family scraped from the federation endpoint before it is
//! forwarded. Installed left to right as `label → rename →
//! drop_invalid_federate_samples → anonymize → pack → sort`.

mod anonymize;
mod drop_invalid;
mod label;
mod pack;
mod rename;
mod sort;

pub use anonymize::Anonymize;
pub use drop_invalid::DropInvalidFederateSamples;
pub use label::AddLabels;
pub use pack::Pack;
pub use rename::RenameMetrics;
pub use sort::Sort;

use metrics_model::MetricFamily;

#[derive(Debug, snafu::Snafu)]
pub enum Error {
    #[snafu(display("transform failed: {}", message))]
    Failed { message: String },
}

/// A single stage of the transform pipeline.
///
/// `transform` runs once per scraped family, in scrape order, and may drop
/// the family by returning `Ok(false)`. `finish` runs once per forward
/// attempt after every family has gone through every stage's `transform`,
/// and may replace the whole list — this is how `Pack` collapses
/// same-named families accumulated across a chunked scrape, and how `Sort`
/// orders the final family list by name.
pub trait Transformer: Send {
    fn transform(&mut self, family: &mut MetricFamily) -> Result<bool, Error>;

    fn finish(&mut self, families: Vec<MetricFamily>) -> Result<Vec<MetricFamily>, Error> {
        Ok(families)
    }

    /// Called once at the start of a forward attempt, before any family
    /// passes through `transform`. `min_time_ms` is the attempt-scoped
    /// floor below which federated samples are considered stale; only
    /// `DropInvalidFederateSamples` currently reads it.
    fn begin(&mut self, min_time_ms: i64) {
        let _ = min_time_ms;
    }
}

pub struct MultiTransformer {
    stages: Vec<Box<dyn Transformer>>,
}

impl MultiTransformer {
    pub fn new(stages: Vec<Box<dyn Transformer>>) -> Self {
        MultiTransformer { stages }
    }

    pub fn apply(
        &mut self,
        families: Vec<MetricFamily>,
        min_time_ms: i64,
    ) -> Result<Vec<MetricFamily>, Error> {
        for stage in &mut self.stages {
            stage.begin(min_time_ms);
        }

        let mut kept = Vec::with_capacity(families.len());
        for mut family in families {
            let mut keep = true;
            for stage in &mut self.stages {
                if !keep {
                    break;
                }
                keep = stage.transform(&mut family)?;
            }
            if keep {
                kept.push(family);
            }
        }

        for stage in &mut self.stages {
            kept = stage.finish(kept)?;
        }

        Ok(kept)
    }
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
    fn composes_label_rename_pack_and_sort() {
        let mut renames = std::collections::HashMap::new();
        renames.insert("ALERTS".to_owned(), "alerts".to_owned());

        let mut pipeline = MultiTransformer::new(vec![
            Box::new(AddLabels::new(vec![("cluster".to_owned(), "prod".to_owned())])),
            Box::new(RenameMetrics::new(renames)),
            Box::new(Pack::new()),
            Box::new(Sort::new()),
        ]);

        let input = vec![family("zeta", "a"), family("ALERTS", "b"), family("zeta", "c")];
        let out = pipeline.apply(input, 0).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "alerts");
        assert_eq!(out[1].name, "zeta");
        assert_eq!(out[1].metrics.len(), 2);
        for metric in &out[1].metrics {
            assert_eq!(metric.label("cluster"), Some("prod"));
        }
    }
}
