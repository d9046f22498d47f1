use std::collections::HashMap;

use metrics_model::MetricFamily;

use super::{Error, Transformer};

/// Renames a family in place according to a fixed old-name → new-name
/// table. Families not present in the table pass through unchanged. The
/// CLI defaults this to `{"ALERTS": "alerts"}` when no `--rename` flags are
/// given at all.
pub struct RenameMetrics {
    renames: HashMap<String, String>,
}

impl RenameMetrics {
    pub fn new(renames: HashMap<String, String>) -> Self {
        RenameMetrics { renames }
    }
}

impl Transformer for RenameMetrics {
    fn transform(&mut self, family: &mut MetricFamily) -> Result<bool, Error> {
        if let Some(new_name) = self.renames.get(&family.name) {
            family.name = new_name.clone();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use metrics_model::MetricType;

    #[test]
    fn renames_matching_family_only() {
        let mut renames = HashMap::new();
        renames.insert("ALERTS".to_owned(), "alerts".to_owned());
        let mut stage = RenameMetrics::new(renames);

        let mut alerts = MetricFamily::new("ALERTS", MetricType::Gauge);
        stage.transform(&mut alerts).unwrap();
        assert_eq!(alerts.name, "alerts");

        let mut other = MetricFamily::new("up", MetricType::Gauge);
        stage.transform(&mut other).unwrap();
        assert_eq!(other.name, "up");
    }
}
