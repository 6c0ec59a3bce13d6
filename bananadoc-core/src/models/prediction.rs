use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classifier output plus the knowledge-base explanation for its label.
///
/// Every field defaults when absent so partially filled records coming from
/// clients (or older snapshot files) still deserialize.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionRecord {
    pub deficiency: String,
    /// Probability of `deficiency`, in `0.0..=1.0`.
    pub confidence: f64,
    pub symptoms: String,
    pub treatment: String,
    pub prevention: String,
    pub probabilities: BTreeMap<String, f64>,
}

impl PredictionRecord {
    pub fn new(deficiency: impl Into<String>, confidence: f64) -> Self {
        Self {
            deficiency: deficiency.into(),
            confidence,
            ..Self::default()
        }
    }

    /// Classes ranked by probability, highest first, truncated to `n`.
    ///
    /// Ties keep label order so the ranking is deterministic.
    pub fn top_probabilities(&self, n: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .probabilities
            .iter()
            .map(|(label, p)| (label.as_str(), *p))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }

    pub fn has_diagnosis(&self) -> bool {
        !self.deficiency.trim().is_empty()
    }
}

/// The stored prediction: the record as given plus the time it was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPrediction {
    pub timestamp: DateTime<Utc>,
    pub data: PredictionRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_probabilities_sorted_descending_and_truncated() {
        let mut record = PredictionRecord::new("Iron", 0.7);
        record.probabilities.insert("Boron".into(), 0.05);
        record.probabilities.insert("Iron".into(), 0.7);
        record.probabilities.insert("Zinc".into(), 0.15);
        record.probabilities.insert("Calcium".into(), 0.1);

        let top = record.top_probabilities(3);
        assert_eq!(top, vec![("Iron", 0.7), ("Zinc", 0.15), ("Calcium", 0.1)]);
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let record: PredictionRecord =
            serde_json::from_value(serde_json::json!({ "deficiency": "Zinc" })).unwrap();
        assert_eq!(record.deficiency, "Zinc");
        assert_eq!(record.confidence, 0.0);
        assert!(record.symptoms.is_empty());
        assert!(record.probabilities.is_empty());
    }
}
