//! Leaf classifier: ONNX inference via `ort`
//!
//! The model takes one `[1, 224, 224, 3]` float tensor (see [`crate::imaging`])
//! and returns one softmax probability per class. Class indices are mapped to
//! labels through a `class_mapping.txt` file of `index: Label` lines.

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::ModelConfig;
use crate::imaging;
use crate::knowledge;
use crate::models::PredictionRecord;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model file not found: {path}")]
    ModelNotFound { path: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model returned no class probabilities")]
    EmptyOutput,
}

/// Labels used when no mapping file is present. The shipped model has no
/// Sulphur class.
const DEFAULT_LABELS: [&str; 8] = [
    "Boron",
    "Calcium",
    "Healthy",
    "Iron",
    "Magnesium",
    "Manganese",
    "Potassium",
    "Zinc",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMapping {
    labels: BTreeMap<usize, String>,
}

impl Default for ClassMapping {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS
                .iter()
                .enumerate()
                .map(|(i, l)| (i, l.to_string()))
                .collect(),
        }
    }
}

impl ClassMapping {
    /// Parse `index: Label` lines. Blank and malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let labels = text
            .lines()
            .filter_map(|line| {
                let (idx, label) = line.trim().split_once(':')?;
                let idx = idx.trim().parse().ok()?;
                let label = label.trim();
                (!label.is_empty()).then(|| (idx, label.to_string()))
            })
            .collect();
        Self { labels }
    }

    /// Load from `path`, or fall back to the built-in mapping when the file
    /// is missing or yields no labels.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let mapping = Self::parse(&text);
                if mapping.labels.is_empty() {
                    tracing::warn!(path = %path.display(), "Class mapping is empty, using defaults");
                    Self::default()
                } else {
                    tracing::info!(path = %path.display(), classes = mapping.labels.len(), "Loaded class mapping");
                    mapping
                }
            }
            Err(e) => {
                tracing::info!(path = %path.display(), error = %e, "No class mapping file, using defaults");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label_for(&self, index: usize) -> String {
        self.labels
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("Unknown class {index}"))
    }

    /// Every output score keyed by its label (`Class {i}` for unmapped indices).
    pub fn probabilities_by_label(&self, scores: &[f32]) -> BTreeMap<String, f64> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let label = self
                    .labels
                    .get(&i)
                    .cloned()
                    .unwrap_or_else(|| format!("Class {i}"));
                (label, f64::from(p))
            })
            .collect()
    }

    /// Turn raw model scores into a full prediction record: arg-max label,
    /// its confidence, knowledge-base text and all class probabilities.
    pub fn to_prediction(&self, scores: &[f32]) -> Result<PredictionRecord, ClassifierError> {
        let (best, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or(ClassifierError::EmptyOutput)?;

        let deficiency = self.label_for(best);
        let info = knowledge::info_for(&deficiency);

        let mut record = PredictionRecord::new(deficiency, f64::from(confidence));
        record.symptoms = info.symptoms.to_string();
        record.treatment = info.treatment.to_string();
        record.prevention = info.prevention.to_string();
        record.probabilities = self.probabilities_by_label(scores);
        Ok(record)
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Raw per-class scores for one preprocessed image tensor.
    async fn classify(&self, input: Vec<f32>) -> Result<Vec<f32>, ClassifierError>;

    fn mapping(&self) -> &ClassMapping;

    fn name(&self) -> &str;
}

/// Local ONNX Runtime classifier.
pub struct OnnxClassifier {
    session: Arc<Mutex<Session>>,
    mapping: ClassMapping,
    model_path: PathBuf,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("model_path", &self.model_path)
            .field("classes", &self.mapping.len())
            .finish_non_exhaustive()
    }
}

impl OnnxClassifier {
    /// Load the model and class mapping named in `config`.
    ///
    /// Returns `ClassifierError::ModelNotFound` if the model file is missing;
    /// a missing mapping file falls back to the built-in labels.
    pub fn new(config: &ModelConfig) -> Result<Self, ClassifierError> {
        let model_path = config.model_path();
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound {
                path: model_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(config.threads()))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let mapping = ClassMapping::load(&config.class_mapping_path());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            mapping,
            model_path,
        })
    }
}

#[async_trait]
impl Classifier for OnnxClassifier {
    async fn classify(&self, input: Vec<f32>) -> Result<Vec<f32>, ClassifierError> {
        // CPU-bound: keep it off the async workers.
        let session = Arc::clone(&self.session);

        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|e| ClassifierError::Inference(format!("session lock poisoned: {e}")))?;
            classify_sync(&mut guard, input)
        })
        .await
        .map_err(|e| ClassifierError::Inference(format!("spawn_blocking join error: {e}")))?
    }

    fn mapping(&self) -> &ClassMapping {
        &self.mapping
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

fn classify_sync(session: &mut Session, input: Vec<f32>) -> Result<Vec<f32>, ClassifierError> {
    let shape = imaging::input_shape();
    let expected: i64 = shape.iter().product();
    if input.len() as i64 != expected {
        return Err(ClassifierError::Inference(format!(
            "Expected {expected} input values, got {}",
            input.len()
        )));
    }

    let tensor = Tensor::from_array((shape, input))
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;

    let outputs = session
        .run(ort::inputs![tensor])
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;

    // [1, num_classes]
    let (_, scores) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| ClassifierError::Inference(e.to_string()))?;

    if scores.is_empty() {
        return Err(ClassifierError::EmptyOutput);
    }
    Ok(scores.to_vec())
}

/// Classifier returning the same scores for every image.
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    scores: Vec<f32>,
    mapping: ClassMapping,
}

impl FixedClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            mapping: ClassMapping::default(),
        }
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _input: Vec<f32>) -> Result<Vec<f32>, ClassifierError> {
        Ok(self.scores.clone())
    }

    fn mapping(&self) -> &ClassMapping {
        &self.mapping
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_returns_error() {
        let config = ModelConfig {
            path: "/nonexistent/banana.onnx".to_string(),
            ..ModelConfig::default()
        };

        match OnnxClassifier::new(&config).unwrap_err() {
            ClassifierError::ModelNotFound { path } => {
                assert!(path.contains("nonexistent"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_parse_mapping_file() {
        let mapping = ClassMapping::parse("0: Boron\n1: Calcium\n\nbad line\n8: Sulphur\n");
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.label_for(8), "Sulphur");
        assert_eq!(mapping.label_for(5), "Unknown class 5");
    }

    #[test]
    fn test_missing_mapping_uses_defaults() {
        let mapping = ClassMapping::load(Path::new("/nonexistent/class_mapping.txt"));
        assert_eq!(mapping, ClassMapping::default());
        assert_eq!(mapping.len(), 8);
        assert_eq!(mapping.label_for(3), "Iron");
        assert_eq!(mapping.label_for(7), "Zinc");
    }

    #[test]
    fn test_to_prediction_picks_arg_max() {
        let mapping = ClassMapping::default();
        let scores = [0.0, 0.0, 0.125, 0.75, 0.0, 0.0, 0.0, 0.125];

        let record = mapping.to_prediction(&scores).unwrap();
        assert_eq!(record.deficiency, "Iron");
        assert_eq!(record.confidence, 0.75);
        assert!(record.treatment.contains("iron"), "{}", record.treatment);
        assert_eq!(record.probabilities.len(), 8);
        assert_eq!(record.probabilities["Zinc"], 0.125);
    }

    #[test]
    fn test_unmapped_output_index_gets_placeholder_label() {
        let mapping = ClassMapping::parse("0: Boron\n");
        let probs = mapping.probabilities_by_label(&[0.25, 0.75]);
        assert_eq!(probs["Boron"], 0.25);
        assert_eq!(probs["Class 1"], 0.75);
    }

    #[test]
    fn test_empty_scores_rejected() {
        assert!(matches!(
            ClassMapping::default().to_prediction(&[]),
            Err(ClassifierError::EmptyOutput)
        ));
    }

    #[tokio::test]
    async fn test_fixed_classifier() {
        let classifier = FixedClassifier::new(vec![0.5, 0.5]);
        let scores = classifier.classify(vec![0.0; 4]).await.unwrap();
        assert_eq!(scores, vec![0.5, 0.5]);
    }
}
