//! Classifier adapter: a pre-trained multinomial logistic regression over
//! feature vectors, loaded once and shared read-only across requests.
//!
//! The serialized model (JSON) carries the feature layout it was trained
//! against; loading fails when that contract disagrees with this crate's
//! extractor, so a stale model can never silently misread a vector.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{FEATURE_DIM, FEATURE_VERSION, FeatureVector};

/// Confidence at or above which a diagnosis is graded high.
pub const GRADE_HIGH_THRESHOLD: f32 = 0.8;
/// Confidence at or above which a diagnosis is graded medium.
pub const GRADE_MEDIUM_THRESHOLD: f32 = 0.6;

/// Fault categories the system can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultLabel {
    /// Healthy compressor operation.
    Normal,
    /// Compressor running beyond rated load.
    Overload,
    /// Worn compressor or fan bearing.
    BearingWear,
    /// Faulty compressor valve.
    ValveFault,
    /// Unbalanced fan rotation.
    FanImbalance,
    /// Low refrigerant charge.
    RefrigerantLow,
    /// Refrigerant escaping the circuit.
    RefrigerantLeak,
    /// Loose or resonating mounting hardware.
    MountVibration,
    /// Electrical interference noise.
    ElectricalNoise,
}

impl FaultLabel {
    /// Every label the classifier can emit, in canonical order.
    pub const ALL: [FaultLabel; 9] = [
        FaultLabel::Normal,
        FaultLabel::Overload,
        FaultLabel::BearingWear,
        FaultLabel::ValveFault,
        FaultLabel::FanImbalance,
        FaultLabel::RefrigerantLow,
        FaultLabel::RefrigerantLeak,
        FaultLabel::MountVibration,
        FaultLabel::ElectricalNoise,
    ];

    /// Stable string id used in model files and the history database.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultLabel::Normal => "normal",
            FaultLabel::Overload => "overload",
            FaultLabel::BearingWear => "bearing_wear",
            FaultLabel::ValveFault => "valve_fault",
            FaultLabel::FanImbalance => "fan_imbalance",
            FaultLabel::RefrigerantLow => "refrigerant_low",
            FaultLabel::RefrigerantLeak => "refrigerant_leak",
            FaultLabel::MountVibration => "mount_vibration",
            FaultLabel::ElectricalNoise => "electrical_noise",
        }
    }

    /// Parse a stable string id back into a label.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|label| label.as_str() == id)
    }
}

/// Traffic-light grading of a prediction's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceGrade {
    /// Confidence at or above [`GRADE_HIGH_THRESHOLD`].
    High,
    /// Confidence at or above [`GRADE_MEDIUM_THRESHOLD`].
    Medium,
    /// Anything below the medium threshold; treat as advisory only.
    Low,
}

impl ConfidenceGrade {
    /// Grade a confidence value.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= GRADE_HIGH_THRESHOLD {
            Self::High
        } else if confidence >= GRADE_MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Stable string id used in the history database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parse a stable string id back into a grade.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Errors raised while loading or applying a model.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Reading the model file failed.
    #[error("Failed to read model {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The model file is not valid JSON for the expected shape.
    #[error("Failed to parse model {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The model fails its internal consistency checks.
    #[error("Invalid model: {0}")]
    Invalid(String),
    /// A feature vector's length disagrees with the model's trained input size.
    #[error("Dimension mismatch: model expects {expected} features, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the model was trained on.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },
    /// A feature vector was produced by a different layout version.
    #[error("Feature version mismatch: model expects v{expected}, vector is v{actual}")]
    FeatureVersionMismatch {
        /// Layout version the model was trained on.
        expected: u32,
        /// Version recorded on the offending vector.
        actual: u32,
    },
}

/// A prediction for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Arg-max class.
    pub label: FaultLabel,
    /// Probability of the arg-max class, in [0, 1].
    pub confidence: f32,
    /// Traffic-light grade of the confidence.
    pub grade: ConfidenceGrade,
}

/// Serialized multinomial logistic regression with input standardization.
///
/// Immutable after load; share across threads behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Identifier of the training pipeline that produced this model.
    pub model_id: String,
    /// Monotonically increasing version of the trained weights.
    pub model_version: i64,
    /// Feature layout version the model was trained against.
    pub feature_version: u32,
    /// Feature dimensionality the model was trained against.
    pub feature_dim: usize,
    /// Class ids in weight-matrix row order.
    pub classes: Vec<String>,
    /// Per-feature standardization means.
    pub scaler_mean: Vec<f32>,
    /// Per-feature standardization scales (standard deviations).
    pub scaler_scale: Vec<f32>,
    /// Row-major weight matrix, `classes.len() * feature_dim` entries.
    pub weights: Vec<f32>,
    /// Per-class bias terms.
    pub bias: Vec<f32>,
    /// Softmax temperature; 1.0 leaves probabilities untouched.
    pub temperature: f32,
    /// Minimum confidence at which a diagnosis is considered actionable.
    pub decision_threshold: f32,
}

impl Model {
    /// Load and validate a model from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let text = std::fs::read_to_string(path).map_err(|source| ClassifierError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Model = serde_json::from_str(&text).map_err(|source| ClassifierError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        model.validate()?;
        Ok(model)
    }

    /// Load a model, or fall back to the zero-weight bundled model when the
    /// file does not exist. The bundled model reports uniform probabilities,
    /// mirroring an untrained installation.
    pub fn load_or_bundled(path: &Path) -> Result<Self, ClassifierError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(
                "Model file {} not found; using untrained bundled model",
                path.display()
            );
            Ok(Self::bundled())
        }
    }

    /// The zero-initialized bundled model covering every [`FaultLabel`].
    pub fn bundled() -> Self {
        let classes: Vec<String> = FaultLabel::ALL
            .iter()
            .map(|label| label.as_str().to_string())
            .collect();
        let class_count = classes.len();
        Self {
            model_id: "compressor_logreg_v1".to_string(),
            model_version: 0,
            feature_version: FEATURE_VERSION,
            feature_dim: FEATURE_DIM,
            classes,
            scaler_mean: vec![0.0; FEATURE_DIM],
            scaler_scale: vec![1.0; FEATURE_DIM],
            weights: vec![0.0; FEATURE_DIM * class_count],
            bias: vec![0.0; class_count],
            temperature: 1.0,
            decision_threshold: 0.6,
        }
    }

    /// Check the model against this crate's feature contract and its own
    /// internal dimensions.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.feature_version != FEATURE_VERSION {
            return Err(ClassifierError::Invalid(format!(
                "model trained on feature layout v{}, this build extracts v{FEATURE_VERSION}",
                self.feature_version
            )));
        }
        if self.feature_dim != FEATURE_DIM {
            return Err(ClassifierError::Invalid(format!(
                "model expects {} features, this build extracts {FEATURE_DIM}",
                self.feature_dim
            )));
        }
        if self.classes.is_empty() {
            return Err(ClassifierError::Invalid("no classes defined".to_string()));
        }
        for class in &self.classes {
            if FaultLabel::from_id(class).is_none() {
                return Err(ClassifierError::Invalid(format!(
                    "unknown class id {class:?}"
                )));
            }
        }
        let classes = self.classes.len();
        if self.weights.len() != classes * self.feature_dim {
            return Err(ClassifierError::Invalid(format!(
                "weights length {} != {classes} classes x {} features",
                self.weights.len(),
                self.feature_dim
            )));
        }
        if self.bias.len() != classes {
            return Err(ClassifierError::Invalid("bias length mismatch".to_string()));
        }
        if self.scaler_mean.len() != self.feature_dim || self.scaler_scale.len() != self.feature_dim
        {
            return Err(ClassifierError::Invalid(
                "scaler length mismatch".to_string(),
            ));
        }
        if self
            .scaler_scale
            .iter()
            .any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(ClassifierError::Invalid(
                "scaler scales must be finite and positive".to_string(),
            ));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ClassifierError::Invalid(
                "temperature must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(ClassifierError::Invalid(
                "decision threshold must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Predict the fault label and confidence for one feature vector.
    pub fn predict(&self, vector: &FeatureVector) -> Result<Prediction, ClassifierError> {
        if vector.version != self.feature_version {
            return Err(ClassifierError::FeatureVersionMismatch {
                expected: self.feature_version,
                actual: vector.version,
            });
        }
        if vector.len() != self.feature_dim {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.feature_dim,
                actual: vector.len(),
            });
        }
        // Fields are public, so a model built without `load` may never have
        // been validated. Re-check the lengths predict_proba indexes by.
        let classes = self.classes.len();
        if classes == 0
            || self.bias.len() != classes
            || self.weights.len() != classes * self.feature_dim
            || self.scaler_mean.len() != self.feature_dim
            || self.scaler_scale.len() != self.feature_dim
        {
            return Err(ClassifierError::Invalid(
                "internal dimensions are inconsistent".to_string(),
            ));
        }

        let probabilities = self.predict_proba(&vector.values);
        let (best, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        let label = FaultLabel::from_id(&self.classes[best]).ok_or_else(|| {
            ClassifierError::Invalid(format!("unknown class id {:?}", self.classes[best]))
        })?;
        Ok(Prediction {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            grade: ConfidenceGrade::from_confidence(confidence),
        })
    }

    /// One-line description of the loaded model for startup logs.
    pub fn summary(&self) -> String {
        format!(
            "{} v{} ({} classes, {} features, threshold {:.2})",
            self.model_id,
            self.model_version,
            self.classes.len(),
            self.feature_dim,
            self.decision_threshold
        )
    }

    fn predict_proba(&self, values: &[f32]) -> Vec<f32> {
        let classes = self.classes.len();
        let temp = self.temperature.max(1e-6);
        let mut logits = vec![0.0_f32; classes];
        for (c, logit) in logits.iter_mut().enumerate() {
            let mut sum = self.bias[c];
            let row = &self.weights[c * self.feature_dim..(c + 1) * self.feature_dim];
            for i in 0..self.feature_dim {
                let scaled = (values[i] - self.scaler_mean[i]) / self.scaler_scale[i];
                sum += row[i] * scaled;
            }
            *logit = sum / temp;
        }
        softmax(&logits)
    }
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut exps = Vec::with_capacity(logits.len());
    let mut sum = 0.0_f32;
    for &v in logits {
        let e = (v - max).exp();
        exps.push(e);
        sum += e;
    }
    if sum == 0.0 {
        return vec![1.0 / logits.len() as f32; logits.len()];
    }
    for v in &mut exps {
        *v /= sum;
    }
    exps
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::FEATURE_VERSION;

    /// Model whose bias strongly favors one class; confidence lands near 1.
    pub(crate) fn model_biased_to(label: FaultLabel) -> Model {
        let mut model = Model::bundled();
        model.model_version = 1;
        let index = model
            .classes
            .iter()
            .position(|class| class == label.as_str())
            .unwrap();
        model.bias[index] = 8.0;
        model
    }

    #[test]
    fn bundled_model_validates_and_is_uniform() {
        let model = Model::bundled();
        model.validate().unwrap();
        let vector = FeatureVector {
            version: FEATURE_VERSION,
            values: vec![0.0; FEATURE_DIM],
        };
        let prediction = model.predict(&vector).unwrap();
        let uniform = 1.0 / FaultLabel::ALL.len() as f32;
        assert!((prediction.confidence - uniform).abs() < 1e-4);
        assert_eq!(prediction.grade, ConfidenceGrade::Low);
    }

    #[test]
    fn biased_model_predicts_its_class_with_high_confidence() {
        let model = model_biased_to(FaultLabel::BearingWear);
        let vector = FeatureVector {
            version: FEATURE_VERSION,
            values: vec![0.5; FEATURE_DIM],
        };
        let prediction = model.predict(&vector).unwrap();
        assert_eq!(prediction.label, FaultLabel::BearingWear);
        assert!(prediction.confidence > 0.9);
        assert_eq!(prediction.grade, ConfidenceGrade::High);
    }

    #[test]
    fn wrong_length_vector_is_dimension_mismatch() {
        let model = Model::bundled();
        let vector = FeatureVector {
            version: FEATURE_VERSION,
            values: vec![0.0; FEATURE_DIM + 1],
        };
        let err = model.predict(&vector).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::DimensionMismatch {
                expected: FEATURE_DIM,
                actual,
            } if actual == FEATURE_DIM + 1
        ));
    }

    #[test]
    fn predict_rejects_unvalidated_inconsistent_model() {
        let vector = FeatureVector {
            version: FEATURE_VERSION,
            values: vec![0.0; FEATURE_DIM],
        };

        let mut empty = Model::bundled();
        empty.classes.clear();
        assert!(matches!(
            empty.predict(&vector),
            Err(ClassifierError::Invalid(_))
        ));

        let mut truncated = Model::bundled();
        truncated.weights.truncate(FEATURE_DIM);
        assert!(matches!(
            truncated.predict(&vector),
            Err(ClassifierError::Invalid(_))
        ));
    }

    #[test]
    fn wrong_feature_version_is_rejected() {
        let model = Model::bundled();
        let vector = FeatureVector {
            version: FEATURE_VERSION + 1,
            values: vec![0.0; FEATURE_DIM],
        };
        let err = model.predict(&vector).unwrap_err();
        assert!(matches!(err, ClassifierError::FeatureVersionMismatch { .. }));
    }

    #[test]
    fn model_with_wrong_feature_dim_fails_validation() {
        let mut model = Model::bundled();
        model.feature_dim = FEATURE_DIM - 1;
        assert!(matches!(model.validate(), Err(ClassifierError::Invalid(_))));
    }

    #[test]
    fn model_with_unknown_class_fails_validation() {
        let mut model = Model::bundled();
        model.classes[0] = "gearbox_chatter".to_string();
        assert!(matches!(model.validate(), Err(ClassifierError::Invalid(_))));
    }

    #[test]
    fn model_round_trips_through_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let model = model_biased_to(FaultLabel::Normal);
        std::fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();
        let loaded = Model::load(&path).unwrap();
        assert_eq!(loaded.model_id, model.model_id);
        assert_eq!(loaded.classes, model.classes);
        assert_eq!(loaded.bias, model.bias);
    }

    #[test]
    fn missing_model_file_falls_back_to_bundled() {
        let dir = tempfile::TempDir::new().unwrap();
        let model = Model::load_or_bundled(&dir.path().join("absent.json")).unwrap();
        assert_eq!(model.model_version, 0);
    }

    #[test]
    fn softmax_probabilities_sum_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn labels_round_trip_through_ids() {
        for label in FaultLabel::ALL {
            assert_eq!(FaultLabel::from_id(label.as_str()), Some(label));
        }
        assert_eq!(FaultLabel::from_id("warp_core_breach"), None);
    }
}
