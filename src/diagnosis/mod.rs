//! Diagnosis orchestration: load, extract, classify, persist.
//!
//! One upload runs through the pipeline synchronously; any stage failure
//! aborts the request with a stage-tagged error and nothing is persisted.
//! Retrying is the caller's decision.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audio::{self, AudioFormat};
use crate::classifier::{ClassifierError, ConfidenceGrade, FaultLabel, Model};
use crate::features::{self, FeatureError};
use crate::store::{DiagnosisStore, StoreError};

/// Pipeline stage at which a diagnosis failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Decoding the uploaded bytes.
    Load,
    /// Feature extraction from the waveform.
    Extract,
    /// Classifier inference.
    Classify,
    /// Writing the result to the history store.
    Persist,
}

impl Stage {
    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Extract => "extract",
            Stage::Classify => "classify",
            Stage::Persist => "persist",
        }
    }
}

/// A stage-tagged pipeline failure.
#[derive(Debug, Error)]
pub enum DiagnosisError {
    /// The upload could not be decoded into a waveform.
    #[error("load stage failed: {0}")]
    Load(#[from] audio::AudioError),
    /// The waveform could not be summarized into a feature vector.
    #[error("extract stage failed: {0}")]
    Extract(#[from] FeatureError),
    /// The classifier rejected or failed on the feature vector.
    #[error("classify stage failed: {0}")]
    Classify(#[from] ClassifierError),
    /// The diagnosis record could not be persisted.
    #[error("persist stage failed: {0}")]
    Persist(#[from] StoreError),
}

impl DiagnosisError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            DiagnosisError::Load(_) => Stage::Load,
            DiagnosisError::Extract(_) => Stage::Extract,
            DiagnosisError::Classify(_) => Stage::Classify,
            DiagnosisError::Persist(_) => Stage::Persist,
        }
    }
}

/// One immutable diagnosis record, as persisted in the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    /// Unique id of this diagnosis.
    pub id: Uuid,
    /// Device the recording came from.
    pub device_id: String,
    /// Predicted fault category.
    pub label: FaultLabel,
    /// Arg-max class probability, in [0, 1].
    pub confidence: f32,
    /// Traffic-light grade of the confidence.
    pub grade: ConfidenceGrade,
    /// Id of the model that produced the prediction.
    pub model_id: String,
    /// Version of the model that produced the prediction.
    pub model_version: i64,
    /// Duration of the analyzed waveform in seconds.
    pub duration_seconds: f32,
    /// Upload timestamp, epoch seconds UTC.
    pub created_at: i64,
}

impl DiagnosisResult {
    /// True when the confidence clears the model's decision threshold.
    pub fn is_actionable(&self, model: &Model) -> bool {
        self.confidence >= model.decision_threshold
    }
}

/// Runs the diagnosis pipeline against one model and one history store.
///
/// The model is shared read-only; a `Diagnoser` per worker thread can clone
/// the `Arc` cheaply.
pub struct Diagnoser {
    model: Arc<Model>,
    store: DiagnosisStore,
}

impl Diagnoser {
    /// Build a diagnoser from a loaded model and an open store.
    pub fn new(model: Arc<Model>, store: DiagnosisStore) -> Self {
        Self { model, store }
    }

    /// The model this diagnoser classifies with.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The underlying history store.
    pub fn store(&self) -> &DiagnosisStore {
        &self.store
    }

    /// Run the full pipeline for one upload and persist the result.
    pub fn diagnose(
        &self,
        bytes: &[u8],
        format: AudioFormat,
        device_id: &str,
    ) -> Result<DiagnosisResult, DiagnosisError> {
        let sample = audio::decode_upload(bytes, format)?;
        tracing::debug!(
            device_id,
            duration_seconds = sample.duration_seconds,
            "decoded upload"
        );

        let vector = features::extract_features(&sample)?;
        let prediction = self.model.predict(&vector)?;

        let result = DiagnosisResult {
            id: Uuid::new_v4(),
            device_id: device_id.to_string(),
            label: prediction.label,
            confidence: prediction.confidence,
            grade: prediction.grade,
            model_id: self.model.model_id.clone(),
            model_version: self.model.model_version,
            duration_seconds: sample.duration_seconds,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        };
        self.store.insert(&result)?;

        if result.is_actionable(&self.model) {
            tracing::info!(
                device_id,
                label = result.label.as_str(),
                confidence = result.confidence,
                "diagnosis complete"
            );
        } else {
            tracing::info!(
                device_id,
                label = result.label.as_str(),
                confidence = result.confidence,
                threshold = self.model.decision_threshold,
                "diagnosis below decision threshold"
            );
        }
        Ok(result)
    }
}
