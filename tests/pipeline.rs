//! End-to-end pipeline tests against a file-backed history database.

use std::sync::Arc;

use compdiag::audio::{ANALYSIS_SAMPLE_RATE, AudioFormat};
use compdiag::classifier::{ConfidenceGrade, FaultLabel, Model};
use compdiag::diagnosis::{Diagnoser, Stage};
use compdiag::store::DiagnosisStore;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use tempfile::TempDir;

/// A steady compressor hum with a fan-like overtone, as WAV bytes.
fn compressor_wav(seconds: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: ANALYSIS_SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let len = (ANALYSIS_SAMPLE_RATE as f32 * seconds) as usize;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..len {
            let t = i as f32 / ANALYSIS_SAMPLE_RATE as f32;
            let hum = 0.5 * (2.0 * std::f32::consts::PI * 120.0 * t).sin();
            let overtone = 0.15 * (2.0 * std::f32::consts::PI * 1_830.0 * t).sin();
            writer.write_sample(hum + overtone).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Bundled model nudged so one class dominates every prediction.
fn model_favoring(label: FaultLabel) -> Model {
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
fn full_pipeline_persists_to_disk_across_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("history.db");
    let bytes = compressor_wav(3.0);

    {
        let store = DiagnosisStore::open(&db_path).unwrap();
        let diagnoser = Diagnoser::new(Arc::new(model_favoring(FaultLabel::Normal)), store);
        let result = diagnoser
            .diagnose(&bytes, AudioFormat::Wav, "COMP_100")
            .unwrap();
        assert_eq!(result.label, FaultLabel::Normal);
        assert!(result.confidence >= diagnoser.model().decision_threshold);
        assert_eq!(result.grade, ConfidenceGrade::High);
        assert!((result.duration_seconds - 3.0).abs() < 0.01);
    }

    // History must survive process restarts.
    let store = DiagnosisStore::open(&db_path).unwrap();
    assert_eq!(store.count().unwrap(), 1);
    let history = store.recent_for_device("COMP_100", 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].label, FaultLabel::Normal);
    assert_eq!(history[0].model_version, 1);
}

#[test]
fn repeated_uploads_accumulate_and_stay_deterministic() {
    let store = DiagnosisStore::open_in_memory().unwrap();
    let diagnoser = Diagnoser::new(Arc::new(model_favoring(FaultLabel::BearingWear)), store);
    let bytes = compressor_wav(1.5);

    let first = diagnoser
        .diagnose(&bytes, AudioFormat::Wav, "COMP_101")
        .unwrap();
    let second = diagnoser
        .diagnose(&bytes, AudioFormat::Wav, "COMP_101")
        .unwrap();
    assert_eq!(first.label, second.label);
    assert_eq!(first.confidence, second.confidence);
    assert_ne!(first.id, second.id);

    let distribution = diagnoser.store().label_distribution().unwrap();
    assert_eq!(distribution, vec![(FaultLabel::BearingWear, 2)]);
}

#[test]
fn mp3_upload_of_sufficient_length_diagnoses_cleanly() {
    // 0.78 s of encoded silence at 44.1 kHz mono.
    let bytes = include_bytes!("fixtures/silence.mp3");
    let store = DiagnosisStore::open_in_memory().unwrap();
    let diagnoser = Diagnoser::new(Arc::new(Model::bundled()), store);
    let result = diagnoser
        .diagnose(bytes, AudioFormat::Mp3, "COMP_104")
        .unwrap();
    assert!(FaultLabel::ALL.contains(&result.label));
    assert!((0.0..=1.0).contains(&result.confidence));
    assert!(result.duration_seconds > 0.5);
    assert_eq!(diagnoser.store().count().unwrap(), 1);
}

#[test]
fn garbage_bytes_fail_at_load_and_leave_history_empty() {
    let store = DiagnosisStore::open_in_memory().unwrap();
    let diagnoser = Diagnoser::new(Arc::new(Model::bundled()), store);
    let err = diagnoser
        .diagnose(&[0_u8; 64], AudioFormat::Mp3, "COMP_102")
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Load);
    assert_eq!(diagnoser.store().count().unwrap(), 0);
}

#[test]
fn below_threshold_prediction_is_persisted_but_not_actionable() {
    let store = DiagnosisStore::open_in_memory().unwrap();
    // Uniform probabilities over nine classes sit well under the threshold.
    let diagnoser = Diagnoser::new(Arc::new(Model::bundled()), store);
    let bytes = compressor_wav(1.0);
    let result = diagnoser
        .diagnose(&bytes, AudioFormat::Wav, "COMP_103")
        .unwrap();
    assert!(!result.is_actionable(diagnoser.model()));
    assert_eq!(result.grade, ConfidenceGrade::Low);
    assert_eq!(diagnoser.store().count().unwrap(), 1);
}
