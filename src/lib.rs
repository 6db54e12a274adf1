//! Library exports for the compressor fault diagnosis pipeline.
/// Application directory resolution.
pub mod app_dirs;
/// Upload decoding and waveform conditioning.
pub mod audio;
/// Logistic regression fault classifier.
pub mod classifier;
/// Engine configuration loading and saving.
pub mod config;
/// Pipeline orchestration and result types.
pub mod diagnosis;
/// Acoustic feature extraction.
pub mod features;
/// Per-launch file logging.
pub mod logging;
/// Diagnosis history persistence.
pub mod store;
