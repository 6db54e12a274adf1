//! Feature extraction: a mono waveform at the analysis rate becomes one
//! fixed-length, versioned feature vector.
//!
//! The layout is frozen per [`FEATURE_VERSION`]; classifier models record the
//! version and dimension they were trained against and are rejected when
//! either disagrees. Extraction is fully deterministic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioSample;

mod mel;
mod spectrum;
mod time_domain;

/// Samples per analysis frame at the analysis rate (64 ms at 16 kHz).
pub const FRAME_SIZE: usize = 1024;
/// Hop between consecutive analysis frames.
pub const HOP_SIZE: usize = 512;
/// Cepstral coefficients kept per frame.
pub const MFCC_COEFFICIENTS: usize = 13;
/// Version of the feature vector layout below.
pub const FEATURE_VERSION: u32 = 1;

/// Length of a version-1 feature vector.
///
/// Layout, in order:
/// - 7 waveform statistics: mean, std, max, min, median, rms, crest factor
/// - 2 zero-crossing rate aggregates: mean, std over frames
/// - 6 spectral shape aggregates: centroid, rolloff, bandwidth (mean, std each)
/// - 10 machinery band-energy ratios: 5 band means, then 5 band stds
/// - 26 MFCC aggregates: 13 coefficient means, then 13 stds
pub const FEATURE_DIM: usize = 7 + 2 + 6 + 10 + 2 * MFCC_COEFFICIENTS;

/// Errors raised during feature extraction.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// The waveform is shorter than one analysis frame.
    #[error("Insufficient samples: got {got}, need at least {need}")]
    InsufficientSamples {
        /// Samples available in the waveform.
        got: usize,
        /// Samples required for one analysis frame.
        need: usize,
    },
}

/// Fixed-length numeric summary of one waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Layout version the values follow.
    pub version: u32,
    /// The feature values; length is [`FEATURE_DIM`] for version 1.
    pub values: Vec<f32>,
}

impl FeatureVector {
    /// Number of values in the vector.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the vector holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Extract the version-1 feature vector from a decoded audio sample.
pub fn extract_features(sample: &AudioSample) -> Result<FeatureVector, FeatureError> {
    extract_from_waveform(&sample.mono, sample.sample_rate)
}

/// Extract features from a raw mono waveform at a known sample rate.
pub fn extract_from_waveform(
    samples: &[f32],
    sample_rate: u32,
) -> Result<FeatureVector, FeatureError> {
    if samples.len() < FRAME_SIZE {
        return Err(FeatureError::InsufficientSamples {
            got: samples.len(),
            need: FRAME_SIZE,
        });
    }

    let stats = time_domain::waveform_stats(samples);
    let frames = spectrum::analyze_frames(samples, sample_rate);

    let mut values = Vec::with_capacity(FEATURE_DIM);
    values.extend_from_slice(&[
        stats.mean,
        stats.std,
        stats.max,
        stats.min,
        stats.median,
        stats.rms,
        stats.crest_factor,
    ]);

    push_mean_std(&mut values, frames.iter().map(|f| f.zero_crossing_rate));
    push_mean_std(&mut values, frames.iter().map(|f| f.centroid_hz));
    push_mean_std(&mut values, frames.iter().map(|f| f.rolloff_hz));
    push_mean_std(&mut values, frames.iter().map(|f| f.bandwidth_hz));

    for band in 0..5 {
        let (mean, _) = mean_std(frames.iter().map(|f| f.band_ratios[band]));
        values.push(mean);
    }
    for band in 0..5 {
        let (_, std) = mean_std(frames.iter().map(|f| f.band_ratios[band]));
        values.push(std);
    }

    for coeff in 0..MFCC_COEFFICIENTS {
        let (mean, _) = mean_std(frames.iter().map(|f| f.mfcc[coeff]));
        values.push(mean);
    }
    for coeff in 0..MFCC_COEFFICIENTS {
        let (_, std) = mean_std(frames.iter().map(|f| f.mfcc[coeff]));
        values.push(std);
    }

    debug_assert_eq!(values.len(), FEATURE_DIM);
    Ok(FeatureVector {
        version: FEATURE_VERSION,
        values,
    })
}

fn push_mean_std(values: &mut Vec<f32>, metric: impl Iterator<Item = f32> + Clone) {
    let (mean, std) = mean_std(metric);
    values.push(mean);
    values.push(std);
}

/// Population mean and standard deviation of a frame metric.
fn mean_std(metric: impl Iterator<Item = f32> + Clone) -> (f32, f32) {
    let mut count = 0usize;
    let mut sum = 0.0_f64;
    for v in metric.clone() {
        sum += v as f64;
        count += 1;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let mut sum_sq = 0.0_f64;
    for v in metric {
        let d = v as f64 - mean;
        sum_sq += d * d;
    }
    let std = (sum_sq / count as f64).max(0.0).sqrt();
    (mean as f32, std as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ANALYSIS_SAMPLE_RATE;

    fn hum(seconds: f32) -> Vec<f32> {
        let len = (ANALYSIS_SAMPLE_RATE as f32 * seconds) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / ANALYSIS_SAMPLE_RATE as f32;
                0.6 * (2.0 * std::f32::consts::PI * 120.0 * t).sin()
                    + 0.2 * (2.0 * std::f32::consts::PI * 2_400.0 * t).sin()
            })
            .collect()
    }

    #[test]
    fn vector_has_fixed_length_and_version() {
        let vector = extract_from_waveform(&hum(1.0), ANALYSIS_SAMPLE_RATE).unwrap();
        assert_eq!(vector.version, FEATURE_VERSION);
        assert_eq!(vector.len(), FEATURE_DIM);
        assert!(vector.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn extraction_is_deterministic() {
        let samples = hum(2.0);
        let a = extract_from_waveform(&samples, ANALYSIS_SAMPLE_RATE).unwrap();
        let b = extract_from_waveform(&samples, ANALYSIS_SAMPLE_RATE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn waveform_shorter_than_one_frame_is_rejected() {
        let samples = vec![0.2_f32; FRAME_SIZE - 1];
        let err = extract_from_waveform(&samples, ANALYSIS_SAMPLE_RATE).unwrap_err();
        match err {
            FeatureError::InsufficientSamples { got, need } => {
                assert_eq!(got, FRAME_SIZE - 1);
                assert_eq!(need, FRAME_SIZE);
            }
        }
    }

    #[test]
    fn exactly_one_frame_is_enough() {
        let samples = vec![0.2_f32; FRAME_SIZE];
        let vector = extract_from_waveform(&samples, ANALYSIS_SAMPLE_RATE).unwrap();
        assert_eq!(vector.len(), FEATURE_DIM);
    }

    #[test]
    fn mean_std_of_constant_metric_has_zero_std() {
        let (mean, std) = mean_std([2.0_f32, 2.0, 2.0].into_iter());
        assert!((mean - 2.0).abs() < 1e-6);
        assert!(std.abs() < 1e-6);
    }
}
