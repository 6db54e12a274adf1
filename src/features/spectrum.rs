//! Per-frame spectral analysis: Hann-windowed FFT frames, spectral shape
//! statistics, machinery band-energy ratios and MFCCs.

use std::f32::consts::PI;

use rustfft::{FftPlanner, num_complex::Complex};

use super::mel::{MelBank, freq_to_bin};
use super::time_domain::frame_zero_crossing_rate;
use super::{FRAME_SIZE, HOP_SIZE, MFCC_COEFFICIENTS};

const ROLLOFF_FRACTION: f32 = 0.85;
const MEL_BANDS: usize = 40;
const MEL_F_MIN_HZ: f32 = 20.0;
const MEL_F_MAX_HZ: f32 = 8_000.0;

/// Frequency bands matched to compressor machinery noise sources, in Hz.
///
/// Low rumble, compressor fundamental, motor harmonics, fan blade passage and
/// refrigerant hiss, in that order.
pub(super) const MACHINERY_BANDS_HZ: [(f32, f32); 5] = [
    (10.0, 100.0),
    (100.0, 500.0),
    (500.0, 1_500.0),
    (1_500.0, 3_000.0),
    (3_000.0, 8_000.0),
];

/// Metrics computed for one analysis frame.
pub(super) struct FrameFeatures {
    pub(super) zero_crossing_rate: f32,
    pub(super) centroid_hz: f32,
    pub(super) rolloff_hz: f32,
    pub(super) bandwidth_hz: f32,
    pub(super) band_ratios: [f32; 5],
    pub(super) mfcc: Vec<f32>,
}

/// Split the waveform into fixed frames and compute per-frame metrics.
///
/// The caller guarantees at least one full frame of samples; partial trailing
/// samples are dropped so every frame sees identical windowing.
pub(super) fn analyze_frames(samples: &[f32], sample_rate: u32) -> Vec<FrameFeatures> {
    let mel = MelBank::new(
        sample_rate,
        FRAME_SIZE,
        MEL_BANDS,
        MFCC_COEFFICIENTS,
        MEL_F_MIN_HZ,
        MEL_F_MAX_HZ,
    );
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);
    let window = hann_window(FRAME_SIZE);
    let mut buffer = vec![Complex::new(0.0_f32, 0.0_f32); FRAME_SIZE];

    let mut frames = Vec::new();
    let mut start = 0usize;
    while start + FRAME_SIZE <= samples.len() {
        let frame = &samples[start..start + FRAME_SIZE];
        for (cell, (&sample, &win)) in buffer.iter_mut().zip(frame.iter().zip(window.iter())) {
            *cell = Complex::new(sample * win, 0.0);
        }
        fft.process(&mut buffer);
        let power = power_spectrum(&buffer);
        let (sum, centroid_hz) = centroid(&power, sample_rate);
        frames.push(FrameFeatures {
            zero_crossing_rate: frame_zero_crossing_rate(frame),
            centroid_hz,
            rolloff_hz: rolloff(&power, sample_rate, sum),
            bandwidth_hz: bandwidth(&power, sample_rate, sum, centroid_hz),
            band_ratios: band_ratios(&power, sample_rate),
            mfcc: mel.mfcc_from_power(&power),
        });
        start += HOP_SIZE;
    }
    frames
}

fn hann_window(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| 0.5_f32 * (1.0 - (2.0 * PI * n as f32 / denom).cos()))
        .collect()
}

/// One-sided power spectrum of an FFT output buffer.
fn power_spectrum(fft: &[Complex<f32>]) -> Vec<f32> {
    let bins = fft.len() / 2 + 1;
    let mut power = Vec::with_capacity(bins);
    for bin in 0..bins {
        let c = fft[bin];
        power.push((c.re * c.re + c.im * c.im).max(0.0));
    }
    power
}

fn centroid(power: &[f32], sample_rate: u32) -> (f32, f32) {
    let sr = sample_rate.max(1) as f64;
    let mut sum = 0.0_f64;
    let mut weighted = 0.0_f64;
    for (bin, &p) in power.iter().enumerate() {
        let p = p.max(0.0) as f64;
        sum += p;
        weighted += p * (bin as f64 * sr / FRAME_SIZE as f64);
    }
    if sum <= 0.0 {
        return (0.0, 0.0);
    }
    (sum as f32, (weighted / sum) as f32)
}

fn rolloff(power: &[f32], sample_rate: u32, sum_power: f32) -> f32 {
    let total = sum_power.max(0.0) as f64;
    if total <= 0.0 {
        return 0.0;
    }
    let target = total * ROLLOFF_FRACTION as f64;
    let sr = sample_rate.max(1) as f64;
    let mut cumulative = 0.0_f64;
    for (bin, &p) in power.iter().enumerate() {
        cumulative += p.max(0.0) as f64;
        if cumulative >= target {
            return (bin as f64 * sr / FRAME_SIZE as f64) as f32;
        }
    }
    sample_rate as f32 * 0.5
}

fn bandwidth(power: &[f32], sample_rate: u32, sum_power: f32, centroid_hz: f32) -> f32 {
    let total = sum_power.max(0.0) as f64;
    if total <= 0.0 {
        return 0.0;
    }
    let sr = sample_rate.max(1) as f64;
    let centroid = centroid_hz.max(0.0) as f64;
    let mut weighted = 0.0_f64;
    for (bin, &p) in power.iter().enumerate() {
        let freq = bin as f64 * sr / FRAME_SIZE as f64;
        let diff = freq - centroid;
        weighted += diff * diff * p.max(0.0) as f64;
    }
    (weighted / total).sqrt() as f32
}

/// Energy fraction of the frame falling into each machinery band.
fn band_ratios(power: &[f32], sample_rate: u32) -> [f32; 5] {
    let total: f64 = power.iter().copied().map(|v| v.max(0.0) as f64).sum();
    let mut ratios = [0.0_f32; 5];
    if total <= 0.0 {
        return ratios;
    }
    for (ratio, &(lo, hi)) in ratios.iter_mut().zip(MACHINERY_BANDS_HZ.iter()) {
        let lo_bin = freq_to_bin(lo, sample_rate, FRAME_SIZE);
        let hi_bin = freq_to_bin(hi, sample_rate, FRAME_SIZE).max(lo_bin + 1);
        let energy: f64 = power[lo_bin..hi_bin.min(power.len())]
            .iter()
            .copied()
            .map(|v| v.max(0.0) as f64)
            .sum();
        *ratio = (energy / total) as f32;
    }
    ratios
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ANALYSIS_SAMPLE_RATE;

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let len = (ANALYSIS_SAMPLE_RATE as f32 * seconds) as usize;
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / ANALYSIS_SAMPLE_RATE as f32).sin())
            .collect()
    }

    #[test]
    fn hann_window_is_symmetric_and_zero_at_edges() {
        let w = hann_window(8);
        assert!(w[0].abs() < 1e-6);
        assert!(w[7].abs() < 1e-6);
        assert!((w[1] - w[6]).abs() < 1e-6);
    }

    #[test]
    fn sine_centroid_tracks_frequency() {
        let samples = sine(440.0, 0.5);
        let frames = analyze_frames(&samples, ANALYSIS_SAMPLE_RATE);
        assert!(!frames.is_empty());
        for frame in &frames {
            assert!(frame.centroid_hz > 200.0 && frame.centroid_hz < 800.0);
        }
    }

    #[test]
    fn sine_energy_lands_in_the_matching_band() {
        // 250 Hz sits inside the compressor fundamental band (100-500 Hz).
        let samples = sine(250.0, 0.5);
        let frames = analyze_frames(&samples, ANALYSIS_SAMPLE_RATE);
        for frame in &frames {
            assert!(frame.band_ratios[1] > 0.8, "got {:?}", frame.band_ratios);
        }
    }

    #[test]
    fn band_ratios_sum_to_at_most_one() {
        let samples = sine(1_000.0, 0.2);
        let frames = analyze_frames(&samples, ANALYSIS_SAMPLE_RATE);
        for frame in &frames {
            let sum: f32 = frame.band_ratios.iter().sum();
            assert!(sum <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn short_input_yields_no_frames() {
        let samples = vec![0.1_f32; FRAME_SIZE - 1];
        assert!(analyze_frames(&samples, ANALYSIS_SAMPLE_RATE).is_empty());
    }
}
