//! Whole-waveform amplitude statistics.

/// Amplitude statistics computed over the full waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct WaveformStats {
    pub(super) mean: f32,
    pub(super) std: f32,
    pub(super) max: f32,
    pub(super) min: f32,
    pub(super) median: f32,
    pub(super) rms: f32,
    pub(super) crest_factor: f32,
}

pub(super) fn waveform_stats(samples: &[f32]) -> WaveformStats {
    if samples.is_empty() {
        return WaveformStats {
            mean: 0.0,
            std: 0.0,
            max: 0.0,
            min: 0.0,
            median: 0.0,
            rms: 0.0,
            crest_factor: 0.0,
        };
    }
    let n = samples.len() as f64;
    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;
    let mut max = f32::NEG_INFINITY;
    let mut min = f32::INFINITY;
    for &sample in samples {
        sum += sample as f64;
        sum_sq += sample as f64 * sample as f64;
        max = max.max(sample);
        min = min.min(sample);
    }
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    let rms = (sum_sq / n).sqrt() as f32;
    let peak = max.abs().max(min.abs());
    let crest_factor = if rms > 0.0 { peak / rms } else { 0.0 };

    WaveformStats {
        mean: mean as f32,
        std: variance.sqrt() as f32,
        max,
        min,
        median: median(samples),
        rms,
        crest_factor,
    }
}

/// Fraction of adjacent sample pairs that cross zero within one frame.
pub(super) fn frame_zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let mut crossings = 0usize;
    let mut prev = frame[0];
    for &current in &frame[1..] {
        let crossed = (prev >= 0.0 && current < 0.0) || (prev < 0.0 && current >= 0.0);
        if crossed && (prev != 0.0 || current != 0.0) {
            crossings += 1;
        }
        prev = current;
    }
    crossings as f32 / (frame.len() - 1) as f32
}

fn median(samples: &[f32]) -> f32 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_signal_has_unit_crest_factor() {
        let stats = waveform_stats(&vec![0.5_f32; 1024]);
        assert!((stats.mean - 0.5).abs() < 1e-6);
        assert!(stats.std.abs() < 1e-3);
        assert!((stats.rms - 0.5).abs() < 1e-4);
        assert!((stats.crest_factor - 1.0).abs() < 1e-3);
        assert!((stats.median - 0.5).abs() < 1e-6);
    }

    #[test]
    fn alternating_frame_has_full_zero_crossing_rate() {
        let frame: Vec<f32> = (0..256).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let zcr = frame_zero_crossing_rate(&frame);
        assert!((zcr - 1.0).abs() < 1e-6);
    }

    #[test]
    fn silent_frame_has_zero_crossing_rate_of_zero() {
        assert_eq!(frame_zero_crossing_rate(&vec![0.0_f32; 64]), 0.0);
    }

    #[test]
    fn median_of_even_length_averages_middle_pair() {
        let stats = waveform_stats(&[0.0, 1.0, 2.0, 3.0]);
        assert!((stats.median - 1.5).abs() < 1e-6);
    }
}
