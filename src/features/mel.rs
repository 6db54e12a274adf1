//! Triangular mel filter bank and DCT-II used for the MFCC block.

pub(super) struct MelBank {
    coefficients: usize,
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    pub(super) fn new(
        sample_rate: u32,
        fft_len: usize,
        mel_bands: usize,
        coefficients: usize,
        f_min: f32,
        f_max: f32,
    ) -> Self {
        let bins = mel_bins(sample_rate, fft_len, mel_bands, f_min, f_max);
        Self {
            coefficients,
            filters: build_filters(&bins, mel_bands),
        }
    }

    /// Cepstral coefficients from a one-sided power spectrum.
    pub(super) fn mfcc_from_power(&self, power: &[f32]) -> Vec<f32> {
        let mut log_energies = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let mut sum = 0.0_f64;
            for &(bin, weight) in filter {
                let p = power.get(bin).copied().unwrap_or(0.0).max(0.0) as f64;
                sum += p * weight as f64;
            }
            log_energies.push((sum.max(1e-12)).ln() as f32);
        }
        dct_ii(&log_energies, self.coefficients)
    }
}

fn mel_bins(
    sample_rate: u32,
    fft_len: usize,
    mel_bands: usize,
    f_min: f32,
    f_max: f32,
) -> Vec<usize> {
    let nyquist = sample_rate.max(1) as f32 * 0.5;
    let f_max = f_max.min(nyquist).max(f_min);
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    (0..(mel_bands + 2))
        .map(|i| {
            let t = i as f32 / (mel_bands + 1) as f32;
            let hz = mel_to_hz(mel_min + (mel_max - mel_min) * t);
            freq_to_bin(hz, sample_rate, fft_len)
        })
        .collect()
}

fn build_filters(bins: &[usize], mel_bands: usize) -> Vec<Vec<(usize, f32)>> {
    let mut filters = Vec::with_capacity(mel_bands);
    for m in 0..mel_bands {
        let left = bins[m];
        let center = bins[m + 1];
        let right = bins[m + 2].max(center + 1);
        filters.push(triangle_weights(left, center, right));
    }
    filters
}

fn triangle_weights(left: usize, center: usize, right: usize) -> Vec<(usize, f32)> {
    let mut weights = Vec::new();
    if right <= left {
        return weights;
    }
    for bin in left..=right {
        let w = if bin < center {
            if center == left {
                0.0
            } else {
                (bin - left) as f32 / (center - left) as f32
            }
        } else if right == center {
            0.0
        } else {
            (right - bin) as f32 / (right - center) as f32
        };
        if w > 0.0 {
            weights.push((bin, w));
        }
    }
    weights
}

pub(super) fn freq_to_bin(freq_hz: f32, sample_rate: u32, fft_len: usize) -> usize {
    let nyquist = sample_rate.max(1) as f32 * 0.5;
    let freq = freq_hz.clamp(0.0, nyquist);
    (((freq * fft_len as f32) / sample_rate.max(1) as f32).floor() as usize).min(fft_len / 2)
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0_f32 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0_f32 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

fn dct_ii(values: &[f32], count: usize) -> Vec<f32> {
    let n = values.len().max(1) as f64;
    let mut out = Vec::with_capacity(count);
    for k in 0..count {
        let mut sum = 0.0_f64;
        for (m, &v) in values.iter().enumerate() {
            let angle = std::f64::consts::PI * k as f64 * (m as f64 + 0.5) / n;
            sum += v as f64 * angle.cos();
        }
        out.push(sum as f32);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ANALYSIS_SAMPLE_RATE;
    use crate::features::{FRAME_SIZE, MFCC_COEFFICIENTS};

    #[test]
    fn mfcc_from_power_returns_expected_length() {
        let bank = MelBank::new(
            ANALYSIS_SAMPLE_RATE,
            FRAME_SIZE,
            40,
            MFCC_COEFFICIENTS,
            20.0,
            8_000.0,
        );
        let power = vec![0.0_f32; FRAME_SIZE / 2 + 1];
        let mfcc = bank.mfcc_from_power(&power);
        assert_eq!(mfcc.len(), MFCC_COEFFICIENTS);
    }

    #[test]
    fn filters_cover_ascending_bins() {
        let bank = MelBank::new(ANALYSIS_SAMPLE_RATE, 1024, 40, 13, 20.0, 8_000.0);
        for filter in &bank.filters {
            let mut last = 0usize;
            for &(bin, weight) in filter {
                assert!(bin >= last);
                assert!(weight > 0.0 && weight <= 1.0);
                last = bin;
            }
        }
    }
}
