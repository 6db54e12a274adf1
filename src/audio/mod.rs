//! Audio loading: decode an uploaded recording into a mono waveform at the
//! fixed analysis sample rate.

use std::io::Cursor;

use thiserror::Error;

mod decode;

/// Fixed sample rate every waveform is resampled to before analysis.
///
/// Classifier models are trained against features extracted at this rate, so
/// it is part of the feature-vector contract.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16_000;

/// Upload formats accepted by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// RIFF/WAVE container with PCM audio.
    Wav,
    /// MPEG layer III audio.
    Mp3,
}

impl AudioFormat {
    /// Map a file extension to a declared format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("wav") {
            Some(Self::Wav)
        } else if ext.eq_ignore_ascii_case("mp3") {
            Some(Self::Mp3)
        } else {
            None
        }
    }

    /// Canonical extension for the format, used as a decoder hint.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

/// Errors raised while loading an uploaded recording.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The bytes could not be decoded as any supported format.
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
    /// Decoding produced an empty or non-finite waveform.
    #[error("Corrupt audio: {0}")]
    CorruptAudio(String),
}

/// Decoded mono waveform at the analysis sample rate.
///
/// Discarded after feature extraction; only derived artifacts persist.
#[derive(Debug, Clone)]
pub struct AudioSample {
    /// Mono amplitudes in [-1, 1].
    pub mono: Vec<f32>,
    /// Sample rate of `mono`, always [`ANALYSIS_SAMPLE_RATE`].
    pub sample_rate: u32,
    /// Waveform duration in seconds.
    pub duration_seconds: f32,
}

/// Decode uploaded bytes into an [`AudioSample`] ready for feature extraction.
///
/// Downmixes to mono and resamples to [`ANALYSIS_SAMPLE_RATE`] with linear
/// interpolation. A decode that yields no samples or any non-finite amplitude
/// fails with [`AudioError::CorruptAudio`] rather than being silently patched.
pub fn decode_upload(bytes: &[u8], format: AudioFormat) -> Result<AudioSample, AudioError> {
    let decoded = decode::decode_bytes(bytes, format)?;
    if let Some(position) = decoded.samples.iter().position(|v| !v.is_finite()) {
        return Err(AudioError::CorruptAudio(format!(
            "non-finite amplitude at sample {position}"
        )));
    }
    let mono = downmix_to_mono(&decoded.samples, decoded.channels);
    let mut resampled = resample_linear(&mono, decoded.sample_rate, ANALYSIS_SAMPLE_RATE);
    flush_denormals(&mut resampled);
    if resampled.is_empty() {
        return Err(AudioError::CorruptAudio(
            "waveform empty after resampling".to_string(),
        ));
    }
    let duration_seconds = resampled.len() as f32 / ANALYSIS_SAMPLE_RATE as f32;
    Ok(AudioSample {
        mono: resampled,
        sample_rate: ANALYSIS_SAMPLE_RATE,
        duration_seconds,
    })
}

/// Read the duration of a WAV upload from its header without a full decode.
///
/// Returns `None` for non-WAV formats or unreadable headers; callers use this
/// only for logging before the pipeline runs.
pub fn probe_wav_duration_seconds(bytes: &[u8]) -> Option<f32> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate.max(1) as f32;
    let frames = reader.duration() as f32;
    Some((frames / sample_rate).max(0.0))
}

fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let start = frame * channels;
        let sum: f32 = samples[start..start + channels].iter().sum();
        mono.push((sum / channels as f32).clamp(-1.0, 1.0));
    }
    mono
}

/// Resample mono samples with linear interpolation.
fn resample_linear(samples: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    let input_rate = input_rate.max(1);
    let output_rate = output_rate.max(1);
    if samples.is_empty() || input_rate == output_rate {
        return samples.to_vec();
    }
    let duration = samples.len() as f64 / input_rate as f64;
    let out_len = (duration * output_rate as f64).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * input_rate as f64 / output_rate as f64;
        let idx0 = pos.floor() as usize;
        let idx1 = (idx0 + 1).min(samples.len() - 1);
        let frac = (pos - idx0 as f64) as f32;
        let a = samples.get(idx0).copied().unwrap_or(0.0);
        let b = samples.get(idx1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

/// Zero out subnormal amplitudes; they carry no signal and slow the FFT path.
fn flush_denormals(samples: &mut [f32]) {
    for sample in samples.iter_mut() {
        if *sample != 0.0 && sample.abs() < f32::MIN_POSITIVE {
            *sample = 0.0;
        }
    }
}
