use std::io::Cursor;

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

use super::{AudioError, AudioFormat};

/// Decoder output before downmix and resampling.
pub(super) struct DecodedAudio {
    pub(super) samples: Vec<f32>,
    pub(super) sample_rate: u32,
    pub(super) channels: u16,
}

/// Decode uploaded bytes into interleaved `f32` samples.
///
/// The declared format is passed to the probe as a hint; an upload whose
/// contents cannot be recognized by any enabled codec is rejected as
/// `UnsupportedFormat`.
pub(super) fn decode_bytes(bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio, AudioError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| AudioError::UnsupportedFormat(format!("probe failed: {err}")))?;
    let mut reader = probed.format;
    let track = reader
        .default_track()
        .ok_or_else(|| AudioError::UnsupportedFormat("no default track".to_string()))?;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioError::CorruptAudio("missing sample rate".to_string()))?;
    let channels = codec_params
        .channels
        .ok_or_else(|| AudioError::CorruptAudio("missing channel count".to_string()))?
        .count() as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|err| AudioError::UnsupportedFormat(format!("no codec: {err}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            // End of stream surfaces as an IO error from the reader.
            Err(Error::IoError(_)) => break,
            Err(err) => {
                return Err(AudioError::CorruptAudio(format!(
                    "packet read failed: {err}"
                )));
            }
        };
        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(Error::DecodeError(_)) => continue,
            Err(err) => {
                return Err(AudioError::CorruptAudio(format!("decode failed: {err}")));
            }
        };
        let spec = *audio_buf.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(AudioError::CorruptAudio(
            "decoded zero samples".to_string(),
        ));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: sample_rate.max(1),
        channels: channels.max(1),
    })
}
