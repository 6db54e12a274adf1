#![deny(missing_docs)]
#![deny(warnings)]

//! Command-line entry point: diagnose one compressor recording.
//!
//! Usage: `compdiag <audio-file> [device-id]`. The result is printed to
//! stdout and appended to the diagnosis history database.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use compdiag::audio::{self, AudioFormat};
use compdiag::classifier::Model;
use compdiag::config;
use compdiag::diagnosis::Diagnoser;
use compdiag::logging;
use compdiag::store::DiagnosisStore;

fn main() -> ExitCode {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let mut args = std::env::args().skip(1);
    let Some(audio_path) = args.next() else {
        eprintln!("Usage: compdiag <audio-file> [device-id]");
        return ExitCode::FAILURE;
    };
    let device_id = args.next().unwrap_or_else(|| "unknown-device".to_string());

    match run(Path::new(&audio_path), &device_id) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(audio_path: &Path, device_id: &str) -> Result<(), String> {
    let format = audio_path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(AudioFormat::from_extension)
        .ok_or_else(|| format!("Unsupported audio format: {}", audio_path.display()))?;

    let bytes = std::fs::read(audio_path)
        .map_err(|err| format!("Failed to read {}: {err}", audio_path.display()))?;
    if format == AudioFormat::Wav
        && let Some(duration) = audio::probe_wav_duration_seconds(&bytes)
    {
        tracing::info!(path = %audio_path.display(), duration, "probed upload");
    }

    let config = config::load_or_init().map_err(|err| err.to_string())?;
    let model = Model::load_or_bundled(&config.model_path).map_err(|err| err.to_string())?;
    tracing::info!(model = model.summary(), "model ready");
    let store = DiagnosisStore::open(&config.database_path).map_err(|err| err.to_string())?;

    let diagnoser = Diagnoser::new(Arc::new(model), store);
    let result = diagnoser
        .diagnose(&bytes, format, device_id)
        .map_err(|err| format!("Diagnosis failed at {} stage: {err}", err.stage().as_str()))?;

    println!("device:     {}", result.device_id);
    println!("label:      {}", result.label.as_str());
    println!("confidence: {:.3} ({})", result.confidence, result.grade.as_str());
    println!(
        "model:      {} v{}",
        result.model_id, result.model_version
    );
    if !result.is_actionable(diagnoser.model()) {
        println!("note:       confidence below decision threshold, treat as inconclusive");
    }
    Ok(())
}
