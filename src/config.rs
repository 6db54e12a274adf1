//! Engine configuration loaded from a TOML file under the app root.
//!
//! The config names the serialized classifier model and the diagnosis history
//! database. Both default to paths inside the `.compdiag` directory so a fresh
//! install works without a config file.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

/// File name of the engine configuration inside the app root.
pub const CONFIG_FILE_NAME: &str = "compdiag.toml";
/// File name of the default bundled classifier model.
pub const DEFAULT_MODEL_FILE_NAME: &str = "compressor_logreg_v1.json";
/// File name of the diagnosis history database.
pub const DEFAULT_DB_FILE_NAME: &str = "diagnoses.db";

/// Errors raised while loading or saving the engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The app directory layout could not be resolved.
    #[error("Failed to resolve application directory: {0}")]
    AppDir(#[from] app_dirs::AppDirError),
    /// Reading the config file failed.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML for the expected shape.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Serializing the config to TOML failed.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// Writing the config file failed.
    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Engine configuration: where the model and the history database live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the serialized classifier model (JSON).
    pub model_path: PathBuf,
    /// Path to the SQLite diagnosis history database.
    pub database_path: PathBuf,
}

impl EngineConfig {
    /// Build the default configuration rooted in the app directory.
    pub fn default_paths() -> Result<Self, ConfigError> {
        let models = app_dirs::models_dir()?;
        let root = app_dirs::app_root_dir()?;
        Ok(Self {
            model_path: models.join(DEFAULT_MODEL_FILE_NAME),
            database_path: root.join(DEFAULT_DB_FILE_NAME),
        })
    }
}

/// Resolve the configuration file path inside the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the app root. On first run the defaults are
/// written to disk so operators have a file to edit.
pub fn load_or_init() -> Result<EngineConfig, ConfigError> {
    let path = config_path()?;
    if path.exists() {
        load_from(&path)
    } else {
        let config = EngineConfig::default_paths()?;
        save(&config)?;
        Ok(config)
    }
}

/// Load configuration from a specific TOML file.
pub fn load_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Persist configuration to the app root, replacing previous contents.
pub fn save(config: &EngineConfig) -> Result<(), ConfigError> {
    let path = config_path()?;
    save_to(config, &path)
}

/// Save configuration to a specific path, atomically via a sibling temp file
/// so a crash never leaves a half-written config behind.
pub fn save_to(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    let data = toml::to_string_pretty(config)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let map_write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(map_write_err)?;
    tmp.write_all(data.as_bytes()).map_err(map_write_err)?;
    tmp.persist(path)
        .map_err(|err| map_write_err(err.error))?;
    Ok(())
}
