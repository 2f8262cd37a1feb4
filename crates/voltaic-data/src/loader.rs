//! Format detection and file round trips for configs and circuits.
//!
//! The format is picked from the file extension: `.ron`, `.toml`, or
//! `.json`. Configs are validated after parsing; circuits are plain
//! [`CircuitSnapshot`]s and are restored through
//! [`Simulator::load_snapshot`](voltaic_core::simulator::Simulator::load_snapshot).

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;
use voltaic_core::config::{ConfigError, SimConfig};
use voltaic_core::serialize::CircuitSnapshot;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while reading or writing data files.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A value could not be encoded in the target format.
    #[error("failed to write {file}: {detail}")]
    Serialize { file: PathBuf, detail: String },

    /// The config parsed but holds an out-of-range value.
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Scan a directory for `{base_name}.ron`, `.toml`, or `.json`.
///
/// Returns `Ok(None)` if none exists and `Err(ConflictingFormats)` if more
/// than one does.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

// ===========================================================================
// Generic (de)serialization
// ===========================================================================

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Serialize a value in the format implied by `path` and write it there.
/// RON and JSON are pretty-printed.
pub fn serialize_file<T: Serialize>(path: &Path, value: &T) -> Result<(), DataLoadError> {
    let format = detect_format(path)?;
    let encode_error = |detail: String| DataLoadError::Serialize {
        file: path.to_path_buf(),
        detail,
    };

    let content = match format {
        Format::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
            .map_err(|e| encode_error(e.to_string()))?,
        Format::Json => {
            serde_json::to_string_pretty(value).map_err(|e| encode_error(e.to_string()))?
        }
        Format::Toml => toml::to_string(value).map_err(|e| encode_error(e.to_string()))?,
    };
    std::fs::write(path, content)?;
    Ok(())
}

// ===========================================================================
// Configs and circuits
// ===========================================================================

/// Load and validate a simulator config. Missing fields take their
/// defaults.
pub fn load_config(path: &Path) -> Result<SimConfig, DataLoadError> {
    let config: SimConfig = deserialize_file(path)?;
    config.validate()?;
    info!(file = %path.display(), time_step = config.time_step, "config loaded");
    Ok(config)
}

/// Load a saved circuit.
pub fn load_circuit(path: &Path) -> Result<CircuitSnapshot, DataLoadError> {
    let snapshot: CircuitSnapshot = deserialize_file(path)?;
    info!(
        file = %path.display(),
        components = snapshot.components.len(),
        "circuit loaded"
    );
    Ok(snapshot)
}

/// Save a circuit in the format implied by the extension.
pub fn save_circuit(path: &Path, snapshot: &CircuitSnapshot) -> Result<(), DataLoadError> {
    serialize_file(path, snapshot)?;
    info!(
        file = %path.display(),
        components = snapshot.components.len(),
        "circuit saved"
    );
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
