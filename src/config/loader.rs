//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::config::value::CastError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The schema resource is missing or is not well-formed.
    #[error("cannot load config schema from {source_name}: {reason}")]
    SchemaLoad { source_name: String, reason: String },

    /// A schema default does not satisfy its own type tag.
    #[error("schema default for {key} is invalid: {source}")]
    SchemaDefault { key: String, source: CastError },

    /// A user override cannot be cast to the declared type tag.
    #[error("invalid value for {key} in {file}: {source}")]
    TypeCast {
        key: String,
        file: PathBuf,
        source: CastError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error in {file}: {source}")]
    Parse {
        file: PathBuf,
        source: toml::de::Error,
    },
}

/// Read the user override document, if one exists.
///
/// Returns `Ok(None)` when the file is absent. The TOML document is mapped
/// into a JSON value tree so that schema defaults and user values share one
/// casting path.
pub fn read_user_document(path: &Path) -> Result<Option<Value>, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = ?path, "No user config file, using schema defaults");
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let document: Value = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        file: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = ?path, "Loaded user config file");
    Ok(Some(document))
}
