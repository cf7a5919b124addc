//! Application configuration, loaded from a JSON file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::generator::GeneratorConfig;
use crate::schema::Schema;

pub const DEFAULT_CONFIG_FILE: &str = "segment_builder.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("page_size must be at least 1")]
    InvalidPageSize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory of the saved filter database
    pub store_path: PathBuf,
    /// Author recorded on newly saved filters
    pub created_by: String,
    /// Saved filters shown per directory page
    pub page_size: usize,
    pub generator: GeneratorConfig,
    /// Replaces the built-in retail schema for compilation when present
    pub schema: Option<Schema>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("segment_store"),
            created_by: "user_dashboard".to_string(),
            page_size: 10,
            generator: GeneratorConfig::default(),
            schema: None,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a JSON file; absent keys take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: AppConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if config.page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        Ok(config)
    }
}
