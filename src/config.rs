//! Cache configuration
//!
//! Defaults, optionally overlaid by a JSON file and then by environment
//! variables:
//!
//! | Variable                  | Field            |
//! |---------------------------|------------------|
//! | `WORDVEC_CACHE_DIR`       | `cache_dir`      |
//! | `WORDVEC_MAX_KEY_LENGTH`  | `max_key_length` |
//! | `WORDVEC_PERSIST`         | `persist`        |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wordvec_core::initializer::{InitializerConfig, InitializerError};
use wordvec_core::table::{LookupStrategy, TableOptions, DEFAULT_CACHE_DIR};
use wordvec_core::MAX_KEY_LENGTH;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Invalid unk_init: {0}")]
    Initializer(#[from] InitializerError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub max_key_length: usize,
    /// Write cache triples after building
    pub persist: bool,
    pub unk_init: InitializerConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_key_length: MAX_KEY_LENGTH,
            persist: true,
            unk_init: InitializerConfig::Zeros,
        }
    }
}

impl CacheConfig {
    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Read a JSON config file; missing fields keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(self.unk_init.validate()?)
    }

    /// Apply `WORDVEC_*` overrides looked up through `get`
    pub fn with_overrides<F>(mut self, get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = get("WORDVEC_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(value) = get("WORDVEC_MAX_KEY_LENGTH") {
            self.max_key_length = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "WORDVEC_MAX_KEY_LENGTH",
                value,
            })?;
        }
        if let Some(value) = get("WORDVEC_PERSIST") {
            self.persist = match value.trim() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "WORDVEC_PERSIST",
                        value,
                    })
                }
            };
        }
        Ok(self)
    }

    pub fn table_options(&self, strategy: LookupStrategy) -> Result<TableOptions, ConfigError> {
        let options = TableOptions::default()
            .with_max_key_length(self.max_key_length)
            .with_strategy(strategy)
            .with_shared_unk_init(self.unk_init.build()?);
        Ok(if self.persist {
            options.with_cache_dir(self.cache_dir.clone())
        } else {
            options.without_cache()
        })
    }
}
