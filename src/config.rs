//! Engine configuration: thresholds, external collaborator endpoints, batching.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for one matewright engine instance.
///
/// All fields have working defaults; a TOML file may override any subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum confidence for a constraint to be accepted (default: 0.5).
    pub acceptance_threshold: f64,
    /// URL of the external geometric conflict-validation service.
    /// `None` means validation is always soft-skipped.
    pub solver_url: Option<String>,
    /// Timeout for a validation round-trip, in seconds.
    pub solver_timeout_secs: u64,
    /// URL of the external text-enrichment service for unresolved parts.
    pub enrichment_url: Option<String>,
    /// Timeout for an enrichment round-trip, in seconds.
    pub enrichment_timeout_secs: u64,
    /// Maximum constraints written to the store per batch.
    pub persist_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.5,
            solver_url: None,
            solver_timeout_secs: 10,
            enrichment_url: None,
            enrichment_timeout_secs: 30,
            persist_chunk_size: 100,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(ConfigError::ThresholdOutOfRange {
                value: self.acceptance_threshold,
            });
        }
        if self.persist_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}
