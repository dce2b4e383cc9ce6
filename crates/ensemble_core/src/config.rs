//! Codec and exporter configuration

use crate::errors::Result;
use crate::features::AbsentFeature;
use crate::gbdt::DEFAULT_HORIZON;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Settings that shape how artifacts are decoded and written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Horizon label given to single-target legacy artifacts
    pub default_horizon: String,
    /// How features absent from a named sample are treated
    pub absent_feature: AbsentFeature,
    /// Base score for legacy artifacts that omit one
    pub default_base_score: f64,
    /// Output locations used by the exporter
    pub output: OutputConfig,
}

/// Output file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub verbose_file: String,
    pub compact_file: String,
    /// File holding the hex fingerprint of the written artifact
    pub fingerprint_file: String,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            default_horizon: DEFAULT_HORIZON.to_string(),
            absent_feature: AbsentFeature::Missing,
            default_base_score: 0.5,
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("models"),
            verbose_file: "pxi_model.json".to_string(),
            compact_file: "pxi_model_compact.json".to_string(),
            fingerprint_file: "pxi_model.hash".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn verbose_path(&self) -> PathBuf {
        self.directory.join(&self.verbose_file)
    }

    pub fn compact_path(&self) -> PathBuf {
        self.directory.join(&self.compact_file)
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.directory.join(&self.fingerprint_file)
    }
}

impl CodecConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text; omitted keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CodecConfig = toml::from_str(content)?;
        config.validate();
        Ok(config)
    }

    /// Non-fatal configuration warnings
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.default_horizon.is_empty() {
            warnings.push("default_horizon is empty; legacy artifacts will not decode".to_string());
        }
        if !self.default_base_score.is_finite() {
            warnings.push("default_base_score is not finite".to_string());
        }
        if self.absent_feature == AbsentFeature::ZeroFill {
            warnings.push("absent features are zero-filled instead of routed as missing".to_string());
        }
        if self.output.verbose_file == self.output.compact_file {
            warnings.push("verbose and compact outputs share a file name".to_string());
        }

        if !warnings.is_empty() {
            warn!("Configuration validation warnings: {:?}", warnings);
        }
        warnings
    }
}
