//! Recurrent-network weight export contract
//!
//! The forecasting pipeline also ships a single-layer LSTM with a linear head
//! per horizon. This module only checks that an export is shaped the way the
//! edge runtime expects; it does not run the network.
//!
//! For hidden size `H` and `I` input features:
//!
//! | tensor          | shape    |
//! |-----------------|----------|
//! | `lstm.weight_ih`| `4H × I` |
//! | `lstm.weight_hh`| `4H × H` |
//! | `lstm.bias_ih`  | `4H`     |
//! | `lstm.bias_hh`  | `4H`     |
//! | `fc.weight`     | `1 × H`  |
//! | `fc.bias`       | `1`      |

use crate::codec::SchemaVersion;
use crate::errors::{EnsembleError, Result};
use crate::serialization::{canonical_json_string, compact_canonical_json_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// Model family tag of verbose LSTM exports
pub const LSTM_TYPE: &str = "lstm";

/// Per-feature standardization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: f64,
    pub std: f64,
}

impl Normalization {
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// Recurrent layer tensors, gates ordered input, forget, cell, output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    pub weight_ih: Vec<Vec<f64>>,
    pub weight_hh: Vec<Vec<f64>>,
    pub bias_ih: Vec<f64>,
    pub bias_hh: Vec<f64>,
}

/// Linear output head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub weight: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// Weights for one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmWeights {
    pub lstm: LstmLayer,
    pub fc: Dense,
}

/// Decoded, shape-checked LSTM export
#[derive(Debug, Clone, PartialEq)]
pub struct LstmExport {
    pub sequence_length: usize,
    pub hidden_size: usize,
    pub feature_names: Vec<String>,
    pub normalization: BTreeMap<String, Normalization>,
    pub models: BTreeMap<String, LstmWeights>,
    /// Free-text metadata; carried by the verbose form only
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VerboseConfig {
    sequence_length: usize,
    hidden_size: usize,
    feature_names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelConfig {
    input_size: usize,
    hidden_size: usize,
    seq_length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct VerboseModel {
    lstm: LstmLayer,
    fc: Dense,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<ModelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normalization: Option<BTreeMap<String, Normalization>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VerboseExport {
    #[serde(rename = "type")]
    kind: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    config: VerboseConfig,
    normalization: BTreeMap<String, Normalization>,
    models: BTreeMap<String, VerboseModel>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompactConfig {
    s: usize,
    h: usize,
    f: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompactExport {
    v: String,
    c: CompactConfig,
    n: BTreeMap<String, Normalization>,
    m: BTreeMap<String, LstmWeights>,
}

/// Only schema version the LSTM export has ever used
const LSTM_VERSION: SchemaVersion = SchemaVersion::V1_0;

impl LstmExport {
    /// Decode a verbose or compact export and check every tensor shape
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| EnsembleError::MalformedArtifact(format!("invalid JSON: {e}")))?;

        let export = if value.get("v").is_some() {
            check_version(value.get("v"))?;
            let compact: CompactExport = from_value(value)?;
            Self {
                sequence_length: compact.c.s,
                hidden_size: compact.c.h,
                feature_names: compact.c.f,
                normalization: compact.n,
                models: compact.m,
                metadata: BTreeMap::new(),
            }
        } else if value.get("type").is_some() {
            check_version(value.get("version"))?;
            let verbose: VerboseExport = from_value(value)?;
            if verbose.kind != LSTM_TYPE {
                return Err(EnsembleError::MalformedArtifact(format!(
                    "model type `{}`, expected `{LSTM_TYPE}`",
                    verbose.kind
                )));
            }
            for (label, model) in &verbose.models {
                if let Some(config) = &model.config {
                    if config.input_size != verbose.config.feature_names.len()
                        || config.hidden_size != verbose.config.hidden_size
                        || config.seq_length != verbose.config.sequence_length
                    {
                        return Err(EnsembleError::MalformedArtifact(format!(
                            "model {label} config disagrees with the export config"
                        )));
                    }
                }
            }
            Self {
                sequence_length: verbose.config.sequence_length,
                hidden_size: verbose.config.hidden_size,
                feature_names: verbose.config.feature_names,
                normalization: verbose.normalization,
                models: verbose
                    .models
                    .into_iter()
                    .map(|(label, model)| {
                        (
                            label,
                            LstmWeights {
                                lstm: model.lstm,
                                fc: model.fc,
                            },
                        )
                    })
                    .collect(),
                metadata: verbose
                    .created_at
                    .map(|created_at| BTreeMap::from([("created_at".to_string(), created_at)]))
                    .unwrap_or_default(),
            }
        } else {
            return Err(EnsembleError::MalformedArtifact(
                "unrecognised LSTM export shape".into(),
            ));
        };

        export.validate()?;
        info!(
            horizons = export.models.len(),
            hidden_size = export.hidden_size,
            features = export.feature_names.len(),
            "decoded LSTM export"
        );
        Ok(export)
    }

    /// Check dimensions and normalization parameters
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(EnsembleError::MalformedArtifact("export has no models".into()));
        }
        if self.sequence_length == 0 || self.hidden_size == 0 || self.feature_names.is_empty() {
            return Err(EnsembleError::MalformedArtifact(
                "sequence length, hidden size and feature list must be non-empty".into(),
            ));
        }

        for name in &self.feature_names {
            let norm = self.normalization.get(name).ok_or_else(|| {
                EnsembleError::MalformedArtifact(format!("no normalization for feature {name}"))
            })?;
            if !norm.mean.is_finite() || !norm.std.is_finite() || norm.std == 0.0 {
                return Err(EnsembleError::MalformedArtifact(format!(
                    "invalid normalization for feature {name}: mean {} std {}",
                    norm.mean, norm.std
                )));
            }
        }

        let gates = 4 * self.hidden_size;
        let inputs = self.feature_names.len();
        for (label, weights) in &self.models {
            let check = |what: &str, ok: bool| {
                if ok {
                    Ok(())
                } else {
                    Err(EnsembleError::MalformedArtifact(format!(
                        "model {label}: {what} has the wrong shape"
                    )))
                }
            };
            check("lstm.weight_ih", is_matrix(&weights.lstm.weight_ih, gates, inputs))?;
            check(
                "lstm.weight_hh",
                is_matrix(&weights.lstm.weight_hh, gates, self.hidden_size),
            )?;
            check("lstm.bias_ih", is_vector(&weights.lstm.bias_ih, gates))?;
            check("lstm.bias_hh", is_vector(&weights.lstm.bias_hh, gates))?;
            check("fc.weight", is_matrix(&weights.fc.weight, 1, self.hidden_size))?;
            check("fc.bias", is_vector(&weights.fc.bias, 1))?;
        }

        Ok(())
    }

    /// Standardize one raw feature row using the export's parameters
    pub fn normalize_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.feature_names.len() {
            return Err(EnsembleError::FeatureContract(format!(
                "row has {} features, export expects {}",
                row.len(),
                self.feature_names.len()
            )));
        }
        self.feature_names
            .iter()
            .zip(row)
            .map(|(name, value)| {
                self.normalization
                    .get(name)
                    .map(|norm| norm.apply(*value))
                    .ok_or_else(|| {
                        EnsembleError::FeatureContract(format!("no normalization for {name}"))
                    })
            })
            .collect()
    }

    /// Pretty verbose form
    pub fn to_verbose_json(&self) -> Result<String> {
        let export = VerboseExport {
            kind: LSTM_TYPE.to_string(),
            version: LSTM_VERSION.to_string(),
            created_at: self.metadata.get("created_at").cloned(),
            config: VerboseConfig {
                sequence_length: self.sequence_length,
                hidden_size: self.hidden_size,
                feature_names: self.feature_names.clone(),
            },
            normalization: self.normalization.clone(),
            models: self
                .models
                .iter()
                .map(|(label, weights)| {
                    (
                        label.clone(),
                        VerboseModel {
                            lstm: weights.lstm.clone(),
                            fc: weights.fc.clone(),
                            config: Some(ModelConfig {
                                input_size: self.feature_names.len(),
                                hidden_size: self.hidden_size,
                                seq_length: self.sequence_length,
                            }),
                            normalization: Some(self.normalization.clone()),
                        },
                    )
                })
                .collect(),
        };
        Ok(canonical_json_string(&export)?)
    }

    /// Whitespace-free compact form with minimized keys
    pub fn to_compact_json(&self) -> Result<String> {
        let export = CompactExport {
            v: LSTM_VERSION.to_string(),
            c: CompactConfig {
                s: self.sequence_length,
                h: self.hidden_size,
                f: self.feature_names.clone(),
            },
            n: self.normalization.clone(),
            m: self.models.clone(),
        };
        Ok(compact_canonical_json_string(&export)?)
    }
}

fn check_version(raw: Option<&Value>) -> Result<()> {
    let raw = raw.and_then(Value::as_str).ok_or_else(|| {
        EnsembleError::MalformedArtifact("LSTM export version must be a string".into())
    })?;
    if SchemaVersion::parse(raw)? != LSTM_VERSION {
        return Err(EnsembleError::UnsupportedSchemaVersion(raw.to_string()));
    }
    Ok(())
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| EnsembleError::MalformedArtifact(format!("LSTM export: {e}")))
}

fn is_matrix(matrix: &[Vec<f64>], rows: usize, cols: usize) -> bool {
    matrix.len() == rows && matrix.iter().all(|row| is_vector(row, cols))
}

fn is_vector(vector: &[f64], len: usize) -> bool {
    vector.len() == len && vector.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const H: usize = 2;

    fn matrix(rows: usize, cols: usize) -> Vec<Vec<f64>> {
        (0..rows)
            .map(|r| (0..cols).map(|c| (r * cols + c) as f64 * 0.01).collect())
            .collect()
    }

    fn weights() -> Value {
        json!({
            "lstm": {
                "weight_ih": matrix(4 * H, 3),
                "weight_hh": matrix(4 * H, H),
                "bias_ih": vec![0.0; 4 * H],
                "bias_hh": vec![0.1; 4 * H],
            },
            "fc": {"weight": matrix(1, H), "bias": [0.5]},
        })
    }

    fn normalization() -> Value {
        json!({
            "pxi_score": {"mean": 50.0, "std": 10.0},
            "vix": {"mean": 20.0, "std": 5.0},
            "momentum": {"mean": 0.0, "std": 1.0},
        })
    }

    fn compact() -> Value {
        json!({
            "v": "1.0",
            "c": {"s": 20, "h": H, "f": ["pxi_score", "vix", "momentum"]},
            "n": normalization(),
            "m": {"7d": weights(), "30d": weights()},
        })
    }

    #[test]
    fn test_decode_compact() {
        let export = LstmExport::from_slice(compact().to_string().as_bytes()).unwrap();
        assert_eq!(export.sequence_length, 20);
        assert_eq!(export.hidden_size, H);
        assert_eq!(export.models.len(), 2);
        assert_eq!(export.models["7d"].fc.bias, vec![0.5]);
    }

    #[test]
    fn test_decode_verbose() {
        let mut model = weights();
        model["config"] = json!({"input_size": 3, "hidden_size": H, "seq_length": 20});
        model["normalization"] = normalization();
        let verbose = json!({
            "type": "lstm",
            "version": "1.0",
            "created_at": "2026-03-01T12:00:00",
            "config": {
                "sequence_length": 20,
                "hidden_size": H,
                "feature_names": ["pxi_score", "vix", "momentum"],
            },
            "normalization": normalization(),
            "models": {"7d": model},
            "metrics": {"7d": {"val_loss": 0.4}},
        });

        let export = LstmExport::from_slice(verbose.to_string().as_bytes()).unwrap();
        assert_eq!(
            export.metadata.get("created_at").map(String::as_str),
            Some("2026-03-01T12:00:00")
        );

        let compact = LstmExport::from_slice(export.to_compact_json().unwrap().as_bytes()).unwrap();
        assert_eq!(compact.models, export.models);
        assert!(compact.metadata.is_empty());

        let again = LstmExport::from_slice(export.to_verbose_json().unwrap().as_bytes()).unwrap();
        assert_eq!(again, export);
    }

    #[test]
    fn test_shape_errors() {
        let mut bad = compact();
        bad["m"]["7d"]["lstm"]["weight_ih"] = json!(matrix(4 * H, 2));
        let err = LstmExport::from_slice(bad.to_string().as_bytes()).unwrap_err();
        assert!(err.to_string().contains("lstm.weight_ih"), "{err}");

        let mut bad = compact();
        bad["m"]["30d"]["fc"]["bias"] = json!([0.5, 0.5]);
        let err = LstmExport::from_slice(bad.to_string().as_bytes()).unwrap_err();
        assert!(err.to_string().contains("fc.bias"), "{err}");

        let mut bad = compact();
        bad["n"]["vix"]["std"] = json!(0.0);
        assert!(matches!(
            LstmExport::from_slice(bad.to_string().as_bytes()),
            Err(EnsembleError::MalformedArtifact(_))
        ));

        let mut bad = compact();
        bad["c"]["f"] = json!(["pxi_score", "vix", "breadth"]);
        assert!(LstmExport::from_slice(bad.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_version_and_type_checks() {
        let mut future = compact();
        future["v"] = json!("2.1");
        assert!(matches!(
            LstmExport::from_slice(future.to_string().as_bytes()),
            Err(EnsembleError::UnsupportedSchemaVersion(_))
        ));

        let wrong_type = json!({"type": "xgboost", "version": "1.0", "config": {
            "sequence_length": 20, "hidden_size": H, "feature_names": ["a"]},
            "normalization": {}, "models": {}});
        assert!(matches!(
            LstmExport::from_slice(wrong_type.to_string().as_bytes()),
            Err(EnsembleError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_normalize_row() {
        let export = LstmExport::from_slice(compact().to_string().as_bytes()).unwrap();
        assert_eq!(
            export.normalize_row(&[60.0, 15.0, 2.0]).unwrap(),
            vec![1.0, -1.0, 2.0]
        );
        assert!(matches!(
            export.normalize_row(&[1.0]),
            Err(EnsembleError::FeatureContract(_))
        ));
    }
}
