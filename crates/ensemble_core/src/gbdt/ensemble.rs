//! Canonical tree-ensemble artifact
//!
//! One `Ensemble` holds the ordered feature-name list shared by every
//! horizon, and per horizon the base score plus the ordered tree sequence.
//! It is immutable once built; decoders for every supported artifact shape
//! produce this same type.

use super::tree::Tree;
use crate::codec::SchemaVersion;
use crate::errors::{EnsembleError, Result};
use crate::features::FeatureContract;
use std::collections::BTreeMap;

/// Horizon label used when an artifact shape carries a single unnamed model
pub const DEFAULT_HORIZON: &str = "default";

/// Model family tag written into verbose artifacts
pub const MODEL_TYPE: &str = "xgboost";

/// One independent sub-model of an ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct Horizon {
    base_score: f64,
    trees: Vec<Tree>,
}

impl Horizon {
    pub fn new(base_score: f64, trees: Vec<Tree>) -> Self {
        Self { base_score, trees }
    }

    /// Constant offset added after summing tree contributions
    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Decoded, validated tree-ensemble artifact
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    /// Version of the artifact this ensemble was decoded from
    schema_version: SchemaVersion,
    contract: FeatureContract,
    horizons: BTreeMap<String, Horizon>,
    /// Free-text metadata; carried by the verbose form only
    metadata: BTreeMap<String, String>,
}

impl Ensemble {
    /// Build an ensemble where every horizon shares one base score
    pub fn new(
        feature_names: Vec<String>,
        base_score: f64,
        trees_by_horizon: BTreeMap<String, Vec<Tree>>,
    ) -> Result<Self> {
        let horizons = trees_by_horizon
            .into_iter()
            .map(|(label, trees)| (label, Horizon::new(base_score, trees)))
            .collect();
        Self::from_horizons(feature_names, horizons)
    }

    /// Build an ensemble with a base score per horizon
    pub fn from_horizons(
        feature_names: Vec<String>,
        horizons: BTreeMap<String, Horizon>,
    ) -> Result<Self> {
        let contract = FeatureContract::new(feature_names)
            .map_err(|e| EnsembleError::MalformedArtifact(e.to_string()))?;
        let ensemble = Self {
            schema_version: SchemaVersion::CURRENT,
            contract,
            horizons,
            metadata: BTreeMap::new(),
        };
        ensemble.validate()?;
        Ok(ensemble)
    }

    /// Attach a free-text metadata entry (not part of the prediction model)
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn with_source_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = version;
        self
    }

    pub(crate) fn with_metadata_map(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Validate ensemble structure
    pub fn validate(&self) -> Result<()> {
        if self.horizons.is_empty() {
            return Err(EnsembleError::MalformedArtifact(
                "Ensemble has no horizons".into(),
            ));
        }

        let n_features = self.contract.len();
        for (label, horizon) in &self.horizons {
            if label.is_empty() {
                return Err(EnsembleError::MalformedArtifact(
                    "Horizon label is empty".into(),
                ));
            }
            if !horizon.base_score.is_finite() {
                return Err(EnsembleError::MalformedArtifact(format!(
                    "Horizon {label} has non-finite base score {}",
                    horizon.base_score
                )));
            }
            if horizon.trees.is_empty() {
                return Err(EnsembleError::MalformedArtifact(format!(
                    "Horizon {label} has no trees"
                )));
            }

            for (t_idx, tree) in horizon.trees.iter().enumerate() {
                if let Some(feature) = tree.max_feature() {
                    if feature >= n_features {
                        return Err(EnsembleError::MalformedArtifact(format!(
                            "Horizon {label} tree {t_idx} splits on feature {feature} \
                             but only {n_features} features are declared"
                        )));
                    }
                }
                for node in tree.nodes() {
                    let finite = match node {
                        super::Node::Leaf { value, .. } => value.is_finite(),
                        super::Node::Split { threshold, .. } => threshold.is_finite(),
                    };
                    if !finite {
                        return Err(EnsembleError::MalformedArtifact(format!(
                            "Horizon {label} tree {t_idx} node {} has a non-finite value",
                            node.id()
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    /// Ordered feature names; a split's feature index refers into this list
    pub fn feature_names(&self) -> &[String] {
        self.contract.names()
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    /// Look up a horizon by label
    pub fn horizon(&self, label: &str) -> Result<&Horizon> {
        self.horizons
            .get(label)
            .ok_or_else(|| EnsembleError::UnknownHorizon(label.to_string()))
    }

    pub fn horizons(&self) -> &BTreeMap<String, Horizon> {
        &self.horizons
    }

    pub fn horizon_labels(&self) -> impl Iterator<Item = &str> {
        self.horizons.keys().map(String::as_str)
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Total number of trees across all horizons
    pub fn num_trees(&self) -> usize {
        self.horizons.values().map(Horizon::num_trees).sum()
    }
}
