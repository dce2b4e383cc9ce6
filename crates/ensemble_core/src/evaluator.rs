//! Deterministic ensemble evaluation
//!
//! Evaluation is a pure function of an immutable `Ensemble` and a `Sample`;
//! nothing is cached between calls, so one decoded ensemble can be shared
//! across threads and evaluated concurrently. Errors are scoped to the single
//! prediction that raised them.

use crate::errors::{EnsembleError, Result};
use crate::gbdt::Ensemble;
use std::collections::BTreeMap;

/// Feature values for one prediction, aligned to an ensemble's feature list.
///
/// `None` marks a feature as explicitly missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    values: Vec<Option<f64>>,
}

impl Sample {
    /// Sample of `len` features, all marked missing
    pub fn missing(len: usize) -> Self {
        Self {
            values: vec![None; len],
        }
    }

    /// Sample with every feature present
    pub fn from_dense(values: &[f64]) -> Self {
        Self {
            values: values.iter().copied().map(Some).collect(),
        }
    }

    pub fn from_options(values: Vec<Option<f64>>) -> Self {
        Self { values }
    }

    /// Set a present value for the feature at `index`
    pub fn set(&mut self, index: usize, value: f64) -> Result<()> {
        *self.slot_mut(index)? = Some(value);
        Ok(())
    }

    /// Mark the feature at `index` as explicitly missing
    pub fn mark_missing(&mut self, index: usize) -> Result<()> {
        *self.slot_mut(index)? = None;
        Ok(())
    }

    /// Value slot at `index`; `None` when the index is out of range
    #[inline]
    pub fn get(&self, index: usize) -> Option<Option<f64>> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Option<f64>> {
        let len = self.values.len();
        self.values.get_mut(index).ok_or_else(|| {
            EnsembleError::FeatureContract(format!(
                "feature index {index} out of range for sample of {len} features"
            ))
        })
    }
}

/// Anything that can score a sample for a named horizon
pub trait Evaluator: Send + Sync {
    /// Ordered feature names the sample must be aligned to
    fn feature_names(&self) -> &[String];

    /// Scalar prediction for `horizon`
    fn predict(&self, horizon: &str, sample: &Sample) -> Result<f64>;
}

impl Ensemble {
    /// Predict one horizon: sum of tree contributions plus the base score.
    pub fn predict(&self, horizon: &str, sample: &Sample) -> Result<f64> {
        let model = self.horizon(horizon)?;

        let expected = self.contract().len();
        if sample.len() != expected {
            return Err(EnsembleError::FeatureContract(format!(
                "sample has {} features, ensemble expects {expected}",
                sample.len()
            )));
        }

        let mut sum = 0.0f64;
        for (t_idx, tree) in model.trees().iter().enumerate() {
            sum += tree
                .evaluate(sample)
                .map_err(|fault| EnsembleError::InternalConsistency {
                    horizon: horizon.to_string(),
                    tree: t_idx,
                    node: fault.node(),
                    detail: fault.to_string(),
                })?;
        }

        Ok(sum + model.base_score())
    }

    /// Predict every horizon for the same sample
    pub fn predict_all(&self, sample: &Sample) -> Result<BTreeMap<String, f64>> {
        self.horizon_labels()
            .map(|label| Ok((label.to_string(), self.predict(label, sample)?)))
            .collect()
    }
}

impl Evaluator for Ensemble {
    fn feature_names(&self) -> &[String] {
        Ensemble::feature_names(self)
    }

    fn predict(&self, horizon: &str, sample: &Sample) -> Result<f64> {
        Ensemble::predict(self, horizon, sample)
    }
}
