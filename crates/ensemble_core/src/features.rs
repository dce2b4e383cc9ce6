//! Feature contract and reference feature derivations
//!
//! The contract is the ordered feature-name list an ensemble was trained on.
//! A split's feature index means "the quantity at this position in the
//! list", so samples are always built through the contract rather than by
//! position.
//!
//! The derivation helpers reproduce the training-time feature engineering so
//! that an online feature pipeline can be checked against it. The evaluator
//! never calls them.
use crate::errors::{EnsembleError, Result};
use crate::evaluator::Sample;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static POSITIONAL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^f(\d+)$").expect("positional token pattern"));

/// How features the caller did not mention are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AbsentFeature {
    /// Route through each split's `missing` branch
    #[default]
    Missing,
    /// Substitute 0.0 and compare numerically
    ZeroFill,
}

/// Ordered, unique feature names shared by every horizon of an ensemble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureContract {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl FeatureContract {
    /// Build a contract from an ordered name list.
    ///
    /// Names must be non-empty and unique. A name of the positional form
    /// `f<N>` is only accepted at position `N`, so positional tokens in tree
    /// dumps can never be confused with a named feature.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(EnsembleError::FeatureContract(
                "feature list is empty".into(),
            ));
        }

        let mut index = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(EnsembleError::FeatureContract(format!(
                    "feature {position} has an empty name"
                )));
            }
            if let Some(token_index) = positional_index(name) {
                if token_index != position {
                    return Err(EnsembleError::FeatureContract(format!(
                        "feature name {name} at position {position} collides with positional token"
                    )));
                }
            }
            if index.insert(name.clone(), position).is_some() {
                return Err(EnsembleError::FeatureContract(format!(
                    "duplicate feature name {name}"
                )));
            }
        }

        Ok(Self { names, index })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a feature by exact name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Resolve a dump feature token (`f<N>` or a feature name) to an index
    pub fn resolve(&self, token: &str) -> Option<usize> {
        match positional_index(token) {
            Some(index) if index < self.names.len() => Some(index),
            Some(_) => None,
            None => self.index_of(token),
        }
    }

    /// Positional token written into artifacts for a feature index
    pub fn token(index: usize) -> String {
        format!("f{index}")
    }

    /// Build a sample from named values.
    ///
    /// Names listed in `missing` are marked missing even when `values` also
    /// carries a number for them. Names in neither follow `absent`.
    pub fn sample_from_map<'a, V, M>(
        &self,
        values: V,
        missing: M,
        absent: AbsentFeature,
    ) -> Result<Sample>
    where
        V: IntoIterator<Item = (&'a str, f64)>,
        M: IntoIterator<Item = &'a str>,
    {
        let mut sample = match absent {
            AbsentFeature::Missing => Sample::missing(self.len()),
            AbsentFeature::ZeroFill => Sample::from_dense(&vec![0.0; self.len()]),
        };

        for (name, value) in values {
            sample.set(self.require(name)?, value)?;
        }
        for name in missing {
            sample.mark_missing(self.require(name)?)?;
        }

        Ok(sample)
    }

    /// Build a sample from a JSON object `{name: number | null}`; `null`
    /// marks a feature explicitly missing.
    pub fn sample_from_json(&self, value: &serde_json::Value, absent: AbsentFeature) -> Result<Sample> {
        let object = value.as_object().ok_or_else(|| {
            EnsembleError::FeatureContract("sample must be a JSON object".into())
        })?;

        let mut present = Vec::with_capacity(object.len());
        let mut missing = Vec::new();
        for (name, raw) in object {
            match raw {
                serde_json::Value::Null => missing.push(name.as_str()),
                other => {
                    let number = other.as_f64().ok_or_else(|| {
                        EnsembleError::FeatureContract(format!(
                            "feature {name} must be a number or null, found {other}"
                        ))
                    })?;
                    present.push((name.as_str(), number));
                }
            }
        }

        self.sample_from_map(present, missing, absent)
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| EnsembleError::FeatureContract(format!("unknown feature {name}")))
    }
}

fn positional_index(token: &str) -> Option<usize> {
    POSITIONAL_TOKEN
        .captures(token)
        .and_then(|caps| caps[1].parse().ok())
}

// ---------------------------------------------------------------------
// Reference derivations
// ---------------------------------------------------------------------

/// Category set the category features are computed over
pub const CATEGORIES: [&str; 8] = [
    "breadth",
    "credit",
    "crypto",
    "global",
    "liquidity",
    "macro",
    "positioning",
    "volatility",
];

/// Rate-of-change cut points for a momentum signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumThresholds {
    pub strong_up: f64,
    pub up: f64,
    pub down: f64,
    pub strong_down: f64,
}

pub const MOMENTUM_7D: MomentumThresholds = MomentumThresholds {
    strong_up: 5.0,
    up: 2.0,
    down: -2.0,
    strong_down: -5.0,
};

pub const MOMENTUM_30D: MomentumThresholds = MomentumThresholds {
    strong_up: 10.0,
    up: 4.0,
    down: -4.0,
    strong_down: -10.0,
};

/// Five-level momentum signal in {-2, -1, 0, 1, 2}; unknown deltas map to 0
pub fn momentum_signal(delta: Option<f64>, thresholds: &MomentumThresholds) -> f64 {
    match delta {
        Some(d) if !d.is_nan() => {
            if d > thresholds.strong_up {
                2.0
            } else if d > thresholds.up {
                1.0
            } else if d > thresholds.down {
                0.0
            } else if d > thresholds.strong_down {
                -1.0
            } else {
                -2.0
            }
        }
        _ => 0.0,
    }
}

/// Weekly change against the 30-day change scaled to a week
pub fn acceleration(delta_7d: f64, delta_30d: f64) -> f64 {
    delta_7d - delta_30d / 4.3
}

/// Three-level acceleration signal in {-1, 0, 1}
pub fn acceleration_signal(acceleration: f64) -> f64 {
    if acceleration > 2.0 {
        1.0
    } else if acceleration < -2.0 {
        -1.0
    } else {
        0.0
    }
}

/// Cross-sectional statistics over the category scores of one day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryStats {
    /// max - min
    pub dispersion: f64,
    pub mean: f64,
    /// Sample standard deviation; NaN with fewer than two scores
    pub std: f64,
    /// Scores below 20
    pub extreme_low: usize,
    /// Scores above 80
    pub extreme_high: usize,
    /// Scores below 40
    pub weak: usize,
    /// Scores above 60
    pub strong: usize,
}

impl CategoryStats {
    /// Statistics over the available scores; NaN entries are skipped
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        let present: Vec<f64> = scores.iter().copied().filter(|s| !s.is_nan()).collect();
        if present.is_empty() {
            return None;
        }

        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = present.iter().sum::<f64>() / present.len() as f64;

        Some(Self {
            dispersion: max - min,
            mean,
            std: sample_std(&present, mean),
            extreme_low: present.iter().filter(|&&s| s < 20.0).count(),
            extreme_high: present.iter().filter(|&&s| s > 80.0).count(),
            weak: present.iter().filter(|&&s| s < 40.0).count(),
            strong: present.iter().filter(|&&s| s > 60.0).count(),
        })
    }
}

/// Score bucket over the right-inclusive bins (0,20], (20,40], ... (80,100]
pub fn pxi_bucket(score: f64) -> Option<f64> {
    const EDGES: [f64; 6] = [0.0, 20.0, 40.0, 60.0, 80.0, 100.0];
    EDGES
        .windows(2)
        .position(|edge| score > edge[0] && score <= edge[1])
        .map(|bucket| bucket as f64)
}

/// Trailing mean; `None` until the window is full
pub fn rolling_mean(series: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(series, window, |values| {
        values.iter().sum::<f64>() / values.len() as f64
    })
}

/// Trailing sample standard deviation; `None` until the window is full
pub fn rolling_std(series: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(series, window, |values| {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        sample_std(values, mean)
    })
}

/// `(vix_high, vix_low)` regime flags
pub fn vix_flags(vix: f64) -> (f64, f64) {
    (f64::from(vix > 25.0), f64::from(vix < 15.0))
}

fn rolling(series: &[f64], window: usize, stat: impl Fn(&[f64]) -> f64) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|end| {
            if window == 0 || end + 1 < window {
                None
            } else {
                Some(stat(&series[end + 1 - window..=end]))
            }
        })
        .collect()
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
