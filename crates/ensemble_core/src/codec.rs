//! Versioned artifact codec
//!
//! Every artifact is decoded into the one canonical [`Ensemble`]. Shapes
//! accepted on decode:
//!
//! | shape                 | version key        | layout                                                   |
//! |-----------------------|--------------------|----------------------------------------------------------|
//! | verbose (current)     | `schema_version`   | `{schema_version, feature_names, horizons: {h: {type, n_estimators, base_score, trees}}, metadata}` |
//! | compact / multi-horizon | `v`              | `{v, f, m: {h: {b, t}}}`                                 |
//! | flat single-target    | `version`          | `{type, version, n_estimators, base_score, feature_names, trees}` |
//! | multi-model export    | per model `version`| `{created_at, feature_names, models: {h: flat}, metrics}` |
//!
//! The version is checked before any tree is parsed. Only the current
//! version is ever written, in two encodings: the pretty verbose form and the
//! whitespace-free compact form. Both carry identical prediction content.
//!
//! Trees use the nested node layout of the framework's JSON dump, with the
//! split feature written as its positional token (`f<index>`).

use crate::config::CodecConfig;
use crate::dump::parse_json_dump;
use crate::errors::{EnsembleError, Result};
use crate::features::FeatureContract;
use crate::gbdt::{Ensemble, Horizon, Node, Tree, MODEL_TYPE};
use crate::serialization::{
    canonical_json_string, compact_canonical_json_string, hash_canonical_hex,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Artifact schema versions this codec understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// Flat single-target export and the first compact multi-horizon export
    V1_0,
    /// Compact multi-horizon export built from text dumps
    V2_1,
    /// Canonical verbose / compact artifacts written by this crate
    V3_0,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V3_0;

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "1.0" => Ok(SchemaVersion::V1_0),
            "2.1" => Ok(SchemaVersion::V2_1),
            "3.0" => Ok(SchemaVersion::V3_0),
            other => Err(EnsembleError::UnsupportedSchemaVersion(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1_0 => "1.0",
            SchemaVersion::V2_1 => "2.1",
            SchemaVersion::V3_0 => "3.0",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nested tree node as written into artifacts
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum TreeNodeJson {
    Leaf {
        nodeid: u32,
        leaf: f64,
    },
    Split {
        nodeid: u32,
        depth: u32,
        split: String,
        split_condition: f64,
        yes: u32,
        no: u32,
        missing: u32,
        children: Vec<TreeNodeJson>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct VerboseArtifact<T> {
    schema_version: String,
    feature_names: Vec<String>,
    horizons: BTreeMap<String, VerboseHorizon<T>>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VerboseHorizon<T> {
    #[serde(rename = "type")]
    kind: String,
    n_estimators: usize,
    base_score: f64,
    trees: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompactArtifact<T> {
    v: String,
    f: Vec<String>,
    m: BTreeMap<String, CompactHorizon<T>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompactHorizon<T> {
    b: f64,
    t: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FlatModel {
    #[serde(rename = "type")]
    kind: String,
    version: String,
    #[serde(default)]
    n_estimators: Option<usize>,
    #[serde(default)]
    base_score: Option<f64>,
    feature_names: Vec<String>,
    trees: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MultiModelExport {
    #[serde(default)]
    created_at: Option<String>,
    feature_names: Vec<String>,
    models: BTreeMap<String, FlatModel>,
}

// ---------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------

fn encode_tree(tree: &Tree) -> TreeNodeJson {
    encode_node(tree, tree.root())
}

fn encode_node(tree: &Tree, node: &Node) -> TreeNodeJson {
    match node {
        Node::Leaf { id, value } => TreeNodeJson::Leaf {
            nodeid: *id,
            leaf: *value,
        },
        Node::Split {
            id,
            depth,
            feature,
            threshold,
            yes,
            no,
            missing,
        } => TreeNodeJson::Split {
            nodeid: *id,
            depth: *depth,
            split: FeatureContract::token(*feature),
            split_condition: *threshold,
            yes: *yes,
            no: *no,
            missing: *missing,
            children: tree
                .children(*id)
                .map(|pair| pair.iter().map(|child| encode_node(tree, child)).collect())
                .unwrap_or_default(),
        },
    }
}

fn verbose_view(ensemble: &Ensemble) -> VerboseArtifact<TreeNodeJson> {
    VerboseArtifact {
        schema_version: SchemaVersion::CURRENT.to_string(),
        feature_names: ensemble.feature_names().to_vec(),
        horizons: ensemble
            .horizons()
            .iter()
            .map(|(label, horizon)| {
                (
                    label.clone(),
                    VerboseHorizon {
                        kind: MODEL_TYPE.to_string(),
                        n_estimators: horizon.num_trees(),
                        base_score: horizon.base_score(),
                        trees: horizon.trees().iter().map(encode_tree).collect(),
                    },
                )
            })
            .collect(),
        metadata: ensemble.metadata().clone(),
    }
}

fn compact_view(ensemble: &Ensemble) -> CompactArtifact<TreeNodeJson> {
    CompactArtifact {
        v: SchemaVersion::CURRENT.to_string(),
        f: ensemble.feature_names().to_vec(),
        m: ensemble
            .horizons()
            .iter()
            .map(|(label, horizon)| {
                (
                    label.clone(),
                    CompactHorizon {
                        b: horizon.base_score(),
                        t: horizon.trees().iter().map(encode_tree).collect(),
                    },
                )
            })
            .collect(),
    }
}

/// Pretty, key-sorted verbose encoding
pub fn encode_verbose(ensemble: &Ensemble) -> Result<String> {
    Ok(canonical_json_string(&verbose_view(ensemble))?)
}

/// Whitespace-free compact encoding with minimized keys and no metadata
pub fn encode_compact(ensemble: &Ensemble) -> Result<String> {
    Ok(compact_canonical_json_string(&compact_view(ensemble))?)
}

/// Blake3 fingerprint of the prediction-relevant content
pub fn fingerprint(ensemble: &Ensemble) -> Result<String> {
    Ok(hash_canonical_hex(&compact_view(ensemble))?)
}

// ---------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------

/// Decode artifact bytes of any supported shape with default settings
pub fn decode(bytes: &[u8]) -> Result<Ensemble> {
    decode_with(bytes, &CodecConfig::default())
}

/// Decode artifact bytes of any supported shape
pub fn decode_with(bytes: &[u8], config: &CodecConfig) -> Result<Ensemble> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| EnsembleError::MalformedArtifact(format!("invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| EnsembleError::MalformedArtifact("artifact is not a JSON object".into()))?;

    let ensemble = if object.contains_key("schema_version") {
        decode_verbose(value)?
    } else if object.contains_key("v") {
        decode_compact(value)?
    } else if object.contains_key("models") {
        decode_multi_model(value, config)?
    } else if object.contains_key("trees") {
        decode_flat(value, config)?
    } else {
        return Err(EnsembleError::MalformedArtifact(
            "unrecognised artifact shape".into(),
        ));
    };

    info!(
        schema_version = %ensemble.schema_version(),
        horizons = ensemble.horizons().len(),
        trees = ensemble.num_trees(),
        features = ensemble.feature_names().len(),
        "decoded ensemble artifact"
    );
    Ok(ensemble)
}

fn version_field(value: &Value, key: &str) -> Result<SchemaVersion> {
    match value.get(key) {
        Some(Value::String(raw)) => SchemaVersion::parse(raw),
        Some(other) => Err(EnsembleError::MalformedArtifact(format!(
            "`{key}` must be a string, found {other}"
        ))),
        None => Err(EnsembleError::MalformedArtifact(format!(
            "missing `{key}`"
        ))),
    }
}

fn structure<T: serde::de::DeserializeOwned>(value: Value, shape: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| EnsembleError::MalformedArtifact(format!("{shape} artifact: {e}")))
}

fn decode_verbose(value: Value) -> Result<Ensemble> {
    let version = version_field(&value, "schema_version")?;
    if version != SchemaVersion::V3_0 {
        return Err(EnsembleError::MalformedArtifact(format!(
            "schema {version} does not use the verbose layout"
        )));
    }

    let artifact: VerboseArtifact<Value> = structure(value, "verbose")?;
    let contract = contract_for(artifact.feature_names.clone())?;

    let mut horizons = BTreeMap::new();
    for (label, horizon) in artifact.horizons {
        check_model_type(&label, &horizon.kind)?;
        check_tree_count(&label, horizon.n_estimators, horizon.trees.len())?;
        let trees = decode_trees(&label, &horizon.trees, &contract)?;
        horizons.insert(label, Horizon::new(horizon.base_score, trees));
    }

    finish(artifact.feature_names, horizons, version, artifact.metadata)
}

fn decode_compact(value: Value) -> Result<Ensemble> {
    let version = version_field(&value, "v")?;
    let artifact: CompactArtifact<Value> = structure(value, "compact")?;
    let contract = contract_for(artifact.f.clone())?;

    let mut horizons = BTreeMap::new();
    for (label, horizon) in artifact.m {
        let trees = decode_trees(&label, &horizon.t, &contract)?;
        horizons.insert(label, Horizon::new(horizon.b, trees));
    }

    finish(artifact.f, horizons, version, BTreeMap::new())
}

fn decode_flat(value: Value, config: &CodecConfig) -> Result<Ensemble> {
    let version = version_field(&value, "version")?;
    let model: FlatModel = structure(value, "flat")?;
    let label = config.default_horizon.clone();
    warn!(horizon = %label, "decoding legacy single-target artifact");

    let feature_names = model.feature_names.clone();
    let contract = contract_for(feature_names.clone())?;
    let horizon = flat_horizon(&label, model, &contract, config)?;

    finish(
        feature_names,
        BTreeMap::from([(label, horizon)]),
        version,
        BTreeMap::new(),
    )
}

fn decode_multi_model(value: Value, config: &CodecConfig) -> Result<Ensemble> {
    // Each model carries its own version; check them all before parsing trees
    let models = value
        .get("models")
        .and_then(Value::as_object)
        .ok_or_else(|| EnsembleError::MalformedArtifact("`models` must be an object".into()))?;
    let mut version = None;
    for (label, model) in models {
        let model_version = version_field(model, "version").map_err(|e| match e {
            EnsembleError::MalformedArtifact(message) => {
                EnsembleError::MalformedArtifact(format!("model {label}: {message}"))
            }
            other => other,
        })?;
        if version.map_or(false, |v| v != model_version) {
            return Err(EnsembleError::MalformedArtifact(
                "models declare different versions".into(),
            ));
        }
        version = Some(model_version);
    }
    let version = version.unwrap_or(SchemaVersion::V1_0);
    warn!(models = models.len(), "decoding legacy multi-model artifact");

    let export: MultiModelExport = structure(value, "multi-model")?;
    let contract = contract_for(export.feature_names.clone())?;

    let mut horizons = BTreeMap::new();
    for (label, model) in export.models {
        if model.feature_names != export.feature_names {
            return Err(EnsembleError::MalformedArtifact(format!(
                "model {label} declares a different feature list"
            )));
        }
        let horizon = flat_horizon(&label, model, &contract, config)?;
        horizons.insert(label, horizon);
    }

    let metadata = export
        .created_at
        .map(|created_at| BTreeMap::from([("created_at".to_string(), created_at)]))
        .unwrap_or_default();
    finish(export.feature_names, horizons, version, metadata)
}

fn flat_horizon(
    label: &str,
    model: FlatModel,
    contract: &FeatureContract,
    config: &CodecConfig,
) -> Result<Horizon> {
    check_model_type(label, &model.kind)?;
    SchemaVersion::parse(&model.version)?;
    if let Some(n_estimators) = model.n_estimators {
        check_tree_count(label, n_estimators, model.trees.len())?;
    }
    let base_score = model.base_score.unwrap_or_else(|| {
        debug!(horizon = label, "base score absent, using default");
        config.default_base_score
    });
    let trees = decode_trees(label, &model.trees, contract)?;
    Ok(Horizon::new(base_score, trees))
}

fn decode_trees(label: &str, trees: &[Value], contract: &FeatureContract) -> Result<Vec<Tree>> {
    trees
        .iter()
        .enumerate()
        .map(|(t_idx, tree)| {
            parse_json_dump(tree, contract).map_err(|e| match e {
                EnsembleError::MalformedDump(message) => EnsembleError::MalformedArtifact(
                    format!("horizon {label} tree {t_idx}: {message}"),
                ),
                other => other,
            })
        })
        .collect()
}

fn contract_for(feature_names: Vec<String>) -> Result<FeatureContract> {
    FeatureContract::new(feature_names).map_err(|e| match e {
        EnsembleError::FeatureContract(message) => EnsembleError::MalformedArtifact(message),
        other => other,
    })
}

fn check_model_type(label: &str, kind: &str) -> Result<()> {
    if kind != MODEL_TYPE {
        return Err(EnsembleError::MalformedArtifact(format!(
            "horizon {label} has model type `{kind}`, expected `{MODEL_TYPE}`"
        )));
    }
    Ok(())
}

fn check_tree_count(label: &str, declared: usize, actual: usize) -> Result<()> {
    if declared != actual {
        return Err(EnsembleError::MalformedArtifact(format!(
            "horizon {label} declares {declared} trees but carries {actual}"
        )));
    }
    Ok(())
}

fn finish(
    feature_names: Vec<String>,
    horizons: BTreeMap<String, Horizon>,
    version: SchemaVersion,
    metadata: BTreeMap<String, String>,
) -> Result<Ensemble> {
    Ok(Ensemble::from_horizons(feature_names, horizons)?
        .with_source_version(version)
        .with_metadata_map(metadata))
}

// ---------------------------------------------------------------------
// Ensemble convenience API
// ---------------------------------------------------------------------

impl Ensemble {
    /// Serialize to the pretty verbose form
    pub fn to_verbose_json(&self) -> Result<String> {
        encode_verbose(self)
    }

    /// Serialize to the compact distribution form
    pub fn to_compact_json(&self) -> Result<String> {
        encode_compact(self)
    }

    /// Blake3 fingerprint as a 64-character hex string.
    ///
    /// Covers feature order, base scores and tree structure only, so the
    /// verbose and compact forms of one artifact share a fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        fingerprint(self)
    }

    /// Decode from bytes of any supported artifact shape
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    /// Save the verbose form to a file
    pub fn save_verbose<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        write_artifact(path.as_ref(), &self.to_verbose_json()?)
    }

    /// Save the compact form to a file
    pub fn save_compact<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        write_artifact(path.as_ref(), &self.to_compact_json()?)
    }

    /// Load and validate an artifact file with default settings
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with(path, &CodecConfig::default())
    }

    /// Load and validate an artifact file
    pub fn load_with<P: AsRef<Path>>(path: P, config: &CodecConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "loading artifact");
        decode_with(&bytes, config)
    }
}

fn write_artifact(path: &Path, contents: &str) -> Result<u64> {
    fs::write(path, contents)?;
    let size = contents.len() as u64;
    info!(path = %path.display(), bytes = size, "wrote artifact");
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Sample;
    use serde_json::json;

    fn names() -> Vec<String> {
        vec!["pxi_score".into(), "vix".into()]
    }

    fn sample_ensemble() -> Ensemble {
        let tree = Tree::from_nodes(vec![
            Node::split(0, 1, 20.0, 1, 2, 2),
            Node::split(1, 0, 50.0, 3, 4, 3),
            Node::leaf(2, -0.75),
            Node::leaf(3, 0.125),
            Node::leaf(4, 0.5),
        ])
        .unwrap();
        Ensemble::from_horizons(
            names(),
            BTreeMap::from([
                (
                    "7d".to_string(),
                    Horizon::new(0.5, vec![tree.clone(), Tree::stump(0.01)]),
                ),
                ("30d".to_string(), Horizon::new(-1.25, vec![tree])),
            ]),
        )
        .unwrap()
        .with_metadata("created_at", "2026-10-19T00:00:00Z")
    }

    #[test]
    fn test_schema_version_parse() {
        assert_eq!(SchemaVersion::parse("2.1").unwrap(), SchemaVersion::V2_1);
        assert_eq!(SchemaVersion::CURRENT.to_string(), "3.0");
        assert!(matches!(
            SchemaVersion::parse("9.9"),
            Err(EnsembleError::UnsupportedSchemaVersion(v)) if v == "9.9"
        ));
    }

    #[test]
    fn test_verbose_layout() {
        let json = sample_ensemble().to_verbose_json().unwrap();
        assert!(json.contains('\n'));

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["schema_version"], "3.0");
        assert_eq!(value["feature_names"], json!(["pxi_score", "vix"]));
        assert_eq!(value["horizons"]["7d"]["type"], "xgboost");
        assert_eq!(value["horizons"]["7d"]["n_estimators"], 2);
        assert_eq!(value["horizons"]["30d"]["base_score"], -1.25);
        assert_eq!(value["metadata"]["created_at"], "2026-10-19T00:00:00Z");

        let root = &value["horizons"]["7d"]["trees"][0];
        assert_eq!(root["split"], "f1");
        assert_eq!(root["split_condition"], 20.0);
        assert_eq!(root["children"][0]["nodeid"], 1);
        assert_eq!(root["children"][0]["depth"], 1);
        assert_eq!(root["children"][1], json!({"nodeid": 2, "leaf": -0.75}));
    }

    #[test]
    fn test_compact_layout() {
        let json = sample_ensemble().to_compact_json().unwrap();
        assert!(!json.contains('\n'));
        assert!(!json.contains("created_at"));
        assert!(json.starts_with(r#"{"f":["pxi_score","vix"],"m":{"30d":{"b":-1.25,"t":["#));
        assert!(json.ends_with(r#""v":"3.0"}"#));
    }

    #[test]
    fn test_round_trip_through_both_forms() {
        let original = sample_ensemble();
        let from_verbose = decode(original.to_verbose_json().unwrap().as_bytes()).unwrap();
        let from_compact = decode(from_verbose.to_compact_json().unwrap().as_bytes()).unwrap();

        assert_eq!(from_verbose, original);
        assert_eq!(from_compact.horizons(), original.horizons());
        assert_eq!(from_compact.feature_names(), original.feature_names());
        assert!(from_compact.metadata().is_empty());

        let fp = original.fingerprint().unwrap();
        assert_eq!(fp.len(), 64);
        assert_eq!(from_verbose.fingerprint().unwrap(), fp);
        assert_eq!(from_compact.fingerprint().unwrap(), fp);
    }

    #[test]
    fn test_fingerprint_ignores_metadata() {
        let a = sample_ensemble();
        let b = sample_ensemble().with_metadata("note", "retrained");
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_decode_legacy_compact() {
        let artifact = json!({
            "v": "2.1",
            "f": ["pxi_score", "vix"],
            "m": {
                "7d": {"b": 0.2, "t": [{"nodeid": 0, "leaf": 1.5}]},
                "30d": {"b": 0.0, "t": [{
                    "nodeid": 0, "depth": 0, "split": "f0", "split_condition": 10.0,
                    "yes": 1, "no": 2, "missing": 1,
                    "children": [{"nodeid": 1, "leaf": -3.0}, {"nodeid": 2, "leaf": 4.0}]
                }]}
            }
        });
        let ensemble = decode(artifact.to_string().as_bytes()).unwrap();
        assert_eq!(ensemble.schema_version(), SchemaVersion::V2_1);
        assert_eq!(
            ensemble.predict("7d", &Sample::missing(2)).unwrap(),
            1.7
        );
        assert_eq!(
            ensemble
                .predict("30d", &Sample::from_dense(&[15.0, 0.0]))
                .unwrap(),
            4.0
        );
    }

    #[test]
    fn test_decode_legacy_flat() {
        let artifact = json!({
            "type": "xgboost",
            "version": "1.0",
            "n_estimators": 1,
            "base_score": 0.5,
            "feature_names": ["pxi_score"],
            "trees": [{"nodeid": 0, "leaf": 0.25}]
        });
        let ensemble = decode(artifact.to_string().as_bytes()).unwrap();
        assert_eq!(ensemble.schema_version(), SchemaVersion::V1_0);
        assert_eq!(ensemble.horizon_labels().collect::<Vec<_>>(), vec!["default"]);
        assert_eq!(
            ensemble.predict("default", &Sample::missing(1)).unwrap(),
            0.75
        );

        let config = CodecConfig {
            default_horizon: "7d".into(),
            ..CodecConfig::default()
        };
        let ensemble = decode_with(artifact.to_string().as_bytes(), &config).unwrap();
        assert!(ensemble.horizon("7d").is_ok());
    }

    #[test]
    fn test_decode_multi_model_export() {
        let flat = |score: f64| {
            json!({
                "type": "xgboost", "version": "1.0", "n_estimators": 1,
                "base_score": score, "feature_names": ["pxi_score"],
                "trees": [{"nodeid": 0, "leaf": 1.0}]
            })
        };
        let artifact = json!({
            "created_at": "2026-01-02T03:04:05",
            "feature_names": ["pxi_score"],
            "models": {"7d": flat(0.5), "30d": flat(0.25)},
            "metrics": {"7d": {"rmse": 1.0}}
        });
        let ensemble = decode(artifact.to_string().as_bytes()).unwrap();
        assert_eq!(ensemble.horizons().len(), 2);
        assert_eq!(ensemble.predict("30d", &Sample::missing(1)).unwrap(), 1.25);
        assert_eq!(
            ensemble.metadata().get("created_at").map(String::as_str),
            Some("2026-01-02T03:04:05")
        );
    }

    #[test]
    fn test_unsupported_versions() {
        for artifact in [
            json!({"v": "4.0", "f": ["a"], "m": {}}),
            json!({"schema_version": "0.9"}),
            json!({"type": "xgboost", "version": "7", "feature_names": ["a"], "trees": []}),
            json!({"feature_names": ["a"], "models": {"7d": {"version": "5.0"}}}),
        ] {
            let err = decode(artifact.to_string().as_bytes()).unwrap_err();
            assert!(
                matches!(err, EnsembleError::UnsupportedSchemaVersion(_)),
                "{artifact}: {err}"
            );
        }
    }

    #[test]
    fn test_malformed_artifacts() {
        let cases = [
            json!("not an object"),
            json!({"hello": 1}),
            json!({"v": 2.1, "f": ["a"], "m": {}}),
            json!({"v": "2.1", "f": ["a"]}),
            json!({"v": "2.1", "f": ["a"], "m": {}}),
            json!({"v": "2.1", "f": ["a"], "m": {"7d": {"b": 0.0, "t": []}}}),
            json!({"v": "2.1", "f": ["a", "a"], "m": {"7d": {"b": 0.0, "t": [{"nodeid": 0, "leaf": 1.0}]}}}),
            json!({"v": "2.1", "f": ["a"], "m": {"7d": {"b": 0.0, "t": [{"nodeid": 0, "split": "f0",
                "split_condition": 1.0, "yes": 1, "no": 2, "missing": 1,
                "children": [{"nodeid": 1, "leaf": 0.0}, {"nodeid": 1, "leaf": 0.0}]}]}}}),
            json!({"v": "2.1", "f": ["a"], "m": {"7d": {"b": 0.0, "t": [{"nodeid": 0, "split": "f5",
                "split_condition": 1.0, "yes": 1, "no": 2, "missing": 1,
                "children": [{"nodeid": 1, "leaf": 0.0}, {"nodeid": 2, "leaf": 0.0}]}]}}}),
            json!({"v": "3.0", "f": ["a"], "m": {"7d": {"b": 0.0, "t": [{"nodeid": 0, "split": "f0",
                "split_condition": 1.0, "yes": 1, "no": 2, "missing": 0,
                "children": [{"nodeid": 1, "leaf": 1.0}, {"nodeid": 2, "leaf": 2.0}]}]}}}),
            json!({"schema_version": "1.0", "feature_names": ["a"], "horizons": {}}),
            json!({"schema_version": "3.0", "feature_names": ["a"], "horizons": {"7d": {
                "type": "lstm", "n_estimators": 1, "base_score": 0.0,
                "trees": [{"nodeid": 0, "leaf": 1.0}]}}}),
            json!({"schema_version": "3.0", "feature_names": ["a"], "horizons": {"7d": {
                "type": "xgboost", "n_estimators": 3, "base_score": 0.0,
                "trees": [{"nodeid": 0, "leaf": 1.0}]}}}),
        ];

        for artifact in cases {
            let err = decode(artifact.to_string().as_bytes()).unwrap_err();
            assert!(
                matches!(err, EnsembleError::MalformedArtifact(_)),
                "{artifact}: {err}"
            );
        }

        assert!(matches!(
            decode(b"{not json"),
            Err(EnsembleError::MalformedArtifact(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let ensemble = sample_ensemble();

        let verbose_path = dir.path().join("model.json");
        let compact_path = dir.path().join("model_compact.json");
        let verbose_size = ensemble.save_verbose(&verbose_path).unwrap();
        let compact_size = ensemble.save_compact(&compact_path).unwrap();
        assert!(compact_size < verbose_size);

        let from_verbose = Ensemble::load(&verbose_path).unwrap();
        let from_compact = Ensemble::load(&compact_path).unwrap();
        assert_eq!(from_verbose, ensemble);
        assert_eq!(
            from_compact.fingerprint().unwrap(),
            ensemble.fingerprint().unwrap()
        );

        assert!(matches!(
            Ensemble::load(dir.path().join("absent.json")),
            Err(EnsembleError::Io(_))
        ));
    }
}
