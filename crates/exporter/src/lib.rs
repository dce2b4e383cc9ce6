//! PXI model exporter
//!
//! Offline build step that parses the training framework's tree dumps into
//! one ensemble and writes the verbose artifact, the compact artifact and
//! the fingerprint file. Also inspects, evaluates and verifies artifacts.

use anyhow::{bail, Context, Result};
use pxi_ensemble_core::{
    parse_dump_file, CodecConfig, DumpFormat, Ensemble, FeatureContract, Horizon, LstmExport,
    OutputConfig,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Inputs to an artifact build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub feature_names: Vec<String>,
    /// Horizon label -> dump file
    pub dumps: BTreeMap<String, PathBuf>,
    /// Horizon label -> base score; unset horizons use the configured default
    pub base_scores: BTreeMap<String, f64>,
    pub format: DumpFormat,
    pub output_dir: PathBuf,
    pub config: CodecConfig,
}

/// What a build wrote
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub verbose_path: PathBuf,
    pub verbose_bytes: u64,
    pub compact_path: PathBuf,
    pub compact_bytes: u64,
    pub fingerprint_path: PathBuf,
    pub fingerprint: String,
    pub num_trees: usize,
}

/// Read a feature list: a JSON array of names, or one name per line
pub fn read_feature_names(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read feature list {}", path.display()))?;

    let names: Vec<String> = if contents.trim_start().starts_with('[') {
        serde_json::from_str(&contents).context("Failed to parse feature list JSON")?
    } else {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    if names.is_empty() {
        bail!("Feature list {} is empty", path.display());
    }
    Ok(names)
}

/// Parse `label=value` pairs given on the command line
pub fn parse_labelled<T>(raw: &str) -> Result<(String, T)>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let (label, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected <horizon>=<value>, got `{raw}`"))?;
    let label = label.trim();
    if label.is_empty() {
        bail!("Empty horizon label in `{raw}`");
    }
    let value = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value in `{raw}`"))?;
    Ok((label.to_string(), value))
}

/// Parse every dump, assemble the ensemble and write all outputs
pub fn build_artifacts(request: &BuildRequest) -> Result<BuildReport> {
    if request.dumps.is_empty() {
        bail!("At least one --horizon <label>=<dump> is required");
    }
    for label in request.base_scores.keys() {
        if !request.dumps.contains_key(label) {
            bail!("Base score given for horizon {label} which has no dump");
        }
    }

    let contract = FeatureContract::new(request.feature_names.clone())
        .context("Invalid feature list")?;

    let mut horizons = BTreeMap::new();
    for (label, path) in &request.dumps {
        info!("Parsing {label} dump from: {}", path.display());
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read dump {}", path.display()))?;
        let trees = parse_dump_file(&contents, request.format, &contract)
            .with_context(|| format!("Failed to parse {label} dump"))?;

        let base_score = request
            .base_scores
            .get(label)
            .copied()
            .unwrap_or(request.config.default_base_score);
        info!("  {label}: {} trees, base score {base_score}", trees.len());
        horizons.insert(label.clone(), Horizon::new(base_score, trees));
    }

    let ensemble = Ensemble::from_horizons(request.feature_names.clone(), horizons)
        .context("Failed to assemble ensemble")?
        .with_metadata("created_at", chrono::Utc::now().to_rfc3339())
        .with_metadata("exporter_version", env!("CARGO_PKG_VERSION"));

    let output = OutputConfig {
        directory: request.output_dir.clone(),
        ..request.config.output.clone()
    };
    fs::create_dir_all(&output.directory).context("Failed to create output directory")?;
    let verbose_path = output.verbose_path();
    let compact_path = output.compact_path();
    let fingerprint_path = output.fingerprint_path();

    let verbose_bytes = ensemble
        .save_verbose(&verbose_path)
        .context("Failed to write verbose artifact")?;
    let compact_bytes = ensemble
        .save_compact(&compact_path)
        .context("Failed to write compact artifact")?;

    let fingerprint = ensemble.fingerprint().context("Failed to fingerprint ensemble")?;
    fs::write(&fingerprint_path, &fingerprint).context("Failed to write fingerprint file")?;

    info!(
        "Verbose artifact: {} ({:.1} KB)",
        verbose_path.display(),
        verbose_bytes as f64 / 1024.0
    );
    info!(
        "Compact artifact: {} ({:.1} KB)",
        compact_path.display(),
        compact_bytes as f64 / 1024.0
    );

    Ok(BuildReport {
        verbose_path,
        verbose_bytes,
        compact_path,
        compact_bytes,
        fingerprint_path,
        fingerprint,
        num_trees: ensemble.num_trees(),
    })
}

/// Human-readable summary of an artifact
pub fn describe(ensemble: &Ensemble) -> Result<String> {
    let mut lines = vec![
        format!("schema version: {}", ensemble.schema_version()),
        format!("features ({}): {}", ensemble.feature_names().len(), ensemble.feature_names().join(", ")),
    ];
    for (label, horizon) in ensemble.horizons() {
        let max_depth = horizon.trees().iter().map(|t| t.depth()).max().unwrap_or(0);
        lines.push(format!(
            "horizon {label}: {} trees, base score {}, max depth {max_depth}",
            horizon.num_trees(),
            horizon.base_score()
        ));
    }
    for (key, value) in ensemble.metadata() {
        lines.push(format!("{key}: {value}"));
    }
    lines.push(format!("fingerprint: {}", ensemble.fingerprint()?));
    Ok(lines.join("\n"))
}

/// Human-readable summary of an LSTM weight export
pub fn describe_lstm(export: &LstmExport) -> String {
    let mut lines = vec![
        "model type: lstm".to_string(),
        format!(
            "sequence length: {}, hidden size: {}",
            export.sequence_length, export.hidden_size
        ),
        format!(
            "features ({}): {}",
            export.feature_names.len(),
            export.feature_names.join(", ")
        ),
    ];
    for label in export.models.keys() {
        lines.push(format!("horizon {label}: lstm + linear head"));
    }
    for (key, value) in &export.metadata {
        lines.push(format!("{key}: {value}"));
    }
    lines.join("\n")
}

/// Decode any artifact the pipeline produces and summarize it.
///
/// LSTM weight exports (`type = "lstm"`, or the compact `{v, c, n, m}`
/// layout) are shape-checked; everything else goes through the tree
/// ensemble codec.
pub fn inspect_artifact(path: &Path, config: &CodecConfig) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let is_lstm = value.get("type").and_then(serde_json::Value::as_str) == Some("lstm")
        || value.get("c").is_some();
    if is_lstm {
        debug!("inspecting LSTM export");
        let export = LstmExport::from_slice(&bytes)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        return Ok(describe_lstm(&export));
    }

    let ensemble = pxi_ensemble_core::decode_with(&bytes, config)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    describe(&ensemble)
}

/// Evaluate one horizon for a `{name: value | null}` JSON sample
pub fn predict_json(
    ensemble: &Ensemble,
    horizon: &str,
    sample_json: &str,
    config: &CodecConfig,
) -> Result<f64> {
    let value: serde_json::Value =
        serde_json::from_str(sample_json).context("Sample is not valid JSON")?;
    let sample = ensemble
        .contract()
        .sample_from_json(&value, config.absent_feature)?;
    debug!(?sample, "built sample");
    Ok(ensemble.predict(horizon, &sample)?)
}

/// Compare an artifact's fingerprint against a stored fingerprint file
pub fn verify_fingerprint(ensemble: &Ensemble, hash_path: &Path) -> Result<String> {
    let expected = fs::read_to_string(hash_path)
        .with_context(|| format!("Failed to read fingerprint {}", hash_path.display()))?;
    let expected = expected.trim();
    let actual = ensemble.fingerprint()?;
    if !actual.eq_ignore_ascii_case(expected) {
        bail!("Fingerprint mismatch: expected {expected}, computed {actual}");
    }
    Ok(actual)
}

/// Load the configuration file if one was given, otherwise defaults
pub fn load_config(path: Option<&Path>) -> Result<CodecConfig> {
    match path {
        Some(path) => CodecConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(CodecConfig::default()),
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
