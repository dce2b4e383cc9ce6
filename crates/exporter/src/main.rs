//! PXI Model Exporter CLI
//!
//! Offline conversion of tree dumps into versioned ensemble artifacts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pxi_ensemble_core::{DumpFormat, Ensemble};
use pxi_model_exporter::{
    build_artifacts, inspect_artifact, load_config, parse_labelled, predict_json,
    read_feature_names, verify_fingerprint, BuildRequest,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "pxi-export")]
#[command(author = "PXI Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, inspect and verify PXI tree-ensemble artifacts", long_about = None)]
struct Args {
    /// Codec configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse tree dumps and write verbose, compact and fingerprint files
    Build {
        /// Feature list: JSON array or one name per line, in training order
        #[arg(short, long)]
        features: PathBuf,

        /// Horizon dump as <label>=<file>; repeat for each horizon
        #[arg(long = "horizon", value_parser = parse_labelled::<PathBuf>, required = true)]
        horizons: Vec<(String, PathBuf)>,

        /// Base score as <label>=<value>; defaults to the configured base score
        #[arg(long = "base-score", value_parser = parse_labelled::<f64>)]
        base_scores: Vec<(String, f64)>,

        /// Dump encoding
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Output directory; defaults to the configured directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a tree-ensemble artifact or LSTM export and summarize it
    Inspect {
        artifact: PathBuf,
    },

    /// Evaluate one horizon for a JSON sample `{name: value | null}`
    Predict {
        artifact: PathBuf,

        #[arg(long)]
        horizon: String,

        #[arg(long)]
        sample: String,
    },

    /// Recompute an artifact's fingerprint and compare it to a stored one
    Verify {
        artifact: PathBuf,

        /// Fingerprint file written by `build`
        #[arg(long)]
        hash: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for DumpFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => DumpFormat::Text,
            Format::Json => DumpFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Build {
            features,
            horizons,
            base_scores,
            format,
            output,
        } => {
            info!("PXI Model Exporter v{}", env!("CARGO_PKG_VERSION"));
            info!("═══════════════════════════════════════════");

            let feature_names = read_feature_names(&features)?;
            info!("Loaded {} feature names from: {}", feature_names.len(), features.display());

            let output_dir = output.unwrap_or_else(|| config.output.directory.clone());
            let request = BuildRequest {
                feature_names,
                dumps: horizons.into_iter().collect(),
                base_scores: base_scores.into_iter().collect(),
                format: format.into(),
                output_dir,
                config,
            };
            let report = build_artifacts(&request)?;

            info!("═══════════════════════════════════════════");
            info!("✓ Export completed successfully ({} trees)", report.num_trees);
            info!("  Verbose: {}", report.verbose_path.display());
            info!("  Compact: {}", report.compact_path.display());
            info!(
                "  Fingerprint: {} ({})",
                report.fingerprint_path.display(),
                report.fingerprint
            );
        }
        Command::Inspect { artifact } => {
            println!("{}", inspect_artifact(&artifact, &config)?);
        }
        Command::Predict {
            artifact,
            horizon,
            sample,
        } => {
            let ensemble = Ensemble::load_with(&artifact, &config)
                .with_context(|| format!("Failed to load {}", artifact.display()))?;
            let prediction = predict_json(&ensemble, &horizon, &sample, &config)?;
            println!("{prediction}");
        }
        Command::Verify { artifact, hash } => {
            let ensemble = Ensemble::load_with(&artifact, &config)
                .with_context(|| format!("Failed to load {}", artifact.display()))?;
            let fingerprint = verify_fingerprint(&ensemble, &hash)?;
            info!("✓ Fingerprint matches: {fingerprint}");
        }
    }

    Ok(())
}
