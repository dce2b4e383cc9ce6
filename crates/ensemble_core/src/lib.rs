//! Tree-ensemble core for PXI forecast models
//!
//! Turns the training framework's native tree dumps into one canonical,
//! versioned artifact and evaluates it deterministically at inference time.
//!
//! Modules:
//! - `dump`: Parser for native text and JSON tree dumps
//! - `gbdt`: Arena-backed trees and the multi-horizon `Ensemble`
//! - `codec`: Versioned verbose / compact artifact encoding and legacy decoding
//! - `evaluator`: Deterministic prediction over a decoded ensemble
//! - `features`: Feature contract and reference feature derivations
//! - `lstm`: Shape contract for recurrent-network weight exports
//! - `config`: Codec and exporter configuration
//! - `serialization`: Canonical JSON and fingerprint helpers

pub mod codec;
pub mod config;
pub mod dump;
pub mod errors;
pub mod evaluator;
pub mod features;
pub mod gbdt;
pub mod lstm;
pub mod serialization;

pub use codec::{decode, decode_with, encode_compact, encode_verbose, SchemaVersion};
pub use config::{CodecConfig, OutputConfig};
pub use dump::{parse_dump_file, parse_dumps, parse_json_dump, parse_text_dump, DumpFormat};
pub use errors::{EnsembleError, Result};
pub use evaluator::{Evaluator, Sample};
pub use features::{AbsentFeature, FeatureContract};
pub use gbdt::{Ensemble, Horizon, Node, Tree, DEFAULT_HORIZON};
pub use lstm::LstmExport;

/// Crate version string for artifact metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
