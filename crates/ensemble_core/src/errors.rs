//! Error types for the ensemble core

use thiserror::Error;

/// Errors that can occur while parsing, decoding or evaluating an ensemble
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// Native tree dump could not be parsed into a valid tree
    #[error("Malformed dump: {0}")]
    MalformedDump(String),

    /// Artifact declares a schema version this decoder does not implement
    #[error("Unsupported schema version: {0}")]
    UnsupportedSchemaVersion(String),

    /// Artifact is structurally invalid after the version check
    #[error("Malformed artifact: {0}")]
    MalformedArtifact(String),

    /// Evaluation requested for a horizon the artifact does not carry
    #[error("Unknown horizon: {0}")]
    UnknownHorizon(String),

    /// A reference that passed validation could not be resolved at evaluation time
    #[error("Internal consistency error in horizon {horizon}, tree {tree}, node {node}: {detail}")]
    InternalConsistency {
        horizon: String,
        tree: usize,
        node: u32,
        detail: String,
    },

    /// Caller-supplied features do not match the artifact's feature list
    #[error("Feature contract violation: {0}")]
    FeatureContract(String),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ensemble core operations
pub type Result<T> = std::result::Result<T, EnsembleError>;
