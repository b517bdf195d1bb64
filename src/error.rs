//! Typed error taxonomy for the prediction core.
//!
//! Each stage owns one enum so callers can tell a transient store failure
//! from a fatal load failure, a bad request, or a classifier fault.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Remote artifact store failures. Always recoverable by the lifecycle
/// coordinator, which falls back to the local copy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote store is not configured: missing {0}")]
    MissingCredentials(&'static str),

    #[error("artifact '{0}' not found in remote store")]
    NotFound(String),

    #[error("remote store returned HTTP {status} for '{name}'")]
    Status { name: String, status: u16 },

    #[error("transfer of '{0}' timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("remote store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("local artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while reading artifacts from local disk into the registry.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model blob not found at {}", .0.display())]
    ModelMissing(PathBuf),

    #[error("unsupported model format '{0}'")]
    UnsupportedFormat(String),

    #[error("model blob is corrupt: {0}")]
    CorruptModel(String),

    #[error("signature document is malformed: {0}")]
    Signature(String),

    #[error("baseline table is malformed: {0}")]
    Baseline(String),

    #[error("failed to read artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Request validation failures raised while resolving features.
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("field '{field}' is not numeric: {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("field '{field}' out of range: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("malformed request: {0}")]
    Malformed(String),
}

/// Failures at the inference boundary: alignment or classifier faults.
#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("feature vector has {actual} columns, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("declared features missing from record: {0:?}")]
    MissingFeatures(Vec<String>),

    #[error("classifier failed: {0}")]
    Backend(String),

    #[error("classifier returned invalid probability {0}")]
    InvalidProbability(f64),
}

/// Everything `RiskPredictor::predict` can report to the serving layer.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model registry is not ready")]
    NotReady,

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PredictError {
    /// Stable, machine-readable error kind used in error payloads and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::NotReady => "not_ready",
            PredictError::ModelUnavailable(_) => "model_unavailable",
            PredictError::Resolve(_) => "invalid_request",
            PredictError::Inference(_) => "inference_failed",
        }
    }
}
