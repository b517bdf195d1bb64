//! ML model inference components

pub mod forest;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod ubjson;

pub use forest::TreeEnsemble;
pub use inference::InferenceEngine;
pub use loader::ModelLoader;

use crate::error::InferenceError;

/// A loaded binary classifier.
///
/// Implementations must be deterministic: the same feature vector always
/// yields the same probability.
pub trait Classifier: Send + Sync {
    /// Probability of the positive class for one row of features, given in
    /// signature order.
    fn predict_proba(&self, features: &[f32]) -> Result<f64, InferenceError>;

    /// Number of input columns the model was trained on, when known.
    fn expected_features(&self) -> Option<usize> {
        None
    }

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}
