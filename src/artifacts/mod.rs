//! Model artifacts: naming convention, signature, baseline table and the
//! in-memory registry that holds them.

pub mod baseline;
pub mod registry;
pub mod signature;

pub use baseline::{BaselineRow, BaselineTable, EegFeature};
pub use registry::{ArtifactRegistry, LoadedArtifacts, RegistryOptions, RegistryState};
pub use signature::{FeatureSignature, MissingFeaturePolicy};

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Which artifact a file name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Model,
    Signature,
    Baseline,
    Explainer,
}

impl ArtifactKind {
    /// Only the model blob is required for the registry to become ready
    pub fn is_required(&self) -> bool {
        matches!(self, ArtifactKind::Model)
    }
}

/// File names agreed between the training pipeline, the remote store and
/// this process. The same names are used remotely and in the local cache.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactNames {
    pub model: String,
    pub signature: String,
    pub baseline: String,
    pub explainer: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            model: "foundation_model_v1.ubj".to_string(),
            signature: "model_signature.json".to_string(),
            baseline: "master_eeg_features.csv".to_string(),
            explainer: "shap_explainer.joblib".to_string(),
        }
    }
}

impl ArtifactNames {
    pub fn name(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Model => &self.model,
            ArtifactKind::Signature => &self.signature,
            ArtifactKind::Baseline => &self.baseline,
            ArtifactKind::Explainer => &self.explainer,
        }
    }

    /// All artifacts in sync order
    pub fn all(&self) -> [(ArtifactKind, &str); 4] {
        [
            (ArtifactKind::Model, self.model.as_str()),
            (ArtifactKind::Signature, self.signature.as_str()),
            (ArtifactKind::Baseline, self.baseline.as_str()),
            (ArtifactKind::Explainer, self.explainer.as_str()),
        ]
    }

    pub fn local_path<P: AsRef<Path>>(&self, dir: P, kind: ArtifactKind) -> PathBuf {
        dir.as_ref().join(self.name(kind))
    }
}
