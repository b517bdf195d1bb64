//! Artifact registry: the process-wide holder of the loaded model, its
//! feature signature and the baseline table.
//!
//! The registry is owned by the composition root and shared by reference.
//! Loads are serialized on an internal barrier; predictions take a cheap
//! `Arc` snapshot and never block on a load in progress.

use super::{ArtifactKind, ArtifactNames, BaselineTable, FeatureSignature};
use crate::error::{LoadError, PredictError};
use crate::models::{Classifier, ModelLoader};
use crate::types::RiskPolicy;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{error, info, warn};

/// Everything a prediction needs, immutable once built
pub struct LoadedArtifacts {
    pub model: Box<dyn Classifier>,
    pub signature: FeatureSignature,
    pub baseline: Option<BaselineTable>,
    pub explainer_available: bool,
    pub loaded_at: DateTime<Utc>,
}

impl std::fmt::Debug for LoadedArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedArtifacts")
            .field("backend", &self.model.backend())
            .field("features", &self.signature.len())
            .field("risk_policy", &self.signature.risk_policy())
            .field("baseline_rows", &self.baseline.as_ref().map(|b| b.len()))
            .field("explainer_available", &self.explainer_available)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Observable lifecycle of the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    Unloaded,
    Loading,
    Ready,
    LoadFailed { reason: String },
}

enum Slot {
    Unloaded,
    Loading,
    Ready(Arc<LoadedArtifacts>),
    LoadFailed(String),
}

impl Slot {
    fn state(&self) -> RegistryState {
        match self {
            Slot::Unloaded => RegistryState::Unloaded,
            Slot::Loading => RegistryState::Loading,
            Slot::Ready(_) => RegistryState::Ready,
            Slot::LoadFailed(reason) => RegistryState::LoadFailed {
                reason: reason.clone(),
            },
        }
    }
}

/// Where and how the registry reads its artifacts
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub artifact_dir: PathBuf,
    pub names: ArtifactNames,
    /// Policy used when the signature document does not name one
    pub default_policy: RiskPolicy,
    pub onnx_threads: usize,
}

impl RegistryOptions {
    pub fn new<P: Into<PathBuf>>(artifact_dir: P) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            names: ArtifactNames::default(),
            default_policy: RiskPolicy::default(),
            onnx_threads: 1,
        }
    }

    pub fn with_names(mut self, names: ArtifactNames) -> Self {
        self.names = names;
        self
    }

    pub fn with_default_policy(mut self, policy: RiskPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_onnx_threads(mut self, threads: usize) -> Self {
        self.onnx_threads = threads;
        self
    }

    fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.names.local_path(&self.artifact_dir, kind)
    }
}

pub struct ArtifactRegistry {
    options: RegistryOptions,
    slot: RwLock<Slot>,
    load_barrier: Mutex<()>,
}

impl ArtifactRegistry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            options,
            slot: RwLock::new(Slot::Unloaded),
            load_barrier: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Load artifacts from local disk. A registry that is already ready is
    /// left untouched; use [`reload`](Self::reload) to replace it.
    pub fn load(&self) -> RegistryState {
        let _guard = self.load_barrier.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*self.read_slot(), Slot::Ready(_)) {
            return RegistryState::Ready;
        }
        self.load_locked()
    }

    /// Re-read all artifacts and replace the loaded set wholesale.
    ///
    /// If a previous set is being served and the reload fails, the previous
    /// set stays in service.
    pub fn reload(&self) -> RegistryState {
        let _guard = self.load_barrier.lock().unwrap_or_else(|e| e.into_inner());
        self.load_locked()
    }

    fn load_locked(&self) -> RegistryState {
        let previous = match &*self.read_slot() {
            Slot::Ready(artifacts) => Some(Arc::clone(artifacts)),
            _ => None,
        };

        if previous.is_none() {
            *self.write_slot() = Slot::Loading;
        }

        info!(dir = %self.options.artifact_dir.display(), "Loading model artifacts");

        let next = match self.read_artifacts() {
            Ok(artifacts) => {
                info!(
                    backend = artifacts.model.backend(),
                    features = artifacts.signature.len(),
                    risk_policy = artifacts.signature.risk_policy().name(),
                    baseline_rows = artifacts.baseline.as_ref().map(|b| b.len()).unwrap_or(0),
                    explainer = artifacts.explainer_available,
                    "Model artifacts ready"
                );
                Slot::Ready(Arc::new(artifacts))
            }
            Err(e) => match previous {
                Some(current) => {
                    warn!(error = %e, "Reload failed, keeping previously loaded artifacts");
                    Slot::Ready(current)
                }
                None => {
                    error!(error = %e, "Failed to load model artifacts");
                    Slot::LoadFailed(e.to_string())
                }
            },
        };

        let state = next.state();
        *self.write_slot() = next;
        state
    }

    fn read_artifacts(&self) -> Result<LoadedArtifacts, LoadError> {
        let model_path = self.options.path(ArtifactKind::Model);
        let model = ModelLoader::with_threads(self.options.onnx_threads).load(&model_path)?;
        info!(path = %model_path.display(), backend = model.backend(), "Model blob loaded");

        let default_policy = self.options.default_policy;
        let signature_path = self.options.path(ArtifactKind::Signature);
        let signature = match FeatureSignature::load(&signature_path, default_policy) {
            Ok(Some(signature)) => {
                info!(features = signature.len(), "Feature signature loaded");
                signature
            }
            Ok(None) => {
                warn!(
                    path = %signature_path.display(),
                    "No feature signature, record columns pass through in natural order"
                );
                FeatureSignature::empty(default_policy)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unusable feature signature");
                FeatureSignature::empty(default_policy)
            }
        };

        if let Some(expected) = model.expected_features() {
            if !signature.is_empty() && signature.len() != expected {
                warn!(
                    signature = signature.len(),
                    model = expected,
                    "Signature width differs from model input width"
                );
            }
        }

        let baseline_path = self.options.path(ArtifactKind::Baseline);
        let baseline = match BaselineTable::load(&baseline_path) {
            Ok(Some(table)) => {
                info!(rows = table.len(), "Baseline table loaded");
                Some(table)
            }
            Ok(None) => {
                warn!(path = %baseline_path.display(), "No baseline table, physiological features will be zero-filled");
                None
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unusable baseline table");
                None
            }
        };

        let explainer_available = self.options.path(ArtifactKind::Explainer).is_file();

        Ok(LoadedArtifacts {
            model,
            signature,
            baseline,
            explainer_available,
            loaded_at: Utc::now(),
        })
    }

    pub fn state(&self) -> RegistryState {
        self.read_slot().state()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.read_slot(), Slot::Ready(_))
    }

    pub fn explainer_available(&self) -> bool {
        match &*self.read_slot() {
            Slot::Ready(artifacts) => artifacts.explainer_available,
            _ => false,
        }
    }

    /// The current artifact set, or the reason predictions cannot run
    pub fn snapshot(&self) -> Result<Arc<LoadedArtifacts>, PredictError> {
        match &*self.read_slot() {
            Slot::Ready(artifacts) => Ok(Arc::clone(artifacts)),
            Slot::LoadFailed(reason) => Err(PredictError::ModelUnavailable(reason.clone())),
            Slot::Unloaded | Slot::Loading => Err(PredictError::NotReady),
        }
    }

    fn read_slot(&self) -> std::sync::RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_slot(&self) -> std::sync::RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const MODEL: &str = r#"{"learner": {
        "gradient_booster": {"model": {"trees": [{
            "left_children": [1, -1, -1], "right_children": [2, -1, -1],
            "split_indices": [0, 0, 0], "split_conditions": [6.0, 0.8, -0.4],
            "default_left": [0, 0, 0]
        }]}},
        "learner_model_param": {"base_score": "5E-1"},
        "objective": {"name": "binary:logistic"}
    }}"#;

    fn options(dir: &Path) -> RegistryOptions {
        let names = ArtifactNames {
            model: "model.json".to_string(),
            ..ArtifactNames::default()
        };
        RegistryOptions::new(dir).with_names(names)
    }

    fn write_model(dir: &Path) {
        fs::write(dir.join("model.json"), MODEL).unwrap();
    }

    #[test]
    fn test_starts_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ArtifactRegistry::new(options(dir.path()));

        assert_eq!(registry.state(), RegistryState::Unloaded);
        assert!(!registry.is_ready());
        assert!(matches!(registry.snapshot(), Err(PredictError::NotReady)));
    }

    #[test]
    fn test_missing_model_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ArtifactRegistry::new(options(dir.path()));

        let state = registry.load();
        assert!(matches!(state, RegistryState::LoadFailed { .. }));
        assert!(matches!(registry.snapshot(), Err(PredictError::ModelUnavailable(_))));
    }

    #[test]
    fn test_model_only_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path());
        let registry = ArtifactRegistry::new(options(dir.path()));

        assert_eq!(registry.load(), RegistryState::Ready);
        let artifacts = registry.snapshot().unwrap();
        assert!(artifacts.signature.is_empty());
        assert!(artifacts.baseline.is_none());
        assert!(!registry.explainer_available());
    }

    #[test]
    fn test_default_names_load_binary_model() {
        let dir = tempfile::tempdir().unwrap();
        let document: serde_json::Value = serde_json::from_str(MODEL).unwrap();
        fs::write(
            dir.path().join("foundation_model_v1.ubj"),
            crate::models::ubjson::encode(&document),
        )
        .unwrap();
        let registry = ArtifactRegistry::new(RegistryOptions::new(dir.path()));

        assert_eq!(registry.load(), RegistryState::Ready);
        let artifacts = registry.snapshot().unwrap();
        assert_eq!(artifacts.model.backend(), "tree_ensemble");
        // 7.0 >= 6.0 goes right: sigmoid(-0.4)
        let p = artifacts.model.predict_proba(&[7.0]).unwrap();
        assert!((p - 1.0 / (1.0 + 0.4f64.exp())).abs() < 1e-6);
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path());
        let registry = ArtifactRegistry::new(options(dir.path()));

        assert_eq!(registry.load(), RegistryState::Ready);
        let first = registry.snapshot().unwrap();
        assert_eq!(registry.load(), RegistryState::Ready);
        let second = registry.snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_bad_signature_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path());
        fs::write(dir.path().join("model_signature.json"), "{\"feature_order\": 5}").unwrap();
        fs::write(dir.path().join("shap_explainer.joblib"), b"blob").unwrap();
        let registry = ArtifactRegistry::new(options(dir.path()));

        assert_eq!(registry.load(), RegistryState::Ready);
        assert!(registry.snapshot().unwrap().signature.is_empty());
        assert!(registry.explainer_available());
    }

    #[test]
    fn test_reload_recovers_from_failure_and_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ArtifactRegistry::new(options(dir.path()));
        assert!(matches!(registry.load(), RegistryState::LoadFailed { .. }));

        write_model(dir.path());
        // load() after a failure retries
        assert_eq!(registry.load(), RegistryState::Ready);
        let served = registry.snapshot().unwrap();

        fs::write(dir.path().join("model.json"), "garbage").unwrap();
        assert_eq!(registry.reload(), RegistryState::Ready);
        assert!(Arc::ptr_eq(&served, &registry.snapshot().unwrap()));
    }

    #[test]
    fn test_reload_waits_for_load_in_progress() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path());
        let registry = ArtifactRegistry::new(options(dir.path()));
        assert_eq!(registry.load(), RegistryState::Ready);
        let before = registry.snapshot().unwrap();

        let finished = AtomicBool::new(false);
        std::thread::scope(|s| {
            let guard = registry.load_barrier.lock().unwrap();
            let reloader = s.spawn(|| {
                let state = registry.reload();
                finished.store(true, Ordering::SeqCst);
                state
            });

            std::thread::sleep(Duration::from_millis(100));
            assert!(!finished.load(Ordering::SeqCst));
            // the barrier holder still sees the served set
            assert!(Arc::ptr_eq(&before, &registry.snapshot().unwrap()));

            drop(guard);
            assert_eq!(reloader.join().unwrap(), RegistryState::Ready);
        });

        assert!(finished.load(Ordering::SeqCst));
        assert!(!Arc::ptr_eq(&before, &registry.snapshot().unwrap()));
    }
}
