//! Model blob loader

use super::{Classifier, TreeEnsemble};
use crate::error::LoadError;
use std::path::Path;
use tracing::info;

/// Loads a model blob from local disk, picking the backend from the file
/// extension: `.onnx` runs on ONNX Runtime, `.json` and `.ubj` on the native
/// tree ensemble evaluator.
pub struct ModelLoader {
    /// Number of intra-op threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Box<dyn Classifier>, LoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoadError::ModelMissing(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let model: Box<dyn Classifier> = match extension.as_str() {
            "json" | "ubj" => {
                let bytes = std::fs::read(path)?;
                let ensemble = if extension == "ubj" {
                    TreeEnsemble::from_ubjson(&bytes)?
                } else {
                    TreeEnsemble::from_json(&bytes)?
                };
                info!(
                    path = %path.display(),
                    trees = ensemble.tree_count(),
                    "Loaded tree ensemble model"
                );
                Box::new(ensemble)
            }
            "onnx" => self.load_onnx(path)?,
            other => return Err(LoadError::UnsupportedFormat(other.to_string())),
        };

        Ok(model)
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, path: &Path) -> Result<Box<dyn Classifier>, LoadError> {
        use super::onnx::OnnxClassifier;
        use ort::session::{builder::GraphOptimizationLevel, Session};

        fn corrupt<E: std::fmt::Display>(e: E) -> LoadError {
            LoadError::CorruptModel(e.to_string())
        }

        // Repeated calls after the first are no-ops.
        ort::init().commit().map_err(corrupt)?;

        info!(path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(corrupt)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(corrupt)?
            .with_intra_threads(self.onnx_threads)
            .map_err(corrupt)?
            .commit_from_file(path)
            .map_err(corrupt)?;

        let classifier = OnnxClassifier::new(session);
        info!(
            input = %classifier.input_name(),
            output = %classifier.output_name(),
            "ONNX model loaded successfully"
        );

        Ok(Box::new(classifier))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, _path: &Path) -> Result<Box<dyn Classifier>, LoadError> {
        Err(LoadError::UnsupportedFormat(
            "onnx (built without the `onnx` feature)".to_string(),
        ))
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelLoader::new()
            .load(dir.path().join("foundation_model_v1.json"))
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::ModelMissing(_)));
    }

    const MODEL: &str = r#"{"learner": {
        "gradient_booster": {"model": {"trees": [{
            "left_children":    [1, -1, -1],
            "right_children":   [2, -1, -1],
            "split_indices":    [0, 0, 0],
            "split_conditions": [0.5, -0.75, 1.25],
            "default_left":     [1, 0, 0]
        }]}},
        "learner_model_param": {"base_score": "5E-1", "num_feature": "2"},
        "objective": {"name": "binary:logistic"}
    }}"#;

    #[test]
    fn test_binary_save_matches_json_save() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("foundation_model_v1.json");
        let ubj_path = dir.path().join("foundation_model_v1.ubj");
        std::fs::write(&json_path, MODEL).unwrap();
        let document: serde_json::Value = serde_json::from_str(MODEL).unwrap();
        std::fs::write(&ubj_path, super::super::ubjson::encode(&document)).unwrap();

        let loader = ModelLoader::new();
        let from_json = loader.load(&json_path).unwrap();
        let from_ubj = loader.load(&ubj_path).unwrap();

        assert_eq!(from_ubj.expected_features(), Some(2));
        for row in [[0.1f32, 0.0], [0.9, 0.0], [f32::NAN, 0.0]] {
            let a = from_json.predict_proba(&row).unwrap();
            let b = from_ubj.predict_proba(&row).unwrap();
            assert_eq!(a.to_bits(), b.to_bits());
        }
        // NaN goes left
        assert_eq!(
            from_ubj.predict_proba(&[f32::NAN, 0.0]).unwrap(),
            from_ubj.predict_proba(&[0.1, 0.0]).unwrap()
        );
    }

    #[test]
    fn test_corrupt_ubj_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ubj");
        std::fs::write(&path, b"{\"learner\": 3}").unwrap();

        let err = ModelLoader::new().load(&path).err().unwrap();
        assert!(matches!(err, LoadError::CorruptModel(_)));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foundation_model_v1.pkl");
        std::fs::write(&path, b"{}").unwrap();

        let err = ModelLoader::new().load(&path).err().unwrap();
        assert!(matches!(err, LoadError::UnsupportedFormat(ref ext) if ext == "pkl"));
    }

    #[test]
    fn test_corrupt_json_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{\"learner\": 3}").unwrap();

        let err = ModelLoader::new().load(&path).err().unwrap();
        assert!(matches!(err, LoadError::CorruptModel(_)));
    }
}
