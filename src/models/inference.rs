//! Inference engine: signature alignment, classification and risk tiering

use crate::artifacts::{FeatureSignature, LoadedArtifacts, MissingFeaturePolicy};
use crate::error::InferenceError;
use crate::feature_resolver::{FeatureRecord, ResolvedFeatures};
use crate::types::Prediction;
use tracing::debug;

/// Builds the classifier input from a resolved feature record and maps the
/// output probability to a risk tier.
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine {
    missing_policy: MissingFeaturePolicy,
}

impl InferenceEngine {
    pub fn new(missing_policy: MissingFeaturePolicy) -> Self {
        Self { missing_policy }
    }

    pub fn missing_policy(&self) -> MissingFeaturePolicy {
        self.missing_policy
    }

    /// Build the input vector in signature order.
    ///
    /// Position `i` holds `record[signature[i]]`; declared names the record
    /// lacks are handled by the missing-feature policy and record entries the
    /// signature does not declare are dropped. An empty signature passes the
    /// record through in insertion order.
    pub fn align(
        &self,
        record: &FeatureRecord,
        signature: &FeatureSignature,
    ) -> Result<Vec<f32>, InferenceError> {
        if signature.is_empty() {
            return Ok(record.iter().map(|(_, v)| v as f32).collect());
        }

        let mut vector = Vec::with_capacity(signature.len());
        let mut missing = Vec::new();

        for name in signature.feature_order() {
            match record.get(name) {
                Some(value) => vector.push(value as f32),
                None => {
                    missing.push(name.clone());
                    vector.push(0.0);
                }
            }
        }

        if !missing.is_empty() {
            match self.missing_policy {
                MissingFeaturePolicy::ZeroFill => {
                    debug!(missing = ?missing, "Zero-filled declared features absent from record");
                }
                MissingFeaturePolicy::Reject => {
                    return Err(InferenceError::MissingFeatures(missing));
                }
            }
        }

        Ok(vector)
    }

    /// Classify one resolved request against a loaded artifact set
    pub fn predict(
        &self,
        artifacts: &LoadedArtifacts,
        resolved: &ResolvedFeatures,
    ) -> Result<Prediction, InferenceError> {
        let vector = self.align(&resolved.record, &artifacts.signature)?;

        if let Some(expected) = artifacts.model.expected_features() {
            if vector.len() != expected {
                return Err(InferenceError::ShapeMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let probability = artifacts.model.predict_proba(&vector)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(InferenceError::InvalidProbability(probability));
        }

        let policy = artifacts.signature.risk_policy();
        let risk_tier = policy.classify(probability);

        debug!(
            backend = artifacts.model.backend(),
            columns = vector.len(),
            probability = probability,
            tier = risk_tier.as_str(),
            "Inference complete"
        );

        Ok(Prediction {
            probability,
            risk_tier,
            baseline_used: resolved.baseline_used.clone(),
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Classifier;
    use crate::types::{RiskPolicy, RiskTier};
    use chrono::Utc;

    /// Returns a fixed probability and checks the vector width.
    struct FixedClassifier {
        probability: f64,
        width: usize,
    }

    impl Classifier for FixedClassifier {
        fn predict_proba(&self, features: &[f32]) -> Result<f64, InferenceError> {
            assert_eq!(features.len(), self.width);
            Ok(self.probability)
        }

        fn backend(&self) -> &'static str {
            "fixed"
        }
    }

    fn signature(names: &[&str]) -> FeatureSignature {
        FeatureSignature::new(
            names.iter().map(|s| s.to_string()).collect(),
            RiskPolicy::ThreeTierV1,
        )
        .unwrap()
    }

    fn record(entries: &[(&str, f64)]) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        for (name, value) in entries {
            record.insert_if_absent(name, *value);
        }
        record
    }

    fn artifacts(signature: FeatureSignature, probability: f64) -> LoadedArtifacts {
        let width = signature.len();
        LoadedArtifacts {
            model: Box::new(FixedClassifier { probability, width }),
            signature,
            baseline: None,
            explainer_available: false,
            loaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_align_orders_fills_and_drops() {
        let engine = InferenceEngine::default();
        let signature = signature(&["c", "a", "missing", "b"]);
        let record = record(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("extra", 9.0)]);

        let vector = engine.align(&record, &signature).unwrap();
        assert_eq!(vector, vec![3.0, 1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_align_reject_policy() {
        let engine = InferenceEngine::new(MissingFeaturePolicy::Reject);
        let signature = signature(&["a", "b"]);

        let err = engine.align(&record(&[("a", 1.0)]), &signature).unwrap_err();
        assert_eq!(err, InferenceError::MissingFeatures(vec!["b".to_string()]));
    }

    #[test]
    fn test_empty_signature_passes_record_through() {
        let engine = InferenceEngine::default();
        let signature = FeatureSignature::empty(RiskPolicy::ThreeTierV1);
        let record = record(&[("z", 1.0), ("a", 2.0)]);

        assert_eq!(engine.align(&record, &signature).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_predict_classifies_with_signature_policy() {
        let engine = InferenceEngine::default();
        let loaded = artifacts(signature(&["a", "b"]), 0.82);
        let resolved = ResolvedFeatures {
            record: record(&[("a", 1.0)]),
            baseline_used: "chb01_baseline".to_string(),
        };

        let prediction = engine.predict(&loaded, &resolved).unwrap();
        assert_eq!(prediction.risk_tier, RiskTier::High);
        assert_eq!(prediction.baseline_used, "chb01_baseline");
        assert_eq!(prediction.policy, RiskPolicy::ThreeTierV1);
    }

    #[test]
    fn test_out_of_range_probability_is_an_error() {
        let engine = InferenceEngine::default();
        let loaded = artifacts(signature(&["a"]), 1.5);
        let resolved = ResolvedFeatures {
            record: record(&[("a", 1.0)]),
            baseline_used: "none".to_string(),
        };

        assert_eq!(
            engine.predict(&loaded, &resolved).unwrap_err(),
            InferenceError::InvalidProbability(1.5)
        );
    }
}
