//! Feature signature: the ordered column contract of a trained model.

use crate::error::LoadError;
use crate::types::RiskPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Column order of the 15-feature model revision, kept for tooling and tests.
/// Inference never falls back to it; the loaded signature is authoritative.
pub const LEGACY_FEATURE_ORDER: [&str; 15] = [
    "hours_of_sleep",
    "stress_level",
    "medication_taken",
    "hours_of_sleep_7day_avg",
    "stress_level_7day_avg",
    "medication_taken_7day_avg",
    "eeg_mean_amp",
    "eeg_std_amp",
    "eeg_skewness",
    "eeg_kurtosis",
    "eeg_peak_to_peak",
    "eeg_delta_power",
    "eeg_theta_power",
    "eeg_alpha_power",
    "eeg_beta_power",
];

/// What the inference engine does with a declared column the feature record
/// cannot supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFeaturePolicy {
    /// Insert 0.0 for the missing column
    #[default]
    ZeroFill,
    /// Fail the prediction, naming the missing columns
    Reject,
}

/// On-disk layout: `{"feature_order": [...], "risk_policy": "three_tier_v1"}`
#[derive(Debug, Deserialize)]
struct SignatureDocument {
    feature_order: Vec<String>,
    #[serde(default)]
    risk_policy: Option<String>,
}

/// Ordered, duplicate-free feature names plus the risk policy the model was
/// calibrated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSignature {
    feature_order: Vec<String>,
    risk_policy: RiskPolicy,
}

impl FeatureSignature {
    pub fn new(feature_order: Vec<String>, risk_policy: RiskPolicy) -> Result<Self, LoadError> {
        let mut seen = HashSet::with_capacity(feature_order.len());
        for name in &feature_order {
            if name.trim().is_empty() {
                return Err(LoadError::Signature("empty feature name".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(LoadError::Signature(format!("duplicate feature '{}'", name)));
            }
        }

        Ok(Self {
            feature_order,
            risk_policy,
        })
    }

    /// Signature of a model shipped without a signature document: the
    /// record's own columns are passed through in insertion order.
    pub fn empty(risk_policy: RiskPolicy) -> Self {
        Self {
            feature_order: Vec::new(),
            risk_policy,
        }
    }

    /// Parse a signature document. `default_policy` applies when the
    /// document does not name one.
    pub fn from_json(bytes: &[u8], default_policy: RiskPolicy) -> Result<Self, LoadError> {
        let doc: SignatureDocument =
            serde_json::from_slice(bytes).map_err(|e| LoadError::Signature(e.to_string()))?;

        let risk_policy = match doc.risk_policy.as_deref() {
            None => default_policy,
            Some(name) => RiskPolicy::from_name(name)
                .ok_or_else(|| LoadError::Signature(format!("unknown risk policy '{}'", name)))?,
        };

        Self::new(doc.feature_order, risk_policy)
    }

    /// Read the signature from disk; `Ok(None)` when the file is absent.
    pub fn load<P: AsRef<Path>>(path: P, default_policy: RiskPolicy) -> Result<Option<Self>, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Self::from_json(&bytes, default_policy).map(Some)
    }

    pub fn feature_order(&self) -> &[String] {
        &self.feature_order
    }

    pub fn risk_policy(&self) -> RiskPolicy {
        self.risk_policy
    }

    pub fn is_empty(&self) -> bool {
        self.feature_order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.feature_order.len()
    }

    /// Whether the model consumes `name`. An empty signature consumes
    /// whatever the record supplies.
    pub fn declares(&self, name: &str) -> bool {
        self.is_empty() || self.feature_order.iter().any(|f| f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature_document() {
        let json = br#"{"feature_order": ["hours_of_sleep", "stress_level", "eeg_delta_power"]}"#;
        let signature = FeatureSignature::from_json(json, RiskPolicy::ThreeTierV1).unwrap();

        assert_eq!(signature.len(), 3);
        assert_eq!(signature.feature_order()[2], "eeg_delta_power");
        assert_eq!(signature.risk_policy(), RiskPolicy::ThreeTierV1);
    }

    #[test]
    fn test_document_policy_overrides_default() {
        let json = br#"{"feature_order": ["stress_level"], "risk_policy": "binary_v0"}"#;
        let signature = FeatureSignature::from_json(json, RiskPolicy::ThreeTierV1).unwrap();
        assert_eq!(signature.risk_policy(), RiskPolicy::BinaryV0);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let json = br#"{"feature_order": ["stress_level"], "risk_policy": "five_tier"}"#;
        let err = FeatureSignature::from_json(json, RiskPolicy::ThreeTierV1).unwrap_err();
        assert!(err.to_string().contains("five_tier"));
    }

    #[test]
    fn test_duplicate_features_are_rejected() {
        let order = vec!["stress_level".to_string(), "stress_level".to_string()];
        assert!(FeatureSignature::new(order, RiskPolicy::default()).is_err());
    }

    #[test]
    fn test_empty_signature_declares_everything() {
        let signature = FeatureSignature::empty(RiskPolicy::default());
        assert!(signature.declares("anything"));

        let legacy: Vec<String> = LEGACY_FEATURE_ORDER.iter().map(|s| s.to_string()).collect();
        let signature = FeatureSignature::new(legacy, RiskPolicy::default()).unwrap();
        assert!(signature.declares("eeg_beta_power"));
        assert!(!signature.declares("eeg_gamma_power"));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = FeatureSignature::load(dir.path().join("absent.json"), RiskPolicy::default()).unwrap();
        assert!(loaded.is_none());
    }
}
