//! Risk classification and prediction response structures

use crate::error::PredictError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete risk tier derived from the model probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

/// Versioned thresholding policy.
///
/// The policy travels with the model signature so a model trained for the
/// binary split is never scored with the three-tier thresholds or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskPolicy {
    /// `p > 0.7` High, `0.3 < p <= 0.7` Medium, otherwise Low
    #[default]
    ThreeTierV1,
    /// `p > 0.5` High, otherwise Low (reported as "Stable")
    BinaryV0,
}

impl RiskPolicy {
    /// Parse a policy name as written in a signature document.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "three_tier_v1" => Some(RiskPolicy::ThreeTierV1),
            "binary_v0" => Some(RiskPolicy::BinaryV0),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RiskPolicy::ThreeTierV1 => "three_tier_v1",
            RiskPolicy::BinaryV0 => "binary_v0",
        }
    }

    /// Map a probability to a tier. Comparisons are strict, so a probability
    /// exactly on a threshold falls into the lower tier.
    pub fn classify(&self, probability: f64) -> RiskTier {
        match self {
            RiskPolicy::ThreeTierV1 => {
                if probability > 0.7 {
                    RiskTier::High
                } else if probability > 0.3 {
                    RiskTier::Medium
                } else {
                    RiskTier::Low
                }
            }
            RiskPolicy::BinaryV0 => {
                if probability > 0.5 {
                    RiskTier::High
                } else {
                    RiskTier::Low
                }
            }
        }
    }

    /// Human-readable status label for a tier under this policy
    pub fn status_label(&self, tier: RiskTier) -> &'static str {
        match (self, tier) {
            (RiskPolicy::BinaryV0, RiskTier::High) => "High Risk",
            (RiskPolicy::BinaryV0, _) => "Stable",
            (_, RiskTier::High) => "High Risk",
            (_, RiskTier::Medium) => "Medium Risk",
            (_, RiskTier::Low) => "Low Risk",
        }
    }
}

/// Output of the inference engine for one request
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Class-1 probability in [0, 1]
    pub probability: f64,
    pub risk_tier: RiskTier,
    /// Identifier of the baseline row that filled the physiological features
    pub baseline_used: String,
    /// Policy that produced `risk_tier`
    pub policy: RiskPolicy,
}

/// Response returned to the serving layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Unique response identifier
    pub request_id: String,

    /// Unrounded class-1 probability
    pub probability: f64,

    /// Probability scaled to 0-100, one decimal place
    pub risk_percentage: f64,

    /// "Low Risk", "Medium Risk", "High Risk" (or "Stable" under the binary policy)
    pub status: String,

    pub risk_tier: RiskTier,

    pub baseline_used: String,

    pub policy: RiskPolicy,

    pub evaluated_at: DateTime<Utc>,
}

impl PredictionResponse {
    pub fn from_prediction(prediction: &Prediction) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            probability: prediction.probability,
            risk_percentage: risk_percentage(prediction.probability),
            status: prediction
                .policy
                .status_label(prediction.risk_tier)
                .to_string(),
            risk_tier: prediction.risk_tier,
            baseline_used: prediction.baseline_used.clone(),
            policy: prediction.policy,
            evaluated_at: Utc::now(),
        }
    }
}

/// `round(probability * 100, 1)`
pub fn risk_percentage(probability: f64) -> f64 {
    (probability * 1000.0).round() / 10.0
}

/// Structured error payload sent back instead of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub detail: String,
}

impl From<&PredictError> for ErrorPayload {
    fn from(err: &PredictError) -> Self {
        Self {
            error: err.kind().to_string(),
            detail: err.to_string(),
        }
    }
}
