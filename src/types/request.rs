//! Inference request structures as received from the serving layer

use serde::{Deserialize, Serialize};

/// Profile used when a request does not name one
pub const DEFAULT_PROFILE_ID: &str = "chb01";

/// A numeric field that may arrive as a JSON number or a numeric string.
///
/// Coercion to `f64` happens in the feature resolver so a bad value surfaces
/// as a validation error rather than a deserialization failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl From<f64> for NumericInput {
    fn from(value: f64) -> Self {
        NumericInput::Number(value)
    }
}

impl From<i64> for NumericInput {
    fn from(value: i64) -> Self {
        NumericInput::Number(value as f64)
    }
}

impl From<&str> for NumericInput {
    fn from(value: &str) -> Self {
        NumericInput::Text(value.to_string())
    }
}

/// Seizure-risk inference request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Hours slept in the last night
    #[serde(alias = "hours_of_sleep")]
    pub sleep_hours: NumericInput,

    /// Self-reported stress level (0-10)
    pub stress_level: NumericInput,

    /// Whether medication was taken (0 or 1)
    #[serde(alias = "meds_taken")]
    pub medication_taken: NumericInput,

    /// EEG profile to look up in the baseline table
    #[serde(default, alias = "eeg_profile_id", alias = "patient_id")]
    pub profile_id: Option<String>,

    /// Trailing 7-day average of sleep hours, if the caller has one
    #[serde(default, alias = "hours_of_sleep_7day_avg")]
    pub sleep_hours_avg: Option<NumericInput>,

    /// Trailing 7-day average of stress level
    #[serde(default, alias = "stress_level_7day_avg")]
    pub stress_level_avg: Option<NumericInput>,

    /// Trailing 7-day average of medication adherence
    #[serde(default, alias = "medication_taken_7day_avg")]
    pub medication_taken_avg: Option<NumericInput>,
}

impl InferenceRequest {
    /// Create a request with the instantaneous signals only
    pub fn new(sleep_hours: f64, stress_level: i64, medication_taken: i64) -> Self {
        Self {
            sleep_hours: sleep_hours.into(),
            stress_level: stress_level.into(),
            medication_taken: medication_taken.into(),
            profile_id: None,
            sleep_hours_avg: None,
            stress_level_avg: None,
            medication_taken_avg: None,
        }
    }

    pub fn with_profile(mut self, profile_id: &str) -> Self {
        self.profile_id = Some(profile_id.to_string());
        self
    }

    pub fn with_averages(mut self, sleep_hours: f64, stress_level: f64, medication_taken: f64) -> Self {
        self.sleep_hours_avg = Some(sleep_hours.into());
        self.stress_level_avg = Some(stress_level.into());
        self.medication_taken_avg = Some(medication_taken.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json_with_defaults() {
        let json = r#"{"sleep_hours": 6.5, "stress_level": 4, "medication_taken": 1}"#;
        let request: InferenceRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.sleep_hours, NumericInput::Number(6.5));
        assert_eq!(request.stress_level, NumericInput::Number(4.0));
        assert!(request.profile_id.is_none());
        assert!(request.sleep_hours_avg.is_none());
    }

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let json = r#"{
            "hours_of_sleep": "7.25",
            "stress_level": 3,
            "medication_taken": 0,
            "eeg_profile_id": "chb05",
            "stress_level_7day_avg": 5.5
        }"#;
        let request: InferenceRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.sleep_hours, NumericInput::Text("7.25".to_string()));
        assert_eq!(request.profile_id.as_deref(), Some("chb05"));
        assert_eq!(request.stress_level_avg, Some(NumericInput::Number(5.5)));
    }
}
