//! Type definitions for the seizure-risk prediction core

pub mod prediction;
pub mod request;

pub use prediction::{ErrorPayload, Prediction, PredictionResponse, RiskPolicy, RiskTier};
pub use request::{InferenceRequest, NumericInput, DEFAULT_PROFILE_ID};
