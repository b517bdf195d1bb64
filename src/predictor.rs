//! Request-to-response facade used by the serving loop

use crate::artifacts::ArtifactRegistry;
use crate::error::{PredictError, ResolveError};
use crate::feature_resolver::FeatureResolver;
use crate::models::InferenceEngine;
use crate::types::{InferenceRequest, PredictionResponse};
use std::sync::Arc;
use tracing::debug;

pub struct RiskPredictor {
    registry: Arc<ArtifactRegistry>,
    engine: InferenceEngine,
    default_profile_id: String,
}

impl RiskPredictor {
    pub fn new(registry: Arc<ArtifactRegistry>, engine: InferenceEngine, default_profile_id: &str) -> Self {
        Self {
            registry,
            engine,
            default_profile_id: default_profile_id.to_string(),
        }
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    /// Resolve and classify one request.
    ///
    /// Refuses with `NotReady`/`ModelUnavailable` before touching the
    /// request when the registry has no loaded model. Resolver and engine
    /// read the same artifact snapshot even if a reload lands mid-call.
    pub fn predict(&self, request: &InferenceRequest) -> Result<PredictionResponse, PredictError> {
        let artifacts = self.registry.snapshot()?;

        let profile_id = request
            .profile_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_profile_id);

        let resolver = FeatureResolver::new(&artifacts.signature, artifacts.baseline.as_ref());
        let resolved = resolver.resolve_request(profile_id, request)?;
        debug!(
            profile_id = %profile_id,
            baseline = %resolved.baseline_used,
            features = resolved.record.len(),
            "Features resolved"
        );

        let prediction = self.engine.predict(&artifacts, &resolved)?;
        Ok(PredictionResponse::from_prediction(&prediction))
    }

    /// Decode a raw request body and classify it. A body that is not a
    /// request document is refused as `invalid_request`.
    pub fn predict_json(&self, payload: &[u8]) -> Result<PredictionResponse, PredictError> {
        let request: InferenceRequest = serde_json::from_slice(payload)
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;
        self.predict(&request)
    }
}
