//! NATS replies for inference requests

use crate::error::PredictError;
use crate::types::{ErrorPayload, PredictionResponse};
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Serialize a prediction outcome as the reply body: the response on
/// success, `{"error", "detail"}` otherwise.
pub fn encode_reply(outcome: &Result<PredictionResponse, PredictError>) -> Result<Vec<u8>> {
    let payload = match outcome {
        Ok(response) => serde_json::to_vec(response)?,
        Err(err) => serde_json::to_vec(&ErrorPayload::from(err))?,
    };
    Ok(payload)
}

/// Publishes replies to the inbox carried by each request
#[derive(Clone)]
pub struct ResponsePublisher {
    client: Client,
}

impl ResponsePublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn reply(
        &self,
        reply_to: Subject,
        outcome: &Result<PredictionResponse, PredictError>,
    ) -> Result<()> {
        let payload = encode_reply(outcome)?;
        self.client.publish(reply_to.clone(), payload.into()).await?;

        match outcome {
            Ok(response) => debug!(
                request_id = %response.request_id,
                reply_to = %reply_to,
                "Published prediction"
            ),
            Err(err) => debug!(kind = err.kind(), reply_to = %reply_to, "Published error reply"),
        }
        Ok(())
    }
}
