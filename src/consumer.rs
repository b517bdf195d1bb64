//! NATS consumer for incoming inference requests

use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Queue-group subscriber so that several engine instances share requests
pub struct RequestConsumer {
    client: Client,
    subject: String,
    queue_group: String,
}

impl RequestConsumer {
    pub fn new(client: Client, subject: &str, queue_group: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            queue_group: queue_group.to_string(),
        }
    }

    /// Subscribe to the request subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .queue_subscribe(self.subject.clone(), self.queue_group.clone())
            .await?;
        info!(
            subject = %self.subject,
            queue_group = %self.queue_group,
            "Subscribed to inference requests"
        );
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
