//! Seizure-risk engine - main entry point
//!
//! Syncs and loads model artifacts, then serves inference requests over NATS
//! request/reply. `seizure-risk-engine publish` uploads the local artifact
//! directory to the remote store instead and exits.

use anyhow::{Context, Result};
use futures::StreamExt;
use seizure_risk_engine::{
    artifacts::ArtifactRegistry,
    config::AppConfig,
    consumer::RequestConsumer,
    coordinator::LifecycleCoordinator,
    metrics::{MetricsReporter, PredictionMetrics},
    models::InferenceEngine,
    predictor::RiskPredictor,
    producer::ResponsePublisher,
    store::{publish_local_artifacts, PublishOutcome, RemoteArtifactStore},
    RegistryState,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level))
        .add_directive("seizure_risk_engine=info".parse()?);

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = AppConfig::load()?;
    init_tracing(&config)?;

    let store = Arc::new(
        RemoteArtifactStore::new(&config.store).context("Failed to build artifact store client")?,
    );

    if std::env::args().nth(1).as_deref() == Some("publish") {
        return publish(&config, &store).await;
    }

    info!("Starting seizure-risk engine");
    info!(
        risk_policy = config.inference.risk_policy.name(),
        missing_features = ?config.inference.missing_features,
        artifact_dir = %config.artifacts.dir,
        "Configuration loaded"
    );
    if !store.is_configured() {
        warn!("Remote artifact store is not configured, serving local artifacts only");
    }

    let registry = Arc::new(ArtifactRegistry::new(config.registry_options()));
    let coordinator = LifecycleCoordinator::new(
        store,
        registry.clone(),
        Duration::from_millis(config.store.timeout_ms),
    );

    // Requests are only accepted once the registry has settled
    let startup = coordinator.startup().await;
    if let RegistryState::LoadFailed { reason } = &startup.state {
        warn!(reason = %reason, "Serving without a model, every request will be refused");
    }

    let predictor = Arc::new(RiskPredictor::new(
        registry,
        InferenceEngine::new(config.inference.missing_features),
        &config.inference.default_profile_id,
    ));
    let metrics = Arc::new(PredictionMetrics::new());

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(
        client.clone(),
        &config.nats.request_subject,
        &config.nats.queue_group,
    );
    let publisher = ResponsePublisher::new(client.clone());

    let metrics_clone = metrics.clone();
    let interval = config.pipeline.metrics_interval_secs;
    tokio::spawn(async move {
        MetricsReporter::new(metrics_clone, interval).start().await;
    });

    let workers = config.pipeline.workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    info!(
        workers = workers,
        subject = consumer.subject(),
        "Listening for inference requests"
    );

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let predictor = predictor.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let Some(reply_to) = message.reply.clone() else {
                warn!(subject = %message.subject, "Dropping request without reply subject");
                return;
            };

            let outcome = predictor.predict_json(&message.payload);
            let latency = start_time.elapsed();

            match &outcome {
                Ok(response) => {
                    metrics.record_prediction(latency, response.probability, response.risk_tier);
                    debug!(
                        request_id = %response.request_id,
                        risk_percentage = response.risk_percentage,
                        tier = response.risk_tier.as_str(),
                        latency_us = latency.as_micros() as u64,
                        "Prediction served"
                    );
                }
                Err(e) => {
                    metrics.record_failure(latency, e.kind());
                    warn!(kind = e.kind(), error = %e, "Prediction refused");
                }
            }

            if let Err(e) = publisher.reply(reply_to, &outcome).await {
                error!(error = %e, "Failed to publish reply");
            }

            drop(permit);
        });
    }

    info!("Request stream closed, shutting down");
    metrics.print_summary();

    Ok(())
}

async fn publish(config: &AppConfig, store: &RemoteArtifactStore) -> Result<()> {
    if !store.is_configured() {
        anyhow::bail!("Remote artifact store is not configured (set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY)");
    }

    let dir = std::path::Path::new(&config.artifacts.dir);
    info!(dir = %dir.display(), "Publishing local artifacts");

    let outcomes = publish_local_artifacts(store, dir, &config.artifacts.names).await;
    let failed = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, PublishOutcome::Failed(_)))
        .count();

    if failed > 0 {
        anyhow::bail!("{} artifact upload(s) failed", failed);
    }
    info!("All present artifacts published");
    Ok(())
}
