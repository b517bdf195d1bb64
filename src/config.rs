//! Configuration management for the seizure-risk engine

use crate::artifacts::{ArtifactNames, MissingFeaturePolicy, RegistryOptions};
use crate::types::{RiskPolicy, DEFAULT_PROFILE_ID};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub store: StoreConfig,
    pub artifacts: ArtifactsConfig,
    pub inference: InferenceConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming inference requests (request/reply)
    pub request_subject: String,
    /// Queue group so several instances share the request load
    pub queue_group: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            request_subject: "seizure.risk.predict".to_string(),
            queue_group: "seizure-risk-engine".to_string(),
        }
    }
}

/// Remote artifact store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the storage service; `SUPABASE_URL` when unset
    pub url: Option<String>,
    /// Service-role key; `SUPABASE_SERVICE_ROLE_KEY` when unset
    pub service_key: Option<String>,
    /// Bucket holding the artifacts
    pub bucket: String,
    /// Per-artifact transfer timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            bucket: "model-registry".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Local artifact cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Directory mirroring the remote artifacts
    pub dir: String,
    /// Artifact file names
    pub names: ArtifactNames,
    /// Number of threads for ONNX inference
    pub onnx_threads: usize,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: "ml_engine".to_string(),
            names: ArtifactNames::default(),
            onnx_threads: 1,
        }
    }
}

/// Inference policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Policy applied when the signature does not name one
    pub risk_policy: RiskPolicy,
    /// Handling of declared features the request cannot supply
    pub missing_features: MissingFeaturePolicy,
    /// Profile used when a request names none
    pub default_profile_id: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            risk_policy: RiskPolicy::ThreeTierV1,
            missing_features: MissingFeaturePolicy::ZeroFill,
            default_profile_id: DEFAULT_PROFILE_ID.to_string(),
        }
    }
}

/// Request pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrently processed requests
    pub workers: usize,
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/config.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path. The file is optional;
    /// `RISK__SECTION__KEY` environment variables override it.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("RISK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app.store.apply_env_fallback(|key| std::env::var(key).ok());
        Ok(app)
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions::new(&self.artifacts.dir)
            .with_names(self.artifacts.names.clone())
            .with_default_policy(self.inference.risk_policy)
            .with_onnx_threads(self.artifacts.onnx_threads)
    }
}

impl StoreConfig {
    /// Fill unset credentials from the conventional storage variables
    fn apply_env_fallback<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if self.url.is_none() {
            self.url = lookup("SUPABASE_URL");
        }
        if self.service_key.is_none() {
            self.service_key = lookup("SUPABASE_SERVICE_ROLE_KEY");
        }
    }
}
