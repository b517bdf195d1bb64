//! Seizure-risk prediction engine
//!
//! Syncs model artifacts from a remote store, loads them into a shared
//! registry and serves risk predictions built from lifestyle signals and
//! per-profile EEG baselines.

pub mod artifacts;
pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod error;
pub mod feature_resolver;
pub mod metrics;
pub mod models;
pub mod predictor;
pub mod producer;
pub mod store;
pub mod types;

pub use artifacts::{ArtifactRegistry, RegistryOptions, RegistryState};
pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use coordinator::{LifecycleCoordinator, StartupReport, SyncOutcome, SyncReport};
pub use error::{InferenceError, LoadError, PredictError, ResolveError, StoreError};
pub use feature_resolver::FeatureResolver;
pub use models::InferenceEngine;
pub use predictor::RiskPredictor;
pub use producer::ResponsePublisher;
pub use store::{ArtifactStore, RemoteArtifactStore};
pub use types::{InferenceRequest, PredictionResponse, RiskPolicy, RiskTier};
