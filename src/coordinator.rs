//! Startup orchestration: sync artifacts from the remote store, then load
//! the registry. Store failures never abort startup; whatever is already on
//! local disk is served.

use crate::artifacts::{ArtifactKind, ArtifactNames, ArtifactRegistry, RegistryState};
use crate::error::StoreError;
use crate::store::ArtifactStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// What happened to one artifact during sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Downloaded and written over the local copy
    Fetched { bytes: usize },
    /// Remote fetch failed; an existing local copy is used
    KeptLocal { reason: String },
    /// Remote fetch failed and there is no local copy
    Missing { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub outcomes: Vec<(ArtifactKind, SyncOutcome)>,
}

impl SyncReport {
    pub fn outcome(&self, kind: ArtifactKind) -> Option<&SyncOutcome> {
        self.outcomes.iter().find(|(k, _)| *k == kind).map(|(_, o)| o)
    }

    pub fn fetched(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SyncOutcome::Fetched { .. }))
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct StartupReport {
    pub sync: SyncReport,
    pub state: RegistryState,
}

pub struct LifecycleCoordinator {
    store: Arc<dyn ArtifactStore>,
    registry: Arc<ArtifactRegistry>,
    fetch_timeout: Duration,
    startup: OnceCell<StartupReport>,
}

impl LifecycleCoordinator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        registry: Arc<ArtifactRegistry>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            fetch_timeout,
            startup: OnceCell::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    /// Sync every known artifact, then load the registry.
    ///
    /// Runs once per coordinator; later and concurrent callers get the
    /// report of the first run. Returns after the registry has reached
    /// `Ready` or `LoadFailed`.
    pub async fn startup(&self) -> StartupReport {
        self.startup
            .get_or_init(|| async {
                info!("Starting artifact lifecycle");
                let sync = self.sync_artifacts().await;
                let state = self.load_registry().await;

                match &state {
                    RegistryState::Ready => info!(fetched = sync.fetched(), "Registry ready"),
                    RegistryState::LoadFailed { reason } => {
                        error!(reason = %reason, "Registry failed to load, predictions will be refused")
                    }
                    other => warn!(state = ?other, "Registry in unexpected state after startup"),
                }

                StartupReport { sync, state }
            })
            .await
            .clone()
    }

    /// Best-effort download of every artifact into the local directory
    pub async fn sync_artifacts(&self) -> SyncReport {
        let options = self.registry.options();
        let dir = options.artifact_dir.clone();
        let names: ArtifactNames = options.names.clone();
        let mut report = SyncReport::default();

        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "Cannot create artifact directory");
        }

        let mut unavailable: Option<String> = None;

        for (kind, name) in names.all() {
            let target = dir.join(name);

            let result = match &unavailable {
                Some(reason) => Err(reason.clone()),
                None => match self.fetch_to_disk(name, &target).await {
                    Ok(bytes) => Ok(bytes),
                    Err(e) => {
                        if matches!(e, StoreError::MissingCredentials(_)) {
                            unavailable = Some(e.to_string());
                        }
                        Err(e.to_string())
                    }
                },
            };

            let outcome = match result {
                Ok(bytes) => {
                    info!(artifact = %name, bytes = bytes, "Artifact synced from remote store");
                    SyncOutcome::Fetched { bytes }
                }
                Err(reason) if target.is_file() => {
                    warn!(artifact = %name, reason = %reason, "Sync failed, using local copy");
                    SyncOutcome::KeptLocal { reason }
                }
                Err(reason) => {
                    if kind.is_required() {
                        warn!(artifact = %name, reason = %reason, "Sync failed and no local copy exists");
                    } else {
                        debug!(artifact = %name, reason = %reason, "Optional artifact unavailable");
                    }
                    SyncOutcome::Missing { reason }
                }
            };

            report.outcomes.push((kind, outcome));
        }

        report
    }

    async fn fetch_to_disk(&self, name: &str, target: &Path) -> Result<usize, StoreError> {
        let bytes = tokio::time::timeout(self.fetch_timeout, self.store.fetch(name))
            .await
            .map_err(|_| StoreError::Timeout(name.to_string(), self.fetch_timeout))??;

        let partial = partial_path(target);
        tokio::fs::write(&partial, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&partial, target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(bytes.len())
    }

    async fn load_registry(&self) -> RegistryState {
        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || registry.load()).await {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Registry load task aborted");
                self.registry.state()
            }
        }
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}
