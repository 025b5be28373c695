use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde::Serialize;
use tokio::{
    sync::{Mutex, MutexGuard},
    task::JoinHandle,
};

use crate::{
    categorize::categorize,
    error::RefreshError,
    extract::extract_table,
    models::Snapshot,
    session::{LoginRequest, SessionManager},
    settings::{Settings, SettingsStore},
};

use super::{
    state::{FlightGuard, RefreshFailure, RefreshState, RefreshStatus},
    store::StateStore,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Where a cycle gets the page holding the equipment grid.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, settings: &Settings) -> Result<String, RefreshError>;
}

/// The live portal, reached through the exclusive [`SessionManager`].
pub struct PortalSource {
    session: Mutex<SessionManager>,
}

impl PortalSource {
    pub fn new(session: SessionManager) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    pub async fn session(&self) -> MutexGuard<'_, SessionManager> {
        self.session.lock().await
    }
}

#[async_trait]
impl PageSource for PortalSource {
    async fn fetch_page(&self, settings: &Settings) -> Result<String, RefreshError> {
        let credentials = settings.require_credentials()?;
        let mut session = self.session.lock().await;
        session.set_credentials(Some(LoginRequest::from_settings(
            &settings.portal,
            &credentials,
        )));
        Ok(session.fetch_authenticated(&settings.portal.data_url).await?)
    }
}

/// What a manual trigger did.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshAck {
    RefreshStarted,
    /// A cycle was already running; this trigger was dropped.
    RefreshInProgress,
}

/// One fetch, extract, categorize, publish cycle at a time.
pub struct RefreshPipeline {
    source: Arc<dyn PageSource>,
    settings: Arc<SettingsStore>,
    store: Arc<StateStore>,
    state: Arc<RefreshState>,
    worker: StdMutex<Option<JoinHandle<()>>>,
}

impl RefreshPipeline {
    pub fn new(
        source: Arc<dyn PageSource>,
        settings: Arc<SettingsStore>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            source,
            settings,
            store,
            state: Arc::new(RefreshState::default()),
            worker: StdMutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn status(&self) -> RefreshStatus {
        self.state.status()
    }

    pub fn last_error(&self) -> Option<RefreshFailure> {
        self.state.last_error()
    }

    /// Starts a cycle on a worker task and returns at once. Dropped if a
    /// cycle is already running.
    pub fn trigger(self: &Arc<Self>) -> RefreshAck {
        let Some(guard) = self.state.try_begin() else {
            log_info!("refresh already in progress, trigger dropped");
            return RefreshAck::RefreshInProgress;
        };

        let mut worker = self.worker_slot();
        let pipeline = Arc::clone(self);
        *worker = Some(tokio::spawn(async move {
            let _ = pipeline.run_cycle(guard).await;
        }));
        RefreshAck::RefreshStarted
    }

    /// Runs a cycle on the calling task. `None` if one is already running.
    pub async fn run_once(&self) -> Option<Result<Arc<Snapshot>, RefreshError>> {
        let guard = self.state.try_begin()?;
        Some(self.run_cycle(guard).await)
    }

    /// Waits up to `grace` for a spawned cycle, then abandons it. An abandoned
    /// cycle never published, so the store keeps its last complete snapshot.
    pub async fn finish(&self, grace: Duration) {
        let Some(mut handle) = self.worker_slot().take() else {
            return;
        };
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            log_warn!("refresh still running after {:?}, abandoning it", grace);
            handle.abort();
        }
    }

    async fn run_cycle(&self, _guard: FlightGuard) -> Result<Arc<Snapshot>, RefreshError> {
        log_info!("refresh cycle started");
        match self.execute().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                if !self.store.publish(Arc::clone(&snapshot)) {
                    log_warn!(
                        "snapshot v{} not newer than the current one, not published",
                        snapshot.version
                    );
                }
                self.state.record_success();
                log_info!(
                    "refresh cycle published v{}: {} instruments, {} docking stations",
                    snapshot.version,
                    snapshot.instruments.len(),
                    snapshot.docking_stations.len()
                );
                Ok(snapshot)
            }
            Err(err) => {
                log_error!("refresh cycle failed ({:?}): {err}", err.kind());
                self.state.record_failure(RefreshFailure::from_error(&err));
                Err(err)
            }
        }
    }

    async fn execute(&self) -> Result<Snapshot, RefreshError> {
        let settings = self.settings.current();
        settings.require_credentials()?;
        settings.portal.validate()?;

        let html = self.source.fetch_page(&settings).await?;
        let rows = extract_table(&html, &settings.portal.table_id)?;
        let categorized = categorize(rows, &settings.fields, Local::now().naive_local());

        let previous = self.store.read();
        Ok(Snapshot {
            instruments: categorized.instruments,
            docking_stations: categorized.docking_stations,
            last_update: Some(Utc::now()),
            version: previous.version + 1,
        })
    }

    fn worker_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
