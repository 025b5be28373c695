pub mod categorize;
pub mod cli;
pub mod commands;
pub mod error;
pub mod extract;
pub mod models;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod settings;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;

use refresh::{PortalSource, RefreshPipeline, StateStore};
use scheduler::Scheduler;
use session::SessionManager;
use settings::SettingsStore;

/// The long-lived components, wired together once at startup.
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub store: Arc<StateStore>,
    pub portal: Arc<PortalSource>,
    pub pipeline: Arc<RefreshPipeline>,
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(settings_path: PathBuf) -> anyhow::Result<Self> {
        let settings = SettingsStore::new(settings_path.clone())
            .with_context(|| format!("loading settings from {}", settings_path.display()))?;
        let current = settings.current();

        let session = SessionManager::new(&current.portal, &current.cookie_file)
            .context("opening cookie store")?;
        let portal = Arc::new(PortalSource::new(session));

        Ok(Self::with_portal(Arc::new(settings), portal))
    }

    pub fn with_portal(settings: Arc<SettingsStore>, portal: Arc<PortalSource>) -> Self {
        let store = Arc::new(StateStore::new());
        let pipeline = Arc::new(RefreshPipeline::new(
            portal.clone(),
            Arc::clone(&settings),
            Arc::clone(&store),
        ));
        let scheduler = Scheduler::new(Arc::clone(&pipeline));

        Self {
            settings,
            store,
            portal,
            pipeline,
            scheduler,
        }
    }

    /// Saves cookies and drops the HTTP connection pool.
    pub async fn close_session(&self) {
        if let Err(err) = self.portal.session().await.close() {
            log::warn!("failed to persist cookies on close: {err}");
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("equipsync {} starting up...", env!("CARGO_PKG_VERSION"));

    cli::execute(cli::Cli::parse()).await
}
