use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{AuthProbeError, ConfigError, CookieStoreError},
    models::Snapshot,
    refresh::{RefreshAck, RefreshFailure, RefreshStatus},
    settings::SettingsUpdate,
    AppState,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub scheduler_running: bool,
    /// True once any refresh has published a snapshot.
    pub has_equipment_data: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub refreshing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RefreshFailure>,
    pub version: u64,
}

/// What an accepted settings update changed. The password is never echoed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsApplied {
    pub username: String,
    pub refresh_interval_minutes: u64,
    pub rescheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshAck>,
}

pub fn refresh_now(state: &AppState) -> RefreshAck {
    state.scheduler.trigger_now()
}

pub fn current_snapshot(state: &AppState) -> Arc<Snapshot> {
    state.store.read()
}

pub async fn health(state: &AppState) -> HealthStatus {
    let snapshot = state.store.read();
    HealthStatus {
        status: "healthy",
        scheduler_running: state.scheduler.is_running().await,
        has_equipment_data: snapshot.version > 0,
        last_update: snapshot.last_update,
        refreshing: state.pipeline.status() == RefreshStatus::Running,
        last_error: state.pipeline.last_error(),
        version: snapshot.version,
    }
}

/// Persists the update, re-arms a running scheduler when the interval
/// changed, and starts a refresh when new credentials came in.
pub async fn update_settings(
    state: &AppState,
    update: SettingsUpdate,
) -> Result<SettingsApplied, ConfigError> {
    let before = state.settings.current();
    let after = state.settings.update(&update)?;

    let interval_changed = after.refresh_interval_minutes != before.refresh_interval_minutes;
    let rescheduled = interval_changed && state.scheduler.is_running().await;
    if rescheduled {
        state.scheduler.reschedule(after.refresh_interval()?).await;
    }

    let refresh = update
        .touches_credentials()
        .then(|| state.scheduler.trigger_now());

    log::info!(
        "settings updated: user '{}', every {} minute(s)",
        after.credentials.username,
        after.refresh_interval_minutes
    );
    Ok(SettingsApplied {
        username: after.credentials.username,
        refresh_interval_minutes: after.refresh_interval_minutes,
        rescheduled,
        refresh,
    })
}

/// Probes the portal with whatever cookies the session currently holds.
pub async fn probe_session(state: &AppState) -> Result<bool, AuthProbeError> {
    state.portal.session().await.probe_authenticated().await
}

pub async fn clear_cookies(state: &AppState) -> Result<(), CookieStoreError> {
    state.portal.session().await.cookie_store().clear()
}
