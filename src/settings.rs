use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use url::Url;

use crate::error::ConfigError;

pub const USERNAME_ENV: &str = "EQUIPSYNC_USERNAME";
pub const PASSWORD_ENV: &str = "EQUIPSYNC_PASSWORD";

/// Where the portal lives and what its login form calls things.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalSettings {
    pub login_url: String,
    /// A protected page used to test whether the session is still alive.
    pub probe_url: String,
    /// The page carrying the equipment grid.
    pub data_url: String,
    pub username_field: String,
    pub password_field: String,
    pub submit_field: Option<String>,
    pub table_id: String,
    pub login_marker: String,
    pub accept_invalid_certs: bool,
    pub timeout_secs: u64,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            login_url: "https://inet.indsci.com/Login.aspx".into(),
            probe_url: "https://inet.indsci.com/Dashboard/LandingPage.aspx".into(),
            data_url: "https://inet.indsci.com/Dashboard/EquipmentList.aspx".into(),
            username_field: "ctl00$cph1$main$Login1$UserName".into(),
            password_field: "ctl00$cph1$main$Login1$Password".into(),
            submit_field: Some("ctl00$cph1$main$Login1$LoginButton".into()),
            table_id: "ctl00_ctl00_ctl00_cph1_main_dr_Grid_DXMainTable".into(),
            login_marker: "login".into(),
            accept_invalid_certs: false,
            timeout_secs: 30,
        }
    }
}

impl PortalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("portal.loginUrl", &self.login_url),
            ("portal.probeUrl", &self.probe_url),
            ("portal.dataUrl", &self.data_url),
        ] {
            if Url::parse(value).is_err() {
                return Err(ConfigError::InvalidUrl {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

/// Header names the categorizer looks records up by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldNames {
    pub category: String,
    pub calibration_date: String,
    pub equipment_group: String,
    pub equipment_type: String,
    pub serial_number: String,
    pub currently_docked: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            category: "Category".into(),
            calibration_date: "Next Calibration Date".into(),
            equipment_group: "Equipment Group".into(),
            equipment_type: "Type".into(),
            serial_number: "Serial Number".into(),
            currently_docked: "Instrument Currently Docked".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub portal: PortalSettings,
    pub credentials: Credentials,
    pub refresh_interval_minutes: u64,
    pub cookie_file: PathBuf,
    pub fields: FieldNames,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            portal: PortalSettings::default(),
            credentials: Credentials::default(),
            refresh_interval_minutes: 60,
            cookie_file: PathBuf::from("portal_cookies.json"),
            fields: FieldNames::default(),
        }
    }
}

impl Settings {
    pub fn refresh_interval(&self) -> Result<Duration, ConfigError> {
        validate_interval(self.refresh_interval_minutes)
    }

    /// Credentials from the environment win over the file.
    pub fn resolved_credentials(&self) -> Credentials {
        let mut creds = self.credentials.clone();
        if let Ok(username) = std::env::var(USERNAME_ENV) {
            if !username.trim().is_empty() {
                creds.username = username;
            }
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                creds.password = password;
            }
        }
        creds
    }

    pub fn require_credentials(&self) -> Result<Credentials, ConfigError> {
        let creds = self.resolved_credentials();
        if creds.is_complete() {
            Ok(creds)
        } else {
            Err(ConfigError::MissingCredentials)
        }
    }
}

pub fn validate_interval(minutes: u64) -> Result<Duration, ConfigError> {
    if minutes == 0 {
        return Err(ConfigError::InvalidInterval(minutes));
    }
    Ok(Duration::from_secs(minutes * 60))
}

/// Changes an operator can make while the service runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_interval_minutes: Option<u64>,
}

impl SettingsUpdate {
    pub fn touches_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            || self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self, ConfigError> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// In-memory store, never written to disk until `update` is called.
    pub fn with_settings(path: PathBuf, settings: Settings) -> Self {
        Self {
            path,
            data: RwLock::new(settings),
        }
    }

    pub fn current(&self) -> Settings {
        self.read().clone()
    }

    pub fn update(&self, update: &SettingsUpdate) -> Result<Settings, ConfigError> {
        if let Some(minutes) = update.refresh_interval_minutes {
            validate_interval(minutes)?;
        }

        let mut guard = self.write();
        let mut next = guard.clone();
        if let Some(username) = &update.username {
            next.credentials.username = username.clone();
        }
        if let Some(password) = update.password.as_ref().filter(|p| !p.is_empty()) {
            next.credentials.password = password.clone();
        }
        if let Some(minutes) = update.refresh_interval_minutes {
            next.refresh_interval_minutes = minutes;
        }

        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn reload(&self) -> Result<(), ConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let data: Settings =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: self.path.display().to_string(),
                source,
            })?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<(), ConfigError> {
        let serialized = serde_json::to_string_pretty(data).map_err(|source| ConfigError::Parse {
            path: self.path.display().to_string(),
            source,
        })?;
        fs::write(&self.path, serialized).map_err(|source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
