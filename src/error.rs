use serde::Serialize;
use thiserror::Error;

/// Coarse classification surfaced through the health/status query.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Network,
    Auth,
    Parse,
    Config,
}

#[derive(Debug, Error)]
pub enum CookieStoreError {
    #[error("failed to read cookie file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write cookie file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cookie file {path} is malformed: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported cookie file version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Error)]
#[error("authentication probe against {url} failed: {source}")]
pub struct AuthProbeError {
    pub url: String,
    #[source]
    pub source: reqwest::Error,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("could not fetch login page {url}: {reason}")]
    FetchFailed { url: String, reason: String },
    #[error("login request to {url} timed out")]
    Timeout { url: String },
    #[error("login page has no <form> element")]
    NoForm,
    #[error("portal rejected the credentials (landed on {final_url})")]
    RejectedCredentials { final_url: String },
    #[error("invalid login url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("portal session is not authenticated: {0}")]
    AuthRequired(String),
}

impl LoginError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LoginError::Timeout {
                url: url.to_string(),
            }
        } else {
            LoginError::FetchFailed {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("table '{0}' not found in document")]
    TableNotFound(String),
    #[error("header row not found in table '{0}'")]
    HeaderNotFound(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("portal credentials are not configured")]
    MissingCredentials,
    #[error("refresh interval must be at least one minute (got {0})")]
    InvalidInterval(u64),
    #[error("invalid url for {field}: '{value}'")]
    InvalidUrl { field: &'static str, value: String },
    #[error("settings file {path} could not be accessed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {path} is malformed: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Any failure that aborts a refresh cycle.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Probe(#[from] AuthProbeError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl RefreshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefreshError::Config(_) => ErrorKind::Config,
            RefreshError::Login(LoginError::FetchFailed { .. } | LoginError::Timeout { .. }) => {
                ErrorKind::Network
            }
            RefreshError::Login(LoginError::InvalidUrl { .. }) => ErrorKind::Config,
            RefreshError::Login(_) => ErrorKind::Auth,
            RefreshError::Fetch(FetchError::AuthRequired(_)) => ErrorKind::Auth,
            RefreshError::Fetch(_) => ErrorKind::Network,
            RefreshError::Probe(_) => ErrorKind::Network,
            RefreshError::Extract(_) => ErrorKind::Parse,
        }
    }
}
