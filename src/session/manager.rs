use std::{path::PathBuf, sync::Arc, time::Duration};

use reqwest::{Client, Response};
use url::Url;

use crate::{
    error::{AuthProbeError, CookieStoreError, FetchError, LoginError},
    settings::{Credentials, PortalSettings},
};

use super::{
    cookie_store::CookieStore,
    form::{FormMethod, LoginFields, LoginForm},
    probe::{AuthHeuristic, UrlMarker},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Everything needed to submit the portal's login form once.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub login_url: String,
    pub username_field: String,
    pub username: String,
    pub password_field: String,
    pub password: String,
    pub submit_field: Option<String>,
}

impl LoginRequest {
    pub fn from_settings(portal: &PortalSettings, credentials: &Credentials) -> Self {
        Self {
            login_url: portal.login_url.clone(),
            username_field: portal.username_field.clone(),
            username: credentials.username.clone(),
            password_field: portal.password_field.clone(),
            password: credentials.password.clone(),
            submit_field: portal.submit_field.clone().filter(|f| !f.is_empty()),
        }
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Owns the one HTTP session held against the portal.
///
/// Not meant for concurrent use: callers serialise access (the refresh
/// pipeline keeps it behind an async mutex and never overlaps cycles).
pub struct SessionManager {
    cookies: Arc<CookieStore>,
    client: Option<Client>,
    heuristic: Box<dyn AuthHeuristic>,
    probe_url: String,
    timeout: Duration,
    accept_invalid_certs: bool,
    credentials: Option<LoginRequest>,
    authenticated: bool,
}

impl SessionManager {
    pub fn new(
        portal: &PortalSettings,
        cookie_file: impl Into<PathBuf>,
    ) -> Result<Self, CookieStoreError> {
        let cookies = Arc::new(CookieStore::open(cookie_file)?);
        Ok(Self {
            cookies,
            client: None,
            heuristic: Box::new(UrlMarker::new(&portal.login_url, &portal.login_marker)),
            probe_url: portal.probe_url.clone(),
            timeout: portal.timeout(),
            accept_invalid_certs: portal.accept_invalid_certs,
            credentials: None,
            authenticated: false,
        })
    }

    pub fn with_heuristic(mut self, heuristic: Box<dyn AuthHeuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn cookie_store(&self) -> &Arc<CookieStore> {
        &self.cookies
    }

    /// Result of the most recent probe or login.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Credentials used when a fetch finds the session expired.
    pub fn set_credentials(&mut self, credentials: Option<LoginRequest>) {
        if credentials != self.credentials {
            if let Some(request) = &credentials {
                log_info!("session credentials set for user '{}'", request.username);
            }
            self.credentials = credentials;
        }
    }

    /// GETs the protected probe page and checks where it landed.
    pub async fn probe_authenticated(&mut self) -> Result<bool, AuthProbeError> {
        let url = self.probe_url.clone();
        let probe_error = |source| AuthProbeError {
            url: url.clone(),
            source,
        };

        let client = self.client().map_err(probe_error)?;
        let response = client.get(&url).send().await.map_err(probe_error)?;

        let authenticated = !self.heuristic.is_login_challenge(response.url());
        self.authenticated = authenticated;
        log_debug!(
            "session probe: {} (landed on {})",
            if authenticated { "authenticated" } else { "not authenticated" },
            response.url()
        );
        Ok(authenticated)
    }

    /// Runs the form login handshake and persists cookies on success. The
    /// request is kept for later re-logins whether or not it succeeds.
    pub async fn login(&mut self, request: &LoginRequest) -> Result<(), LoginError> {
        self.credentials = Some(request.clone());
        self.authenticated = false;

        let login_url = Url::parse(&request.login_url).map_err(|source| LoginError::InvalidUrl {
            url: request.login_url.clone(),
            source,
        })?;
        let fetch_failed = |err: reqwest::Error| LoginError::from_reqwest(&request.login_url, err);

        let client = self.client().map_err(fetch_failed)?;
        let page = client
            .get(login_url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(fetch_failed)?;
        let page_url = page.url().clone();
        let html = page.text().await.map_err(fetch_failed)?;

        let form = LoginForm::parse(&html)?;
        let target = form.submit_url(&page_url)?;
        let payload = form.payload(&LoginFields {
            username_field: &request.username_field,
            username: &request.username,
            password_field: &request.password_field,
            password: &request.password,
            submit_field: request.submit_field.as_deref(),
        });

        log_info!(
            "submitting login for '{}' ({} hidden field(s)) to {}",
            request.username,
            form.hidden_fields.len(),
            target
        );
        let submit = match form.method {
            FormMethod::Get => client.get(target).query(&payload),
            FormMethod::Post => client.post(target).form(&payload),
        };
        let response = submit
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(fetch_failed)?;

        let final_url = response.url().clone();
        if self.heuristic.is_login_challenge(&final_url) {
            log_warn!("login for '{}' rejected, still on {}", request.username, final_url);
            return Err(LoginError::RejectedCredentials {
                final_url: final_url.to_string(),
            });
        }

        self.authenticated = true;
        log_info!("login for '{}' succeeded, landed on {}", request.username, final_url);
        if let Err(err) = self.cookies.save() {
            log_warn!("login succeeded but cookies could not be saved: {err}");
        }
        Ok(())
    }

    /// GETs `url` with a live session, logging in again first if the probe
    /// says the session has lapsed.
    pub async fn fetch_authenticated(&mut self, url: &str) -> Result<String, FetchError> {
        match self.probe_authenticated().await {
            Ok(true) => {}
            Ok(false) => self.relogin().await?,
            Err(err) => return Err(FetchError::from_reqwest(&err.url, err.source)),
        }

        let client = self
            .client()
            .map_err(|err| FetchError::from_reqwest(url, err))?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if self.heuristic.is_login_challenge(response.url()) {
            self.authenticated = false;
            return Err(FetchError::AuthRequired(format!(
                "{url} redirected to the login page after authenticating"
            )));
        }

        response
            .text()
            .await
            .map_err(|err| FetchError::from_reqwest(url, err))
    }

    /// Saves cookies and drops the connection pool. A later call rebuilds it.
    pub fn close(&mut self) -> Result<(), CookieStoreError> {
        self.authenticated = false;
        if self.client.take().is_some() {
            log_info!("session closed");
        }
        self.cookies.save()
    }

    async fn relogin(&mut self) -> Result<(), FetchError> {
        let Some(request) = self.credentials.clone() else {
            return Err(FetchError::AuthRequired(
                "session expired and no credentials are configured".into(),
            ));
        };

        log_info!("session expired, logging in again as '{}'", request.username);
        match self.login(&request).await {
            Ok(()) => Ok(()),
            Err(LoginError::FetchFailed { url, reason }) => {
                Err(FetchError::Network { url, reason })
            }
            Err(LoginError::Timeout { url }) => Err(FetchError::Timeout { url }),
            Err(err) => Err(FetchError::AuthRequired(format!("re-login failed: {err}"))),
        }
    }

    fn client(&mut self) -> Result<Client, reqwest::Error> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .cookie_provider(Arc::clone(&self.cookies))
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()?;
        self.client = Some(client.clone());
        Ok(client)
    }
}
