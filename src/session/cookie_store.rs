//! Session cookies that survive restarts.
//!
//! [`CookieStore`] is handed to reqwest as its cookie provider, so every
//! `Set-Cookie` the portal sends (including ones on redirect hops) lands here.
//! Persistence is a small versioned JSON document of name/value/domain/path
//! records. Expiry is only honoured on arrival: a cookie that is already
//! expired removes its stored counterpart, anything else is kept until the
//! login probe fails and a fresh login replaces it.

use cookie::time::OffsetDateTime;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use url::Url;

use crate::error::CookieStoreError;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

impl StoredCookie {
    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        domain_matches(host, &self.domain) && path_matches(url.path(), &self.path)
    }
}

#[derive(Serialize, Deserialize)]
struct CookieFile {
    version: u32,
    cookies: Vec<StoredCookie>,
}

pub struct CookieStore {
    path: PathBuf,
    cookies: RwLock<Vec<StoredCookie>>,
}

impl CookieStore {
    /// Loads `path` if it exists; a missing file is an empty jar.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CookieStoreError> {
        let path = path.into();
        let cookies = if path.exists() {
            load(&path)?
        } else {
            log::info!("no cookie file at {}, starting with an empty jar", path.display());
            Vec::new()
        };

        Ok(Self {
            path,
            cookies: RwLock::new(cookies),
        })
    }

    pub fn save(&self) -> Result<(), CookieStoreError> {
        let document = CookieFile {
            version: FORMAT_VERSION,
            cookies: self.read().clone(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|source| {
            CookieStoreError::Malformed {
                path: self.path.display().to_string(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CookieStoreError::Write {
                path: self.path.display().to_string(),
                source,
            })?;
        }
        fs::write(&self.path, json).map_err(|source| CookieStoreError::Write {
            path: self.path.display().to_string(),
            source,
        })?;
        log::info!(
            "saved {} cookie(s) to {}",
            document.cookies.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Empties the jar and removes the persisted file.
    pub fn clear(&self) -> Result<(), CookieStoreError> {
        self.write().clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("cleared cookies and deleted {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CookieStoreError::Write {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }

    pub fn add_cookie(&self, name: &str, value: &str, domain: &str, path: &str) {
        self.upsert(StoredCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: normalize_domain(domain),
            path: if path.is_empty() { "/".into() } else { path.to_string() },
        });
    }

    pub fn stored_cookies(&self) -> Vec<StoredCookie> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn upsert(&self, cookie: StoredCookie) {
        let mut jar = self.write();
        match jar.iter_mut().find(|existing| {
            existing.name == cookie.name
                && existing.domain == cookie.domain
                && existing.path == cookie.path
        }) {
            Some(existing) => existing.value = cookie.value,
            None => jar.push(cookie),
        }
    }

    fn remove(&self, name: &str, domain: &str, path: &str) {
        self.write()
            .retain(|c| !(c.name == name && c.domain == domain && c.path == path));
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<StoredCookie>> {
        self.cookies.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<StoredCookie>> {
        self.cookies.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl reqwest::cookie::CookieStore for CookieStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            let parsed = match cookie::Cookie::parse(raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::debug!("ignoring unparseable Set-Cookie from {url}: {err}");
                    continue;
                }
            };

            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            let domain = match parsed.domain() {
                Some(domain) => normalize_domain(domain),
                None => host.clone(),
            };
            if !domain_matches(&host, &domain) {
                log::debug!("ignoring cookie '{}' for foreign domain {domain}", parsed.name());
                continue;
            }
            let path = match parsed.path() {
                Some(path) if path.starts_with('/') => path.to_string(),
                _ => default_path(url),
            };

            let expired = match parsed.max_age() {
                Some(age) => !age.is_positive(),
                None => parsed
                    .expires_datetime()
                    .is_some_and(|at| at <= OffsetDateTime::now_utc()),
            };
            if expired {
                self.remove(parsed.name(), &domain, &path);
            } else {
                self.upsert(StoredCookie {
                    name: parsed.name().to_string(),
                    value: parsed.value().to_string(),
                    domain,
                    path,
                });
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .read()
            .iter()
            .filter(|cookie| cookie.matches(url))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            HeaderValue::from_str(&header).ok()
        }
    }
}

fn load(path: &Path) -> Result<Vec<StoredCookie>, CookieStoreError> {
    let json = fs::read_to_string(path).map_err(|source| CookieStoreError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let document: CookieFile =
        serde_json::from_str(&json).map_err(|source| CookieStoreError::Malformed {
            path: path.display().to_string(),
            source,
        })?;
    if document.version != FORMAT_VERSION {
        return Err(CookieStoreError::UnsupportedVersion(document.version));
    }
    log::info!("loaded {} cookie(s) from {}", document.cookies.len(), path.display());
    Ok(document.cookies)
}

fn normalize_domain(domain: &str) -> String {
    domain.trim_start_matches('.').to_ascii_lowercase()
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// RFC 6265 default-path: the request path up to its last `/`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".into(),
        Some(idx) => path[..idx].to_string(),
    }
}
