//! Deciding whether a response means "you are not signed in".
//!
//! The portal never answers 401; an expired session is redirected back to the
//! login page. Detection therefore looks at where a request finally landed.

use url::Url;

pub trait AuthHeuristic: Send + Sync {
    /// True when a request that ended at `final_url` was bounced to sign-in.
    fn is_login_challenge(&self, final_url: &Url) -> bool;
}

/// Treats any URL on the login page, or containing a marker substring, as a
/// login challenge. The marker comparison is case-insensitive.
#[derive(Debug, Clone)]
pub struct UrlMarker {
    login_url: String,
    marker: String,
}

impl UrlMarker {
    pub fn new(login_url: &str, marker: &str) -> Self {
        Self {
            login_url: strip_query(login_url).to_ascii_lowercase(),
            marker: marker.to_ascii_lowercase(),
        }
    }
}

impl AuthHeuristic for UrlMarker {
    fn is_login_challenge(&self, final_url: &Url) -> bool {
        let landed = final_url.as_str().to_ascii_lowercase();
        (!self.login_url.is_empty() && landed.starts_with(&self.login_url))
            || (!self.marker.is_empty() && landed.contains(&self.marker))
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}
