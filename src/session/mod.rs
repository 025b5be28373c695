pub mod cookie_store;
pub mod form;
pub mod manager;
pub mod probe;

pub use cookie_store::{CookieStore, StoredCookie};
pub use manager::{LoginRequest, SessionManager};
pub use probe::{AuthHeuristic, UrlMarker};
