// src/middleware/mod.rs
// Request pipeline stages wrapped around the file server

pub mod access_log;
pub mod auth;
pub mod cors;
pub mod locale;
pub mod rate_limit;
pub mod referer;

use regex::Regex;
use std::sync::OnceLock;

pub use access_log::AccessLog;
pub use auth::BasicCredentials;
pub use locale::LocaleNegotiation;
pub use rate_limit::RateLimit;
pub use referer::RefererFilter;

static LOCALHOST_URL: OnceLock<Option<Regex>> = OnceLock::new();

/// `http(s)://localhost`, `127.0.0.1` or `[::1]`, any port, any path.
pub fn is_localhost_url(url: &str) -> bool {
    LOCALHOST_URL
        .get_or_init(|| {
            Regex::new(r"^(?i)https?://(localhost|127\.0\.0\.1|\[::1\])(:\d{1,5})?(/.*)?$").ok()
        })
        .as_ref()
        .map_or(false, |pattern| pattern.is_match(url))
}
