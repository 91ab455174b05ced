// src/serve/conditional.rs
// HTTP preconditions: If-Modified-Since, If-Unmodified-Since, If-None-Match, If-Range

use actix_web::http::header::{self, HeaderMap, HttpDate};
use actix_web::http::Method;
use actix_web::{HttpRequest, HttpResponse};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Three-valued outcome of a precondition header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Header absent, unparseable or not applicable
    None,
    True,
    False,
}

/// Modification time truncated to whole seconds, or `None` when unknown.
///
/// The Unix epoch and anything before it count as unknown.
pub fn truncated_mtime(modified: Option<SystemTime>) -> Option<SystemTime> {
    let since_epoch = modified?.duration_since(UNIX_EPOCH).ok()?;
    if since_epoch.as_secs() == 0 {
        return None;
    }
    Some(UNIX_EPOCH + Duration::from_secs(since_epoch.as_secs()))
}

/// `Last-Modified` value in IMF-fixdate form.
pub fn last_modified_value(modified: Option<SystemTime>) -> Option<String> {
    truncated_mtime(modified).map(|t| HttpDate::from(t).to_string())
}

/// Weak validator built from size and modification time.
pub fn weak_etag(size: u64, modified: Option<SystemTime>) -> String {
    let secs = modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("W/\"{:x}-{:x}\"", size, secs)
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_time(headers: &HeaderMap, name: header::HeaderName) -> Option<SystemTime> {
    header_str(headers, name)
        .and_then(|v| v.trim().parse::<HttpDate>().ok())
        .map(SystemTime::from)
}

/// Evaluated for GET and HEAD only. `False` means "not modified".
pub fn check_if_modified_since(req: &HttpRequest, modified: Option<SystemTime>) -> Condition {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Condition::None;
    }
    let Some(since) = header_time(req.headers(), header::IF_MODIFIED_SINCE) else {
        return Condition::None;
    };
    let Some(mtime) = truncated_mtime(modified) else {
        return Condition::None;
    };
    if mtime <= since {
        Condition::False
    } else {
        Condition::True
    }
}

pub fn check_if_unmodified_since(req: &HttpRequest, modified: Option<SystemTime>) -> Condition {
    let Some(since) = header_time(req.headers(), header::IF_UNMODIFIED_SINCE) else {
        return Condition::None;
    };
    let Some(mtime) = truncated_mtime(modified) else {
        return Condition::None;
    };
    if mtime <= since {
        Condition::True
    } else {
        Condition::False
    }
}

fn opaque_tag(tag: &str) -> &str {
    tag.trim().trim_start_matches("W/")
}

/// Weak comparison against a comma-separated list of entity tags.
pub fn check_if_none_match(req: &HttpRequest, etag: Option<&str>) -> Condition {
    let Some(list) = header_str(req.headers(), header::IF_NONE_MATCH) else {
        return Condition::None;
    };
    let Some(etag) = etag else {
        return Condition::None;
    };
    if list.trim() == "*" {
        return Condition::False;
    }
    let ours = opaque_tag(etag);
    if list.split(',').any(|candidate| opaque_tag(candidate) == ours) {
        Condition::False
    } else {
        Condition::True
    }
}

/// Whether a `Range` header may be honoured given `If-Range`.
pub fn check_if_range(req: &HttpRequest, etag: Option<&str>, modified: Option<SystemTime>) -> bool {
    let Some(value) = header_str(req.headers(), header::IF_RANGE) else {
        return true;
    };
    let value = value.trim();
    if value.starts_with('"') || value.starts_with("W/") {
        // Strong comparison: weak validators never satisfy If-Range
        return match etag {
            Some(tag) => !tag.starts_with("W/") && !value.starts_with("W/") && tag == value,
            None => false,
        };
    }
    match (value.parse::<HttpDate>(), truncated_mtime(modified)) {
        (Ok(date), Some(mtime)) => SystemTime::from(date) == mtime,
        _ => false,
    }
}

/// 304 response. Entity headers are never present; `Last-Modified` is
/// dropped when an ETag carries the validator.
pub fn not_modified(etag: Option<&str>, last_modified: Option<&str>) -> HttpResponse {
    let mut response = HttpResponse::NotModified();
    match (etag, last_modified) {
        (Some(tag), _) => {
            response.insert_header((header::ETAG, tag.to_string()));
        }
        (None, Some(date)) => {
            response.insert_header((header::LAST_MODIFIED, date.to_string()));
        }
        (None, None) => {}
    }
    let mut response = response.finish();
    let headers = response.headers_mut();
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_ENCODING);
    response
}
