// src/serve/resolve.rs
// URL path -> filesystem target, with the canonical-redirect rules of a classic static file server

use std::fs::File;
use std::path::PathBuf;
use std::time::SystemTime;

use super::error::ServeError;
use super::root::{OpenedEntry, ServeRoot};

pub const INDEX_PAGE: &str = "index.html";

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// Substitute `index.html` for directories and redirect explicit `/index.html` requests
    pub preview_html: bool,
    pub follow_symlinks: bool,
}

/// Outcome of resolving a request path.
#[derive(Debug)]
pub enum Resolution {
    Target(ResolvedTarget),
    /// 301 to this relative location (query string already appended)
    Redirect(String),
}

/// An opened file or directory, valid for one request.
#[derive(Debug)]
pub struct ResolvedTarget {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
    pub size: u64,
    pub file: File,
}

impl ResolvedTarget {
    fn from_entry(entry: OpenedEntry) -> Self {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ResolvedTarget {
            is_dir: entry.metadata.is_dir(),
            modified: entry.metadata.modified().ok(),
            size: entry.metadata.len(),
            name,
            path: entry.path,
            file: entry.file,
        }
    }
}

/// Lexically clean a slash-rooted path: collapse repeated separators and
/// resolve `.` and `..` without ever climbing above `/`. The result never
/// ends in a slash unless it is the root itself.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut cleaned = String::with_capacity(path.len());
    for segment in segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    cleaned
}

/// Last element of a slash-separated path, ignoring trailing slashes.
fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

fn with_query(location: String, query: &str) -> String {
    if query.is_empty() {
        location
    } else {
        format!("{}?{}", location, query)
    }
}

/// Resolve a decoded request path against the root.
///
/// Redirect decisions look at the path as the client sent it, lookups use
/// the cleaned path. Directory slash normalization is decided before index
/// substitution.
pub fn resolve(
    raw_path: &str,
    query: &str,
    root: &ServeRoot,
    options: ResolveOptions,
) -> Result<Resolution, ServeError> {
    let url_path = if raw_path.starts_with('/') {
        raw_path.to_string()
    } else {
        format!("/{}", raw_path)
    };

    if options.preview_html && url_path.ends_with(&format!("/{}", INDEX_PAGE)) {
        return Ok(Resolution::Redirect(with_query("./".to_string(), query)));
    }

    let name = clean_path(&url_path);
    let entry = root.open(&name, options.follow_symlinks)?;
    let is_dir = entry.metadata.is_dir();

    if is_dir && !url_path.ends_with('/') {
        let location = format!("{}/", base_name(&url_path));
        return Ok(Resolution::Redirect(with_query(location, query)));
    }
    if !is_dir && url_path.ends_with('/') {
        let location = format!("../{}", base_name(&url_path));
        return Ok(Resolution::Redirect(with_query(location, query)));
    }

    let mut target = ResolvedTarget::from_entry(entry);

    if target.is_dir && options.preview_html {
        let index = format!("{}/{}", name.trim_end_matches('/'), INDEX_PAGE);
        match root.open(&index, options.follow_symlinks) {
            Ok(index_entry) => target = ResolvedTarget::from_entry(index_entry),
            Err(err) => log::trace!("no index for {}: {}", name, err),
        }
    }

    Ok(Resolution::Target(target))
}
