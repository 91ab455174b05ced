// src/serve/mod.rs
// The file server: method dispatch, resolution, file delivery and directory listings

pub mod conditional;
pub mod content;
pub mod error;
pub mod listing;
pub mod resolve;
pub mod root;
pub mod throttle;

use actix_web::http::{header, Method};
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::config::{AppConfig, ConfigStore};
use crate::i18n::{self, Locale};
use conditional::Condition;
use content::ContentMeta;
use error::ServeError;
use listing::ListingOptions;
use resolve::{Resolution, ResolveOptions, ResolvedTarget};
use root::ServeRoot;
use throttle::ThrottledReader;

pub const ALLOWED_METHODS: &str = "OPTIONS, GET, HEAD";
pub const READ_ONLY: &str = "read-only";

/// Shared state of the default service. The root is fixed for the process
/// lifetime, the settings are re-read from the store on every request.
pub struct FileServer {
    root: Arc<ServeRoot>,
    config: ConfigStore,
}

impl FileServer {
    pub fn new(root: ServeRoot, config: ConfigStore) -> Self {
        Self {
            root: Arc::new(root),
            config,
        }
    }

    pub fn root(&self) -> &ServeRoot {
        &self.root
    }
}

/// Plain-text error page; never includes filesystem details.
pub fn error_response(err: ServeError, locale: Locale) -> HttpResponse {
    HttpResponse::build(err.status_code())
        .content_type("text/plain; charset=utf-8")
        .insert_header((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .body(format!("{}\n", i18n::translate(locale, err.message())))
}

fn redirect(location: String) -> HttpResponse {
    HttpResponse::MovedPermanently()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub async fn handle(req: HttpRequest, server: web::Data<FileServer>) -> HttpResponse {
    let method = req.method();
    if method == Method::GET || method == Method::HEAD {
        return serve(&req, &server).await;
    }
    if method == Method::OPTIONS {
        return HttpResponse::Ok()
            .insert_header((header::ALLOW, ALLOWED_METHODS))
            .finish();
    }

    let locale = Locale::of(&req);
    HttpResponse::MethodNotAllowed()
        .insert_header((header::ALLOW, ALLOWED_METHODS))
        .content_type("text/plain; charset=utf-8")
        .body(format!("{}\n", i18n::translate(locale, READ_ONLY)))
}

async fn serve(req: &HttpRequest, server: &FileServer) -> HttpResponse {
    let locale = Locale::of(req);
    let config = server.config.snapshot();

    let raw_path = match urlencoding::decode(req.path()) {
        Ok(path) => path.into_owned(),
        Err(_) => return error_response(ServeError::InvalidInput, locale),
    };
    let query = req.query_string().to_string();
    let options = ResolveOptions {
        preview_html: config.preview_html,
        follow_symlinks: config.follow_symlinks,
    };

    let root = Arc::clone(&server.root);
    let resolution =
        web::block(move || resolve::resolve(&raw_path, &query, &root, options)).await;

    let target = match resolution {
        Ok(Ok(Resolution::Target(target))) => target,
        Ok(Ok(Resolution::Redirect(location))) => return redirect(location),
        Ok(Err(err)) => return error_response(err, locale),
        Err(err) => {
            log::error!("resolve task failed: {}", err);
            return error_response(ServeError::Internal, locale);
        }
    };

    if target.is_dir {
        respond_listing(req, server, &config, target, locale).await
    } else {
        respond_file(req, &config, target, locale).await
    }
}

async fn respond_file(
    req: &HttpRequest,
    config: &AppConfig,
    target: ResolvedTarget,
    locale: Locale,
) -> HttpResponse {
    let meta = ContentMeta {
        name: &target.name,
        modified: target.modified,
        size: target.size,
        etag: config
            .etag
            .then(|| conditional::weak_etag(target.size, target.modified)),
        skip_compression: config.gzip && content::is_precompressed(&target.name),
    };
    let file = tokio::fs::File::from_std(target.file);

    let served = match config.speed_limit() {
        Some(rate) => content::serve_content(req, meta, ThrottledReader::new(file, rate)).await,
        None => content::serve_content(req, meta, file).await,
    };

    served.unwrap_or_else(|err| error_response(err, locale))
}

async fn respond_listing(
    req: &HttpRequest,
    server: &FileServer,
    config: &AppConfig,
    target: ResolvedTarget,
    locale: Locale,
) -> HttpResponse {
    let last_modified = conditional::last_modified_value(target.modified);
    if conditional::check_if_modified_since(req, target.modified) == Condition::False {
        return conditional::not_modified(None, last_modified.as_deref());
    }

    let root = Arc::clone(&server.root);
    let follow_symlinks = config.follow_symlinks;
    let time_format = config.autoindex_time_format.clone();
    let exact_size = config.autoindex_exact_size;
    let request_uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let rendered = web::block(move || {
        let entries = root.read_dir(&target.path, follow_symlinks).map_err(|err| {
            log::error!("reading directory {}: {}", target.path.display(), err);
            ServeError::Internal
        })?;
        let options = ListingOptions {
            time_format: &time_format,
            exact_size,
        };
        listing::render_listing(entries.as_ref(), &request_uri, options).map_err(|_| {
            log::error!("rendering listing with time format {:?}", time_format);
            ServeError::Internal
        })
    })
    .await;

    let html = match rendered {
        Ok(Ok(html)) => html,
        Ok(Err(err)) => return error_response(err, locale),
        Err(err) => {
            log::error!("listing task failed: {}", err);
            return error_response(ServeError::Internal, locale);
        }
    };

    let mut response = HttpResponse::Ok();
    response.content_type("text/html; charset=utf-8");
    if let Some(date) = last_modified {
        response.insert_header((header::LAST_MODIFIED, date));
    }
    response.body(html)
}
