// src/middleware/cors.rs
// CORS policy: only pages served from the local machine may call in

use actix_cors::Cors;
use actix_web::http::{header, Method};

use super::is_localhost_url;

pub const MAX_AGE_SECS: usize = 86_400;

pub fn localhost_cors() -> Cors {
    Cors::default()
        .allowed_origin_fn(|origin, _req_head| {
            origin.to_str().map_or(false, is_localhost_url)
        })
        .allowed_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allowed_headers(vec![
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            header::HeaderName::from_static("x-csrf-token"),
            header::AUTHORIZATION,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH])
        .supports_credentials()
        .max_age(MAX_AGE_SECS)
}
