// src/serve/content.rs
// Serving one file body: content type, preconditions, single byte ranges, streaming

use actix_files::HttpRange;
use actix_web::body::SizedStream;
use actix_web::http::header;
use actix_web::http::Method;
use actix_web::{HttpRequest, HttpResponse};
use std::io::SeekFrom;
use std::path::Path;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::conditional::{self, Condition};
use super::error::ServeError;

/// Media that is already compressed; compressing it again only burns CPU.
const PRECOMPRESSED_EXTENSIONS: &[&str] = &[
    "png", "gif", "jpeg", "jpg", "bmp", "webp", // images
    "mp3", "ogg", "wav", "wma", // audio
    "3gp", "avi", "flv", "mkv", "mov", "mp4", "rmvb", "vob", "webm", "wmv", // video
    "exe", "msi", "apk", "pkg", "dmg", "ipa", "deb", "rpm", "flatpak", "snap", "appimage",
    "rar", "zip", "tar", "gz", "7z", "xz", "bz2", "iso", "jar",
];

/// What the primitive needs to know about the entity besides its bytes.
#[derive(Debug, Clone)]
pub struct ContentMeta<'a> {
    pub name: &'a str,
    pub modified: Option<SystemTime>,
    pub size: u64,
    pub etag: Option<String>,
    /// Mark the response `Content-Encoding: identity` so it is sent as-is
    pub skip_compression: bool,
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn content_type_for(name: &str) -> String {
    let mime = match extension(name) {
        Some(ext) => actix_files::file_extension_to_mime(&ext),
        None => mime::APPLICATION_OCTET_STREAM,
    };

    let textual = mime.type_() == mime::TEXT
        || mime.subtype() == mime::JAVASCRIPT
        || mime.subtype() == mime::JSON;
    if textual && mime.get_param(mime::CHARSET).is_none() {
        format!("{}; charset=utf-8", mime)
    } else {
        mime.to_string()
    }
}

pub fn is_precompressed(name: &str) -> bool {
    extension(name)
        .map(|ext| PRECOMPRESSED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Respond with the entity behind `reader`, honouring conditional and
/// range headers. Only a failing seek is reported as an error.
pub async fn serve_content<R>(
    req: &HttpRequest,
    meta: ContentMeta<'_>,
    mut reader: R,
) -> Result<HttpResponse, ServeError>
where
    R: AsyncRead + AsyncSeek + Unpin + 'static,
{
    let etag = meta.etag.as_deref();
    let last_modified = conditional::last_modified_value(meta.modified);

    if conditional::check_if_unmodified_since(req, meta.modified) == Condition::False {
        return Ok(HttpResponse::PreconditionFailed().finish());
    }

    match conditional::check_if_none_match(req, etag) {
        Condition::False => {
            if req.method() == Method::GET || req.method() == Method::HEAD {
                return Ok(conditional::not_modified(etag, last_modified.as_deref()));
            }
            return Ok(HttpResponse::PreconditionFailed().finish());
        }
        Condition::None => {
            if conditional::check_if_modified_since(req, meta.modified) == Condition::False {
                return Ok(conditional::not_modified(etag, last_modified.as_deref()));
            }
        }
        Condition::True => {}
    }

    let mut offset = 0;
    let mut length = meta.size;
    let mut response = HttpResponse::Ok();

    let range_header = req
        .headers()
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    if let Some(range) = range_header {
        if conditional::check_if_range(req, etag, meta.modified) {
            match HttpRange::parse(range, meta.size) {
                Ok(ranges) if ranges.len() == 1 => {
                    offset = ranges[0].start;
                    length = ranges[0].length;
                    response = HttpResponse::PartialContent();
                    response.insert_header((
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", offset, offset + length - 1, meta.size),
                    ));
                }
                // Several ranges would need a multipart body; send everything
                Ok(_) => {}
                Err(_) => {
                    return Ok(HttpResponse::RangeNotSatisfiable()
                        .insert_header((header::CONTENT_RANGE, format!("bytes */{}", meta.size)))
                        .content_type("text/plain; charset=utf-8")
                        .body("requested range not satisfiable\n"));
                }
            }
        }
    }

    response.insert_header((header::CONTENT_TYPE, content_type_for(meta.name)));
    response.insert_header((header::ACCEPT_RANGES, "bytes"));
    if let Some(date) = last_modified {
        response.insert_header((header::LAST_MODIFIED, date));
    }
    if let Some(tag) = etag {
        response.insert_header((header::ETAG, tag.to_string()));
    }
    if meta.skip_compression {
        response.insert_header((header::CONTENT_ENCODING, "identity"));
    }

    if offset > 0 {
        reader
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|err| ServeError::from_io(&err))?;
    }

    let stream = ReaderStream::new(reader.take(length));
    Ok(response.body(SizedStream::new(length, stream)))
}
