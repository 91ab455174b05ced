// src/serve/error.rs
// Filesystem failures translated into the handful of outcomes a client may see

use actix_web::http::StatusCode;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeError {
    NotFound,
    Forbidden,
    InvalidInput,
    Internal,
}

impl ServeError {
    /// Classify an I/O error. The error text itself is only ever logged.
    pub fn from_io(err: &io::Error) -> Self {
        log::debug!("filesystem error: {}", err);
        match err.kind() {
            // A file used as a directory (`/a.txt/child`) does not exist either
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => ServeError::NotFound,
            io::ErrorKind::PermissionDenied => ServeError::Forbidden,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ServeError::InvalidInput,
            _ => ServeError::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServeError::NotFound => StatusCode::NOT_FOUND,
            ServeError::Forbidden => StatusCode::FORBIDDEN,
            ServeError::InvalidInput => StatusCode::BAD_REQUEST,
            ServeError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message key, also the English text of the response body.
    pub fn message(&self) -> &'static str {
        match self {
            ServeError::NotFound => "404 page not found",
            ServeError::Forbidden => "403 Forbidden",
            ServeError::InvalidInput => "400 Bad Request",
            ServeError::Internal => "500 Internal Server Error",
        }
    }
}

impl std::fmt::Display for ServeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServeError {}

impl From<io::Error> for ServeError {
    fn from(err: io::Error) -> Self {
        ServeError::from_io(&err)
    }
}
