// src/middleware/auth.rs
// HTTP Basic authentication for the whole site

use actix_web::{dev::ServiceRequest, web, Error};
use actix_web_httpauth::extractors::{
    basic::{BasicAuth, Config},
    AuthenticationError,
};

pub const REALM: &str = "Authorization Required";

/// The single user/password pair accepted when `basic` is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub user: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn matches(&self, user: &str, password: &str) -> bool {
        // Evaluate both sides so a wrong user costs the same as a wrong password
        let user_ok = constant_time_eq(self.user.as_bytes(), user.as_bytes());
        let password_ok = constant_time_eq(self.password.as_bytes(), password.as_bytes());
        user_ok & password_ok
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Challenge configuration to register as app data next to the middleware.
pub fn challenge() -> Config {
    Config::default().realm(REALM)
}

/// Validator for `HttpAuthentication::basic`.
pub async fn validate_credentials(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let accepted = req
        .app_data::<web::Data<BasicCredentials>>()
        .map_or(false, |expected| {
            expected.matches(credentials.user_id(), credentials.password().unwrap_or(""))
        });

    if accepted {
        return Ok(req);
    }

    log::debug!("rejected credentials for user {:?}", credentials.user_id());
    let config = req.app_data::<Config>().cloned().unwrap_or_else(challenge);
    Err((AuthenticationError::from(config).into(), req))
}
