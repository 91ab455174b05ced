// src/middleware/rate_limit.rs
// Fixed-window request limiting per client IP ("<limit>-<S|M|H|D>")

use actix_web::{
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::i18n::{self, Locale};

pub const LIMIT_EXCEEDED: &str = "Too many requests, Please try again later.";

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Clients tracked before expired windows are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateParseError(String);

impl std::fmt::Display for RateParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid rate {:?}, expected <limit>-<S|M|H|D>", self.0)
    }
}

impl std::error::Error for RateParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub limit: u64,
    pub period: Duration,
}

impl Rate {
    pub fn parse(formatted: &str) -> Result<Rate, RateParseError> {
        let err = || RateParseError(formatted.to_string());
        let (limit, period) = formatted.trim().split_once('-').ok_or_else(err)?;

        let limit: u64 = limit.trim().parse().map_err(|_| err())?;
        let period = match period.trim().to_ascii_uppercase().as_str() {
            "S" => Duration::from_secs(1),
            "M" => Duration::from_secs(60),
            "H" => Duration::from_secs(60 * 60),
            "D" => Duration::from_secs(24 * 60 * 60),
            _ => return Err(err()),
        };

        Ok(Rate { limit, period })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds at which the current window ends
    pub reset: u64,
    pub reached: bool,
}

/// In-memory counters shared by all workers.
#[derive(Debug)]
pub struct FixedWindow {
    rate: Rate,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindow {
    pub fn new(rate: Rate) -> Self {
        Self {
            rate,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn hit(&self, key: &str) -> Quota {
        self.hit_at(key, Instant::now())
    }

    fn hit_at(&self, key: &str, now: Instant) -> Quota {
        let period = self.rate.period;
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < period);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= period {
            *window = Window {
                started: now,
                count: 0,
            };
        }
        window.count += 1;

        let left_in_window = period.saturating_sub(now.duration_since(window.started));
        let reset = (SystemTime::now() + left_in_window)
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Quota {
            limit: self.rate.limit,
            remaining: self.rate.limit.saturating_sub(window.count),
            reset,
            reached: window.count > self.rate.limit,
        }
    }
}

/// Pipeline stage; a no-op when constructed without a rate.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Option<Arc<FixedWindow>>,
}

impl RateLimit {
    pub fn new(rate: Option<Rate>) -> Self {
        Self {
            limiter: rate.map(|r| Arc::new(FixedWindow::new(r))),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Option<Arc<FixedWindow>>,
}

fn set_quota_headers<B>(res: &mut ServiceResponse<B>, quota: &Quota) {
    let headers = res.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(quota.reset));
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(limiter) = self.limiter.clone() else {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) });
        };

        let key = req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let quota = limiter.hit(&key);

        if quota.reached {
            log::debug!("rate limit reached for {}", key);
            let locale = Locale::of(req.request());
            let body = format!("{}\n", i18n::translate(locale, LIMIT_EXCEEDED));
            let mut res = req
                .into_response(
                    HttpResponse::TooManyRequests()
                        .content_type("text/plain; charset=utf-8")
                        .body(body),
                )
                .map_into_right_body();
            set_quota_headers(&mut res, &quota);
            return Box::pin(async move { Ok(res) });
        }

        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let mut res = service.call(req).await?.map_into_left_body();
            set_quota_headers(&mut res, &quota);
            Ok(res)
        })
    }
}
