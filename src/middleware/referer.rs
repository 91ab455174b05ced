// src/middleware/referer.rs
// Reject requests whose Referer points at another site (hotlink protection)

use actix_web::{
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpResponse,
};
use futures_util::future::LocalBoxFuture;

use super::is_localhost_url;

pub struct RefererFilter;

impl<S, B> Transform<S, ServiceRequest> for RefererFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RefererFilterMiddleware<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RefererFilterMiddleware { service }))
    }
}

pub struct RefererFilterMiddleware<S> {
    service: S,
}

/// No referer, a local one, or one on the host being requested.
pub fn referer_allowed(referer: Option<&str>, host: &str) -> bool {
    let Some(referer) = referer.filter(|r| !r.is_empty()) else {
        return true;
    };
    if is_localhost_url(referer) {
        return true;
    }
    referer.starts_with(&format!("http://{}", host))
        || referer.starts_with(&format!("https://{}", host))
}

impl<S, B> Service<ServiceRequest> for RefererFilterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let referer = req
            .headers()
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok());
        let host = req.connection_info().host().to_string();

        if !referer_allowed(referer, &host) {
            log::debug!("rejecting referer {:?} for host {}", referer, host);
            let res = req.into_response(HttpResponse::Forbidden().finish());
            return Box::pin(async move { Ok(res.map_into_right_body()) });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}
