// src/middleware/locale.rs
// Attach the negotiated Locale to every request

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;

use crate::i18n::Locale;

pub struct LocaleNegotiation;

impl<S, B> Transform<S, ServiceRequest> for LocaleNegotiation
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = LocaleNegotiationMiddleware<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LocaleNegotiationMiddleware { service }))
    }
}

pub struct LocaleNegotiationMiddleware<S> {
    service: S,
}

fn query_lang(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "lang")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}

pub fn negotiate(req: &ServiceRequest) -> Locale {
    let query = query_lang(req.query_string());
    let cookie = req.cookie("lang").map(|c| c.value().to_string());
    let accept = req
        .headers()
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());

    Locale::negotiate(query.as_deref(), cookie.as_deref(), accept)
}

impl<S, B> Service<ServiceRequest> for LocaleNegotiationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let locale = negotiate(&req);
        req.extensions_mut().insert(locale);
        Box::pin(self.service.call(req))
    }
}
