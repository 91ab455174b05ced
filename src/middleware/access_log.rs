// src/middleware/access_log.rs
// One access-log record per request, written when the response is ready

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use chrono::Utc;
use futures_util::future::LocalBoxFuture;
use std::time::Instant;

use crate::logger::{self, AccessRecord};

pub struct AccessLog;

impl<S, B> Transform<S, ServiceRequest> for AccessLog
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AccessLogMiddleware<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AccessLogMiddleware { service }))
    }
}

pub struct AccessLogMiddleware<S> {
    service: S,
}

fn header_or_empty(req: &ServiceRequest, name: &str) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

impl<S, B> Service<ServiceRequest> for AccessLogMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();

        let mut record = AccessRecord {
            client_ip: req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string(),
            time: Utc::now(),
            request_id: header_or_empty(&req, "x-request-id"),
            method: req.method().to_string(),
            path: req.path().to_string(),
            proto: format!("{:?}", req.version()),
            status: 0,
            latency: Default::default(),
            user_agent: header_or_empty(&req, "user-agent"),
        };

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await;
            record.latency = start_time.elapsed();
            record.status = match &res {
                Ok(res) => res.status().as_u16(),
                Err(err) => err.as_response_error().status_code().as_u16(),
            };

            logger::get_logger().access(&record);

            res
        })
    }
}
