//! Middleware capturing every HTTP request passing through an axum router
//!
//! The request is turned into a [`RequestContext`], stamped with the local
//! time, and queued to the write buffer; the inner service runs without
//! waiting on disk.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Local;
use futures::future::BoxFuture;
use std::{net::SocketAddr, sync::Arc, task::{Context, Poll}};
use tower::{Layer, Service};

use super::write_buffer::WriteSender;
use super::{RequestContext, RequestLogger};

/// Get the real client IP address, checking proxy headers first
/// Priority: X-Real-IP > X-Forwarded-For (first IP) > ConnectInfo
fn get_real_ip(headers: &HeaderMap, fallback_ip: Option<String>) -> Option<String> {
    // Try X-Real-IP first (set by Caddy/nginx)
    if let Some(ip) = header_str(headers, "x-real-ip").map(str::trim) {
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    // X-Forwarded-For may contain a chain of IPs, the first is the client
    if let Some(first_ip) = header_str(headers, "x-forwarded-for").and_then(|ips| ips.split(',').next()) {
        let ip = first_ip.trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    fallback_ip
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Whether the body is a urlencoded form small enough to inspect
fn inspectable_form(headers: &HeaderMap, max_bytes: usize) -> bool {
    let is_form = header_str(headers, header::CONTENT_TYPE.as_str())
        .map(|ct| ct.trim_start().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    let length = header_str(headers, header::CONTENT_LENGTH.as_str())
        .and_then(|len| len.trim().parse::<usize>().ok());

    is_form && matches!(length, Some(len) if len <= max_bytes)
}

/// Build the capture context from request metadata
fn request_context(request: &Request<Body>) -> RequestContext {
    let headers = request.headers();
    let fallback_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    RequestContext {
        remote_addr: get_real_ip(headers, fallback_ip),
        method: Some(request.method().to_string()),
        uri: request.uri().path_and_query().map(|pq| pq.as_str().to_string()),
        query_string: request.uri().query().map(str::to_string),
        protocol: Some(format!("{:?}", request.version())),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or("<binary>").to_string(),
                )
            })
            .collect(),
        form: Vec::new(),
    }
}

/// Layer for HTTP request capture
#[derive(Clone)]
pub struct RequestLoggingLayer {
    logger: Arc<RequestLogger>,
    write_tx: WriteSender,
    max_form_bytes: usize,
}

impl RequestLoggingLayer {
    pub fn new(logger: Arc<RequestLogger>, write_tx: WriteSender, max_form_bytes: usize) -> Self {
        Self {
            logger,
            write_tx,
            max_form_bytes,
        }
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingMiddleware {
            inner,
            logger: self.logger.clone(),
            write_tx: self.write_tx.clone(),
            max_form_bytes: self.max_form_bytes,
        }
    }
}

/// Middleware service for HTTP request capture
#[derive(Clone)]
pub struct RequestLoggingMiddleware<S> {
    inner: S,
    logger: Arc<RequestLogger>,
    write_tx: WriteSender,
    max_form_bytes: usize,
}

impl<S> Service<Request<Body>> for RequestLoggingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let logger = self.logger.clone();
        let write_tx = self.write_tx.clone();
        let max_form_bytes = self.max_form_bytes;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let received_at = Local::now().naive_local();
            let mut ctx = request_context(&request);

            // Buffer small form bodies so their fields can be logged, then
            // hand the same bytes on to the handler
            let forwarded = if inspectable_form(request.headers(), max_form_bytes) {
                let (parts, body) = request.into_parts();
                match axum::body::to_bytes(body, max_form_bytes).await {
                    Ok(bytes) => {
                        ctx.form = serde_urlencoded::from_bytes(&bytes).unwrap_or_default();
                        Ok(Request::from_parts(parts, Body::from(bytes)))
                    }
                    Err(e) => {
                        tracing::warn!("Failed to buffer form body: {}", e);
                        Err(e)
                    }
                }
            } else {
                Ok(request)
            };

            let record = logger.record(&ctx, received_at);
            tracing::debug!("HTTP {} {} from {}", record.method, record.uri, record.ip);
            if write_tx.send(record).is_err() {
                tracing::warn!("Write buffer closed, request not logged");
            }

            match forwarded {
                Ok(request) => inner.call(request).await,
                // The body is partly consumed; the handler never sees it
                Err(_) => Ok((StatusCode::BAD_REQUEST, "Malformed request body").into_response()),
            }
        })
    }
}
