//! Axum middleware attached to the gateway router.
//!
//! Request ids and timing wrap every request; the CORS layer answers preflights for the
//! allow-listed front-end origins and marks responses that carry no CORS headers of their own.
use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::{config::CorsConfig, core::headers::ALLOW_METHODS, tracing_setup::create_request_span};

pub const X_REQUEST_ID: &str = "x-request-id";

const DEFAULT_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Log start/end of a request including latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    tracing::info!("Started processing {} {} {:?}", method, uri, version);

    let response = next.run(req).await;
    let duration = start.elapsed();

    tracing::Span::current().record("http.status_code", response.status().as_u16());
    tracing::Span::current().record("duration_ms", duration.as_millis() as u64);
    tracing::info!(
        "Completed {} {} {:?} - {} in {:?}",
        method,
        uri,
        version,
        response.status(),
        duration
    );

    response
}

/// Generate a per-request UUID, run the request inside its span and expose the id via
/// `X-Request-ID`.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = create_request_span(req.method(), req.uri().path(), &request_id);

    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, header_value);
    }

    response
}

fn is_preflight(req: &Request) -> bool {
    *req.method() == Method::OPTIONS
        && req.headers().contains_key(header::ORIGIN)
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

fn preflight_response(req: &Request, origin: Option<HeaderValue>, cors: &CorsConfig) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    let requested = req
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOW_HEADERS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
    headers.append(header::VARY, HeaderValue::from_static("Origin"));

    // Disallowed origins get a preflight answer the browser will reject.
    if let Some(origin) = origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        if cors.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    response
}

/// Allow-list CORS for callers of the gateway.
pub async fn cors_middleware(req: Request, next: Next, cors: Arc<CorsConfig>) -> Response {
    let allowed_origin = req
        .headers()
        .get(header::ORIGIN)
        .filter(|origin| origin.to_str().is_ok_and(|o| cors.is_allowed(o)))
        .cloned();

    if is_preflight(&req) {
        tracing::debug!(
            "Answering CORS preflight for {} (allowed: {})",
            req.uri().path(),
            allowed_origin.is_some()
        );
        return preflight_response(&req, allowed_origin, &cors);
    }

    let mut response = next.run(req).await;

    if let Some(origin) = allowed_origin {
        let headers = response.headers_mut();
        if !headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
            if cors.allow_credentials {
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
            }
        }
    }

    response
}

/// Create a cloneable closure wrapping [`cors_middleware`].
pub fn create_cors_middleware(
    cors: Arc<CorsConfig>,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
+ Clone {
    move |req, next| {
        let cors = cors.clone();
        Box::pin(async move { cors_middleware(req, next, cors).await })
    }
}
