use axum::{
    Json,
    response::{IntoResponse, Response},
};
use hyper::StatusCode;
use thiserror::Error;

use crate::{core::registry::RegistryError, ports::http_client::HttpClientError};

/// Errors terminating a single proxied request.
///
/// `Display` carries the full cause for the server log; [`GatewayError::public_message`] is
/// the only text a caller ever sees.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("URL parameter is required")]
    MissingUrl,

    #[error("Invalid URL parameter '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Fetch of {url} failed: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: HttpClientError,
    },

    #[error("Reading body from {url} failed: {reason}")]
    BodyRead { url: String, reason: String },

    #[error("Streaming request to upstream '{upstream}' failed: {source}")]
    StreamFailed {
        upstream: String,
        #[source]
        source: HttpClientError,
    },

    #[error("Cannot build upstream request: {0}")]
    Registry(#[from] RegistryError),

    #[error("Unknown proxy service in path {0}")]
    UnknownUpstream(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingUrl | GatewayError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            GatewayError::UnknownUpstream(_) => StatusCode::NOT_FOUND,
            GatewayError::FetchFailed { .. }
            | GatewayError::BodyRead { .. }
            | GatewayError::StreamFailed { .. }
            | GatewayError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::MissingUrl => "URL parameter is required",
            GatewayError::InvalidUrl { .. } => "URL parameter must be an absolute http(s) URL",
            GatewayError::FetchFailed { .. } | GatewayError::BodyRead { .. } => {
                "Failed to fetch the requested URL"
            }
            GatewayError::StreamFailed { .. } | GatewayError::Registry(_) => {
                "Failed to proxy the request"
            }
            GatewayError::UnknownUpstream(_) => "Unknown proxy service",
        }
    }

    pub fn is_usage_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if self.is_usage_error() {
            tracing::warn!("Rejected proxy request: {}", self);
        } else {
            tracing::error!("Proxy error: {}", self);
        }

        let body = serde_json::json!({ "error": self.public_message() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_url_response() {
        let response = GatewayError::MissingUrl.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "URL parameter is required" })
        );
    }

    #[tokio::test]
    async fn test_upstream_cause_is_not_leaked() {
        let err = GatewayError::FetchFailed {
            url: "https://secret.internal/".to_string(),
            source: HttpClientError::ConnectionError("connection refused (os error 111)".into()),
        };
        assert!(err.to_string().contains("connection refused"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({ "error": "Failed to fetch the requested URL" }));
    }
}
