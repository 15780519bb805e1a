use std::sync::Arc;

use axum::{
    body::Body as AxumBody,
    http::{StatusCode, header},
    response::IntoResponse,
};
use eyre::{Result, WrapErr};
use hyper::{Request, Response};

use crate::{
    adapters::FileSystemAdapter,
    config::StaticFilesConfig,
    core::{GatewayError, GatewayService, Route},
    ports::file_system::FileSystem,
};

/// HTTP handler for the relay: dispatches every request by [`Route`].
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
    file_system: Arc<FileSystemAdapter>,
    static_files: StaticFilesConfig,
}

impl HttpHandler {
    pub fn new(
        gateway_service: Arc<GatewayService>,
        file_system: Arc<FileSystemAdapter>,
        static_files: StaticFilesConfig,
    ) -> Self {
        Self {
            gateway_service,
            file_system,
            static_files,
        }
    }

    pub fn gateway_service(&self) -> &Arc<GatewayService> {
        &self.gateway_service
    }

    /// Main request handler that routes requests appropriately
    pub async fn handle_request(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        tracing::debug!("Handling {} request to {}", method, path);

        match self.gateway_service.route(&method, &path) {
            Route::Health => self.handle_health_check(),
            Route::Status => self.handle_status(),
            Route::Custom => {
                let query = req.uri().query().map(str::to_string);
                Ok(self
                    .gateway_service
                    .handle_custom_proxy(query.as_deref())
                    .await
                    .unwrap_or_else(IntoResponse::into_response))
            }
            Route::Stream(target) => Ok(self
                .gateway_service
                .forward_streaming(target, req)
                .await
                .unwrap_or_else(IntoResponse::into_response)),
            Route::UnknownUpstream => Ok(GatewayError::UnknownUpstream(path).into_response()),
            Route::Static => self.handle_static_file(req).await,
        }
    }

    fn handle_health_check(&self) -> Result<Response<AxumBody>> {
        let health_data = serde_json::json!({
            "status": "OK",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(health_data.to_string()))
            .wrap_err("Failed to build health check response")
    }

    fn handle_status(&self) -> Result<Response<AxumBody>> {
        let status_data = serde_json::to_vec(&self.gateway_service.status())
            .wrap_err("Failed to serialize status")?;

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(status_data))
            .wrap_err("Failed to build status response")
    }

    async fn handle_static_file(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>> {
        let path = req.uri().path().to_string();
        let StaticFilesConfig { root, index_file } = &self.static_files;

        match self.file_system.serve_spa(root, index_file, req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::warn!("Failed to serve static file {}: {}", path, e);
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(AxumBody::from("File not found"))
                    .wrap_err("Failed to build error response")
            }
        }
    }
}
