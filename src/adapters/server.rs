use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::Request,
    middleware,
    response::Response,
    routing::{MethodRouter, any},
};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{
    adapters::{
        HttpHandler,
        middleware::{create_cors_middleware, request_id_middleware, request_timing_middleware},
    },
    config::CorsConfig,
    ports::http_server::HttpServer,
    utils::ShutdownToken,
};

fn request_route(handler: Arc<HttpHandler>) -> MethodRouter {
    any(move |req: Request| {
        let handler = handler.clone();
        async move {
            match handler.handle_request(req).await {
                Ok(response) => Ok::<Response<Body>, Infallible>(response),
                Err(e) => {
                    tracing::error!("Request handling error: {:?}", e);
                    let mut error_response = Response::new(Body::from("Internal Server Error"));
                    *error_response.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
                    Ok(error_response)
                }
            }
        }
    })
}

/// Build the router: every path goes to the handler, wrapped in CORS, timing and request-id
/// layers (outermost last).
pub fn router(handler: Arc<HttpHandler>, cors: Arc<CorsConfig>) -> Router {
    Router::new()
        .route("/", request_route(handler.clone()))
        .route("/{*path}", request_route(handler))
        .layer(middleware::from_fn(create_cors_middleware(cors)))
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Plain HTTP listener serving the gateway router until shutdown.
pub struct AxumServer {
    addr: SocketAddr,
    router: Router,
    shutdown: ShutdownToken,
}

impl AxumServer {
    pub fn new(addr: SocketAddr, router: Router, shutdown: ShutdownToken) -> Self {
        Self {
            addr,
            router,
            shutdown,
        }
    }

    /// Serve on an already bound listener.
    pub async fn serve(listener: TcpListener, router: Router, shutdown: ShutdownToken) -> Result<()> {
        let mut shutdown = shutdown;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let reason = shutdown.wait_for_shutdown().await;
                tracing::info!("Shutdown signal received: {:?}", reason);
            })
            .await
            .wrap_err("Server error")
    }
}

impl HttpServer for AxumServer {
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .wrap_err_with(|| format!("Failed to bind to address {}", self.addr))?;
        tracing::info!("Listening on http://{}", self.addr);

        Self::serve(listener, self.router.clone(), self.shutdown.clone()).await?;
        tracing::info!("Server stopped accepting connections");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::utils::{GracefulShutdown, ShutdownReason};

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let shutdown = GracefulShutdown::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let router = Router::new().route("/", any(|| async { "ok" }));

        let handle = tokio::spawn(AxumServer::serve(
            listener,
            router,
            shutdown.shutdown_token(),
        ));

        shutdown.trigger_shutdown(ShutdownReason::Requested);
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
