//! cors-relay - a small forward-proxy gateway for embedding third-party pages in iframes.
//!
//! The relay accepts browser requests for foreign URLs and forwards them either through one
//! of several public CORS-proxy services (streamed, prefix-routed under `/proxy/<id>`) or with
//! a direct single-shot fetch (`/proxy/custom?url=...`). Responses lose the headers that block
//! framing and gain permissive CORS headers. Everything else is served from the front-end
//! bundle, with the index document as a fallback for client-side routes.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use cors_relay::{
//!     ClientIpCache, GatewayService, HttpClientAdapter, UpstreamRegistry,
//!     adapters::SystemInterfaces, config::ServerConfig,
//! };
//!
//! # fn main() -> eyre::Result<()> {
//! let cfg = ServerConfig::default();
//! let registry = Arc::new(UpstreamRegistry::with_overrides(&cfg.upstreams)?);
//! let ip_cache = Arc::new(ClientIpCache::new(Arc::new(SystemInterfaces)));
//! let timeout = cfg.proxy.timeout()?;
//! let client = Arc::new(HttpClientAdapter::with_timeout(timeout)?);
//! let gateway = GatewayService::new(
//!     registry,
//!     ip_cache,
//!     client,
//!     cfg.proxy.unknown_upstream,
//!     timeout,
//! );
//! // Wire it into `HttpHandler` and `adapters::router` (see the binary crate)
//! # let _ = gateway;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Ports (traits) live in `ports`, their implementations in `adapters`, and the relay logic
//! (registry, header rules, client IP cache, forwarders) in `core`.
//!
//! # Error Handling
//! Request-level failures are [`GatewayError`]s rendered as `{"error": "..."}`; startup and
//! configuration paths return `eyre::Result<T>` with context attached through `WrapErr`.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{AxumServer, FileSystemAdapter, HttpClientAdapter, HttpHandler},
    core::{ClientIpCache, GatewayError, GatewayService, UpstreamRegistry},
    ports::http_client::HttpClient,
    utils::{GracefulShutdown, ShutdownToken},
};
