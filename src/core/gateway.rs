//! Core gateway orchestration service.
//!
//! `GatewayService` ties the upstream registry, the client IP cache and the two forwarders
//! together. It classifies request paths into [`Route`]s and runs the proxy operations; HTTP
//! framing, static files and middleware stay in the adapters.
use std::{sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use hyper::{Method, Request, Response, Uri};
use serde::Serialize;
use url::Url;

use crate::{
    config::UnknownUpstreamPolicy,
    core::{
        error::GatewayError,
        forwarder::{FetchForwarder, Forwarder, ProxyRequest, StreamForwarder},
        ip_cache::{ClientIpCache, ClientIpEntry},
        registry::{ForwardMode, PathMatch, UpstreamId, UpstreamRegistry, UpstreamTarget},
    },
    ports::http_client::HttpClient,
};

pub const HEALTH_PATH: &str = "/health";
pub const STATUS_PATH: &str = "/status";

/// Name of the query parameter carrying the single-shot target.
pub const URL_PARAM: &str = "url";

/// Where a request goes.
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    Health,
    Status,
    Stream(&'a UpstreamTarget),
    Custom,
    UnknownUpstream,
    Static,
}

/// One row of the diagnostics table.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamSummary {
    pub id: UpstreamId,
    pub mode: ForwardMode,
    pub path_prefix: String,
    pub base_url: Option<String>,
    pub rewrite: Option<String>,
}

impl From<&UpstreamTarget> for UpstreamSummary {
    fn from(target: &UpstreamTarget) -> Self {
        Self {
            id: target.id,
            mode: target.mode,
            path_prefix: target.path_prefix.clone(),
            base_url: target.base_url.as_ref().map(|u| u.to_string()),
            rewrite: target.rewrite.as_ref().map(|r| r.pattern().to_string()),
        }
    }
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub name: &'static str,
    pub version: &'static str,
    pub client_ip: Option<ClientIpEntry>,
    pub upstreams: Vec<UpstreamSummary>,
}

pub struct GatewayService {
    registry: Arc<UpstreamRegistry>,
    ip_cache: Arc<ClientIpCache>,
    stream: Arc<dyn Forwarder>,
    fetch: Arc<dyn Forwarder>,
    unknown_upstream: UnknownUpstreamPolicy,
}

impl GatewayService {
    pub fn new(
        registry: Arc<UpstreamRegistry>,
        ip_cache: Arc<ClientIpCache>,
        client: Arc<dyn HttpClient>,
        unknown_upstream: UnknownUpstreamPolicy,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        let stream = Arc::new(StreamForwarder::new(client.clone(), ip_cache.clone()));
        let fetch = Arc::new(FetchForwarder::with_timeout(
            client,
            ip_cache.clone(),
            fetch_timeout,
        ));
        Self::with_forwarders(registry, ip_cache, stream, fetch, unknown_upstream)
    }

    /// Build with explicit forwarders, e.g. to wrap or replace one of them.
    pub fn with_forwarders(
        registry: Arc<UpstreamRegistry>,
        ip_cache: Arc<ClientIpCache>,
        stream: Arc<dyn Forwarder>,
        fetch: Arc<dyn Forwarder>,
        unknown_upstream: UnknownUpstreamPolicy,
    ) -> Self {
        Self {
            registry,
            ip_cache,
            stream,
            fetch,
            unknown_upstream,
        }
    }

    pub fn registry(&self) -> &UpstreamRegistry {
        &self.registry
    }

    pub fn ip_cache(&self) -> &Arc<ClientIpCache> {
        &self.ip_cache
    }

    /// Classify a request. Only `GET`/`HEAD` reach health, status and the single-shot
    /// path; streaming upstreams take any method.
    pub fn route(&self, method: &Method, path: &str) -> Route<'_> {
        let readable = *method == Method::GET || *method == Method::HEAD;

        match path {
            HEALTH_PATH if readable => return Route::Health,
            STATUS_PATH if readable => return Route::Status,
            _ => {}
        }

        match self.registry.match_path(path) {
            PathMatch::Streaming(target) => Route::Stream(target),
            PathMatch::SingleShot(_) if readable => Route::Custom,
            PathMatch::SingleShot(_) | PathMatch::NotProxy => Route::Static,
            PathMatch::Unknown => match self.unknown_upstream {
                UnknownUpstreamPolicy::Spa => Route::Static,
                UnknownUpstreamPolicy::NotFound => Route::UnknownUpstream,
            },
        }
    }

    /// `GET /proxy/custom?url=<target>`: fetch the target once and relay it.
    pub async fn handle_custom_proxy(
        &self,
        query: Option<&str>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let target = parse_target_url(query)?;
        tracing::debug!("Single-shot fetch of {}", target);
        self.fetch
            .forward(ProxyRequest::get(UpstreamId::Custom, target))
            .await
    }

    /// Relay a request to a prefix-routed upstream, streaming both bodies.
    pub async fn forward_streaming(
        &self,
        target: &UpstreamTarget,
        req: Request<AxumBody>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let (parts, body) = req.into_parts();
        let upstream_uri = target.upstream_uri(parts.uri.path(), parts.uri.query())?;
        tracing::debug!(
            "Forwarding {} {} to {} ({})",
            parts.method,
            parts.uri.path(),
            upstream_uri,
            target.id
        );

        self.stream
            .forward(ProxyRequest {
                upstream: target.id,
                target: upstream_uri,
                method: parts.method,
                headers: parts.headers,
                body,
            })
            .await
    }

    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            client_ip: self.ip_cache.current().map(|entry| (*entry).clone()),
            upstreams: self.registry.iter().map(UpstreamSummary::from).collect(),
        }
    }
}

/// Extract and check the `url` query parameter of a single-shot request.
pub fn parse_target_url(query: Option<&str>) -> Result<Uri, GatewayError> {
    let raw = query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == URL_PARAM)
                .map(|(_, value)| value.into_owned())
        })
        .filter(|value| !value.is_empty())
        .ok_or(GatewayError::MissingUrl)?;

    let invalid = |reason: String| GatewayError::InvalidUrl {
        url: raw.clone(),
        reason,
    };

    let url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    url.as_str()
        .parse::<Uri>()
        .map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use hyper::StatusCode;

    use super::*;
    use crate::ports::{InterfaceSource, NetworkInterface};

    struct NoInterfaces;

    impl InterfaceSource for NoInterfaces {
        fn interfaces(&self) -> Vec<NetworkInterface> {
            Vec::new()
        }
    }

    /// Remembers what it was asked to forward and answers 204.
    #[derive(Default)]
    struct CapturingForwarder {
        seen: Mutex<Vec<(UpstreamId, Method, Uri)>>,
    }

    #[async_trait]
    impl Forwarder for CapturingForwarder {
        async fn forward(&self, req: ProxyRequest) -> Result<Response<AxumBody>, GatewayError> {
            self.seen
                .lock()
                .unwrap()
                .push((req.upstream, req.method, req.target));
            let mut response = Response::new(AxumBody::empty());
            *response.status_mut() = StatusCode::NO_CONTENT;
            Ok(response)
        }
    }

    fn service(
        policy: UnknownUpstreamPolicy,
    ) -> (GatewayService, Arc<CapturingForwarder>, Arc<CapturingForwarder>) {
        let stream = Arc::new(CapturingForwarder::default());
        let fetch = Arc::new(CapturingForwarder::default());
        let service = GatewayService::with_forwarders(
            Arc::new(UpstreamRegistry::builtin().unwrap()),
            Arc::new(ClientIpCache::new(Arc::new(NoInterfaces))),
            stream.clone(),
            fetch.clone(),
            policy,
        );
        (service, stream, fetch)
    }

    #[test]
    fn test_route_classification() {
        let (service, _, _) = service(UnknownUpstreamPolicy::Spa);

        assert!(matches!(service.route(&Method::GET, "/health"), Route::Health));
        assert!(matches!(service.route(&Method::GET, "/status"), Route::Status));
        assert!(matches!(
            service.route(&Method::GET, "/proxy/custom"),
            Route::Custom
        ));
        assert!(matches!(
            service.route(&Method::POST, "/proxy/custom"),
            Route::Static
        ));
        assert!(matches!(
            service.route(&Method::DELETE, "/proxy/allorigins/raw"),
            Route::Stream(t) if t.id == UpstreamId::Allorigins
        ));
        assert!(matches!(
            service.route(&Method::GET, "/games/snake"),
            Route::Static
        ));
        assert!(matches!(
            service.route(&Method::GET, "/proxy/unknown/x"),
            Route::Static
        ));
    }

    #[test]
    fn test_unknown_upstream_policy_not_found() {
        let (service, _, _) = service(UnknownUpstreamPolicy::NotFound);
        assert!(matches!(
            service.route(&Method::GET, "/proxy/none/x"),
            Route::UnknownUpstream
        ));
    }

    #[test]
    fn test_parse_target_url() {
        let uri = parse_target_url(Some("url=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1")).unwrap();
        assert_eq!(uri.to_string(), "https://example.com/a?b=1");

        assert!(matches!(parse_target_url(None), Err(GatewayError::MissingUrl)));
        assert!(matches!(
            parse_target_url(Some("other=1")),
            Err(GatewayError::MissingUrl)
        ));
        assert!(matches!(
            parse_target_url(Some("url=")),
            Err(GatewayError::MissingUrl)
        ));
        assert!(matches!(
            parse_target_url(Some("url=ftp://example.com/")),
            Err(GatewayError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_target_url(Some("url=not%20a%20url")),
            Err(GatewayError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_custom_proxy_uses_fetch_forwarder() {
        let (service, stream, fetch) = service(UnknownUpstreamPolicy::Spa);

        let response = service
            .handle_custom_proxy(Some("url=https://example.com/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let seen = fetch.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, UpstreamId::Custom);
        assert_eq!(seen[0].2, "https://example.com/");
        assert!(stream.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_url_never_reaches_forwarder() {
        let (service, _, fetch) = service(UnknownUpstreamPolicy::Spa);
        let err = service.handle_custom_proxy(None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(fetch.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forward_streaming_rewrites_path() {
        let (service, stream, _) = service(UnknownUpstreamPolicy::Spa);
        let target = service.registry().get(UpstreamId::Allorigins).clone();

        let req = Request::builder()
            .method(Method::PUT)
            .uri("/proxy/allorigins/raw?url=https://x.test")
            .body(AxumBody::empty())
            .unwrap();
        service.forward_streaming(&target, req).await.unwrap();

        let seen = stream.seen.lock().unwrap();
        assert_eq!(seen[0].0, UpstreamId::Allorigins);
        assert_eq!(seen[0].1, Method::PUT);
        assert_eq!(seen[0].2, "https://api.allorigins.win/raw?url=https://x.test");
    }

    #[test]
    fn test_status_reports_cache_and_table() {
        let (service, _, _) = service(UnknownUpstreamPolicy::Spa);
        assert!(service.status().client_ip.is_none());

        service.ip_cache().resolve();
        let status = service.status();
        assert_eq!(status.client_ip.unwrap().ip.to_string(), "127.0.0.1");
        assert_eq!(status.upstreams.len(), UpstreamId::ALL.len());
        assert_eq!(status.name, "cors-relay");
    }
}
