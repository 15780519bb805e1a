//! The two ways a request reaches an upstream.
//!
//! [`StreamForwarder`] relays method, headers and body as they arrive and hands the upstream
//! body back unbuffered. [`FetchForwarder`] issues one GET, reads the whole body, then relays
//! it with status 200. Both resolve the shared client IP, dress the outbound request with the
//! fixed browser header set and sanitize the inbound headers.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{
    HeaderMap, Method, Request, Response, StatusCode, Uri,
    header::{self, HeaderValue},
};
use tracing::Instrument;

use crate::{
    core::{
        error::GatewayError,
        headers::{
            build_outbound_headers, forwardable_request_headers, sanitize_inbound_headers,
            strip_hop_by_hop,
        },
        ip_cache::ClientIpCache,
        registry::UpstreamId,
    },
    ports::http_client::{HttpClient, HttpClientError},
    tracing_setup::create_upstream_span,
};

/// Content type assumed when a single-shot upstream does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// One request bound for an upstream. Built per incoming request, consumed by a forwarder.
#[derive(Debug)]
pub struct ProxyRequest {
    pub upstream: UpstreamId,
    pub target: Uri,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: AxumBody,
}

impl ProxyRequest {
    /// A bodiless GET with no client headers.
    pub fn get(upstream: UpstreamId, target: Uri) -> Self {
        Self {
            upstream,
            target,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: AxumBody::empty(),
        }
    }
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, req: ProxyRequest) -> Result<Response<AxumBody>, GatewayError>;
}

pub struct StreamForwarder {
    client: Arc<dyn HttpClient>,
    ip_cache: Arc<ClientIpCache>,
}

impl StreamForwarder {
    pub fn new(client: Arc<dyn HttpClient>, ip_cache: Arc<ClientIpCache>) -> Self {
        Self { client, ip_cache }
    }
}

#[async_trait]
impl Forwarder for StreamForwarder {
    async fn forward(&self, req: ProxyRequest) -> Result<Response<AxumBody>, GatewayError> {
        let client_ip = self.ip_cache.resolve_client_ip();
        let span = create_upstream_span(req.upstream.as_str(), &req.target, &req.method);
        let upstream = req.upstream;

        let mut outbound = Request::new(req.body);
        *outbound.method_mut() = req.method;
        *outbound.uri_mut() = req.target;
        *outbound.headers_mut() = forwardable_request_headers(req.headers, &client_ip);

        let response = self
            .client
            .send_request(outbound)
            .instrument(span.clone())
            .await
            .map_err(|source| GatewayError::StreamFailed {
                upstream: upstream.to_string(),
                source,
            })?;

        span.record("http.status_code", response.status().as_u16());

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        sanitize_inbound_headers(&mut parts.headers);

        Ok(Response::from_parts(parts, body))
    }
}

pub struct FetchForwarder {
    client: Arc<dyn HttpClient>,
    ip_cache: Arc<ClientIpCache>,
    timeout: Option<Duration>,
}

impl FetchForwarder {
    pub fn new(client: Arc<dyn HttpClient>, ip_cache: Arc<ClientIpCache>) -> Self {
        Self::with_timeout(client, ip_cache, None)
    }

    /// `timeout` bounds the whole exchange, body read included.
    pub fn with_timeout(
        client: Arc<dyn HttpClient>,
        ip_cache: Arc<ClientIpCache>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            ip_cache,
            timeout,
        }
    }

    async fn fetch(
        &self,
        upstream: UpstreamId,
        target: Uri,
        url: &str,
    ) -> Result<(HeaderMap, Bytes), GatewayError> {
        let client_ip = self.ip_cache.resolve_client_ip();
        let span = create_upstream_span(upstream.as_str(), &target, &Method::GET);

        let mut outbound = Request::new(AxumBody::empty());
        *outbound.uri_mut() = target;
        *outbound.headers_mut() = build_outbound_headers(&client_ip);

        let response = self
            .client
            .send_request(outbound)
            .instrument(span.clone())
            .await
            .map_err(|source| GatewayError::FetchFailed {
                url: url.to_string(),
                source,
            })?;

        span.record("http.status_code", response.status().as_u16());

        let (parts, body) = response.into_parts();
        let bytes: Bytes = body
            .collect()
            .instrument(span)
            .await
            .map_err(|e| GatewayError::BodyRead {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .to_bytes();

        Ok((parts.headers, bytes))
    }
}

#[async_trait]
impl Forwarder for FetchForwarder {
    async fn forward(&self, req: ProxyRequest) -> Result<Response<AxumBody>, GatewayError> {
        let url = req.target.to_string();

        let fetch = self.fetch(req.upstream, req.target, &url);
        let (mut headers, bytes) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                GatewayError::FetchFailed {
                    url: url.clone(),
                    source: HttpClientError::Timeout(limit),
                }
            })??,
            None => fetch.await?,
        };

        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        sanitize_inbound_headers(&mut headers);
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
            );
        }

        let mut relayed = Response::new(AxumBody::from(bytes));
        *relayed.status_mut() = StatusCode::OK;
        *relayed.headers_mut() = headers;
        Ok(relayed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::ports::{
        InterfaceSource, NetworkInterface,
        http_client::HttpClientResult,
    };
    use crate::adapters::HttpClientAdapter;

    struct OneInterface;

    impl InterfaceSource for OneInterface {
        fn interfaces(&self) -> Vec<NetworkInterface> {
            vec![NetworkInterface::new("eth0", "192.168.7.7".parse().unwrap())]
        }
    }

    /// Records outbound requests and answers with a canned response.
    struct RecordingClient {
        seen: Mutex<Vec<(Method, Uri, HeaderMap)>>,
        reply: fn() -> HttpClientResult<Response<AxumBody>>,
    }

    impl RecordingClient {
        fn new(reply: fn() -> HttpClientResult<Response<AxumBody>>) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_request(
            &self,
            req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            self.seen.lock().unwrap().push((
                req.method().clone(),
                req.uri().clone(),
                req.headers().clone(),
            ));
            (self.reply)()
        }
    }

    fn ip_cache() -> Arc<ClientIpCache> {
        Arc::new(ClientIpCache::new(Arc::new(OneInterface)))
    }

    fn framed_page() -> HttpClientResult<Response<AxumBody>> {
        Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::X_FRAME_OPTIONS, "SAMEORIGIN")
            .header(header::CONTENT_SECURITY_POLICY, "frame-ancestors 'self'")
            .header(header::CONTENT_LENGTH, "16")
            .body(AxumBody::from("<html>ok</html>\n"))
            .unwrap())
    }

    fn untyped_page() -> HttpClientResult<Response<AxumBody>> {
        Ok(Response::new(AxumBody::from("plain bytes")))
    }

    fn refused() -> HttpClientResult<Response<AxumBody>> {
        Err(HttpClientError::ConnectionError("connection refused".into()))
    }

    #[tokio::test]
    async fn test_fetch_relays_body_with_status_200() {
        let client = RecordingClient::new(framed_page);
        let forwarder = FetchForwarder::new(client.clone(), ip_cache());

        let response = forwarder
            .forward(ProxyRequest::get(
                UpstreamId::Custom,
                "https://example.com/".parse().unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::X_FRAME_OPTIONS));
        assert!(!response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            DEFAULT_CONTENT_TYPE
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<html>ok</html>\n");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (method, uri, headers) = &seen[0];
        assert_eq!(*method, Method::GET);
        assert_eq!(uri, "https://example.com/");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "192.168.7.7");
        assert_eq!(headers.get("x-real-ip").unwrap(), "192.168.7.7");
    }

    #[tokio::test]
    async fn test_fetch_keeps_upstream_content_type() {
        fn json_page() -> HttpClientResult<Response<AxumBody>> {
            Ok(Response::builder()
                .header(header::CONTENT_TYPE, "application/json")
                .body(AxumBody::from("{}"))
                .unwrap())
        }
        let forwarder = FetchForwarder::new(RecordingClient::new(json_page), ip_cache());
        let response = forwarder
            .forward(ProxyRequest::get(
                UpstreamId::Custom,
                "https://api.example.com/data".parse().unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_maps_to_fetch_failed() {
        let forwarder = FetchForwarder::new(RecordingClient::new(refused), ip_cache());
        let err = forwarder
            .forward(ProxyRequest::get(
                UpstreamId::Custom,
                "https://down.example/".parse().unwrap(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::FetchFailed { .. }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_stream_passes_method_and_status_through() {
        let client = RecordingClient::new(framed_page);
        let forwarder = StreamForwarder::new(client.clone(), ip_cache());

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:3001"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));

        let response = forwarder
            .forward(ProxyRequest {
                upstream: UpstreamId::Corsproxy,
                target: "https://corsproxy.io/?https://x.test".parse().unwrap(),
                method: Method::POST,
                headers,
                body: AxumBody::from("payload"),
            })
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key(header::X_FRAME_OPTIONS));
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );

        let seen = client.seen.lock().unwrap();
        let (method, _, headers) = &seen[0];
        assert_eq!(*method, Method::POST);
        assert!(!headers.contains_key(header::HOST));
        assert_eq!(headers.get(header::COOKIE).unwrap(), "session=1");
        assert_eq!(
            headers.get(header::USER_AGENT).unwrap(),
            crate::core::headers::BROWSER_USER_AGENT
        );
    }

    #[tokio::test]
    async fn test_stream_failure_maps_to_stream_failed() {
        let forwarder = StreamForwarder::new(RecordingClient::new(refused), ip_cache());
        let err = forwarder
            .forward(ProxyRequest::get(
                UpstreamId::Allorigins,
                "https://api.allorigins.win/raw".parse().unwrap(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::StreamFailed { .. }));
        assert_eq!(err.public_message(), "Failed to proxy the request");
    }

    #[tokio::test]
    async fn test_fetch_without_content_type_defaults_to_html() {
        let forwarder = FetchForwarder::new(RecordingClient::new(untyped_page), ip_cache());
        let response = forwarder
            .forward(ProxyRequest::get(
                UpstreamId::Custom,
                "https://example.com/".parse().unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/html");
    }

    #[tokio::test]
    async fn test_fetch_timeout_covers_stalled_body() {
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        // Headers and a partial body, then nothing.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n<html>")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let limit = Duration::from_millis(200);
        let client = Arc::new(HttpClientAdapter::with_timeout(Some(limit)).unwrap());
        let forwarder = FetchForwarder::with_timeout(client, ip_cache(), Some(limit));

        let outcome = tokio::time::timeout(
            Duration::from_secs(3),
            forwarder.forward(ProxyRequest::get(
                UpstreamId::Custom,
                format!("http://{addr}/slow").parse().unwrap(),
            )),
        )
        .await
        .expect("single-shot fetch outlived its timeout");

        let err = outcome.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::FetchFailed {
                source: HttpClientError::Timeout(_),
                ..
            }
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Failed to fetch the requested URL");
    }
}
