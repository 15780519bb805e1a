//! Header transformer shared by both forwarding paths.
//!
//! Outbound requests are dressed up as a generic desktop browser at one stable IP; inbound
//! responses lose the headers that forbid framing and gain permissive CORS headers.
use hyper::header::{
    self, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION,
    CONTENT_SECURITY_POLICY, HeaderMap, HeaderName, HeaderValue, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT, X_FRAME_OPTIONS,
};

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";
pub const BROWSER_ACCEPT_ENCODING: &str = "gzip, deflate";

pub const ALLOW_ORIGIN_ANY: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept, Authorization";

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Connection-scoped headers that never cross a proxy hop.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The fixed outbound header set for a given client IP.
pub fn build_outbound_headers(client_ip: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    apply_outbound_headers(&mut headers, client_ip);
    headers
}

/// Overwrite `headers` with the fixed outbound set, keeping anything else already present.
pub fn apply_outbound_headers(headers: &mut HeaderMap, client_ip: &str) {
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
    );
    headers.insert(
        ACCEPT_ENCODING,
        HeaderValue::from_static(BROWSER_ACCEPT_ENCODING),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    match HeaderValue::from_str(client_ip) {
        Ok(ip) => {
            headers.insert(X_FORWARDED_FOR, ip.clone());
            headers.insert(X_REAL_IP, ip);
        }
        Err(e) => tracing::warn!("Client IP '{}' is not a valid header value: {}", client_ip, e),
    }
}

/// Strip framing restrictions and add permissive CORS headers, in place.
pub fn sanitize_inbound_headers(headers: &mut HeaderMap) {
    headers.remove(X_FRAME_OPTIONS);
    headers.remove(CONTENT_SECURITY_POLICY);

    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN_ANY),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// Owned variant of [`sanitize_inbound_headers`].
pub fn sanitized(mut headers: HeaderMap) -> HeaderMap {
    sanitize_inbound_headers(&mut headers);
    headers
}

/// Remove hop-by-hop headers, including any named by the `Connection` header itself.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Prepare client headers for the streaming path: drop hop-by-hop and `Host`, then lay
/// the fixed outbound set over what remains.
pub fn forwardable_request_headers(mut headers: HeaderMap, client_ip: &str) -> HeaderMap {
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    apply_outbound_headers(&mut headers, client_ip);
    headers
}
