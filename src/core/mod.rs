pub mod error;
pub mod forwarder;
pub mod gateway;
pub mod headers;
pub mod ip_cache;
pub mod registry;

pub use error::GatewayError;
pub use forwarder::{FetchForwarder, Forwarder, ProxyRequest, StreamForwarder};
pub use gateway::{GatewayService, GatewayStatus, Route};
pub use ip_cache::{ClientIpCache, ClientIpEntry, IpSource};
pub use registry::{ForwardMode, UpstreamId, UpstreamRegistry, UpstreamTarget};
