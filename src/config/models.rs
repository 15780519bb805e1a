//! Configuration data structures for the relay.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. Every section
//! carries defaults so an empty file, or no file at all, yields the stock deployment:
//! listen on port 3001, serve the front-end bundle from `dist/game-iframe-app` and relay
//! through the three public CORS proxies.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3001;

/// Static front-end bundle served for every unmatched path.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory holding the pre-built front-end bundle
    pub root: String,
    /// Entry document returned for client-side routes
    pub index_file: String,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: "dist/game-iframe-app".to_string(),
            index_file: "index.html".to_string(),
        }
    }
}

/// Shared client IP cache settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IpCacheConfig {
    /// How often the cached entry is dropped, parsed by humantime ("5m", "30s", ...)
    pub refresh_interval: String,
}

impl Default for IpCacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: "5m".to_string(),
        }
    }
}

impl IpCacheConfig {
    pub fn refresh_interval(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.refresh_interval)
    }
}

/// Base URL overrides for the built-in streaming upstreams.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct UpstreamOverrides {
    pub cors_anywhere: Option<String>,
    pub allorigins: Option<String>,
    pub corsproxy: Option<String>,
}

/// What to do with `/proxy/<id>/...` when `<id>` is not a known upstream.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownUpstreamPolicy {
    /// Fall through to the front-end entry document
    #[default]
    Spa,
    /// Answer 404 with a JSON error body
    NotFound,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Optional upstream timeout ("30s"). Unset means wait for as long as the transport does.
    pub timeout: Option<String>,
    pub unknown_upstream: UnknownUpstreamPolicy,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Result<Option<Duration>, humantime::DurationError> {
        self.timeout
            .as_deref()
            .map(humantime::parse_duration)
            .transpose()
    }
}

/// Cross-origin policy for callers of the gateway itself (the front-end dev servers).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:4200".to_string(),
                "http://localhost:3000".to_string(),
            ],
            allow_credentials: true,
        }
    }
}

impl CorsConfig {
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin || o == "*")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive; `RUST_LOG` takes precedence when set
    pub level: String,
    /// Emit JSON lines instead of the pretty console format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_files: StaticFilesConfig,
    pub ip_cache: IpCacheConfig,
    pub upstreams: UpstreamOverrides,
    pub proxy: ProxyConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// `host:port` as written in the configuration.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            static_files: StaticFilesConfig::default(),
            ip_cache: IpCacheConfig::default(),
            upstreams: UpstreamOverrides::default(),
            proxy: ProxyConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Builder for ServerConfig, mostly used when embedding the gateway or in tests.
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set static files root and entry document
    pub fn static_files(mut self, root: impl Into<String>, index_file: impl Into<String>) -> Self {
        self.config.static_files = StaticFilesConfig {
            root: root.into(),
            index_file: index_file.into(),
        };
        self
    }

    pub fn refresh_interval(mut self, interval: impl Into<String>) -> Self {
        self.config.ip_cache.refresh_interval = interval.into();
        self
    }

    pub fn upstreams(mut self, overrides: UpstreamOverrides) -> Self {
        self.config.upstreams = overrides;
        self
    }

    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.config.proxy.timeout = Some(timeout.into());
        self
    }

    pub fn unknown_upstream(mut self, policy: UnknownUpstreamPolicy) -> Self {
        self.config.proxy.unknown_upstream = policy;
        self
    }

    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
