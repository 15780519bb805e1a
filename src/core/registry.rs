//! Upstream registry: the fixed table of relay strategies the front-end can pick from.
//!
//! Every strategy is an [`UpstreamId`] variant and the registry is indexed by it, so adding
//! an upstream is a new variant plus one table row. The table is built once at startup
//! (optionally with base URL overrides from configuration) and never mutated afterwards.
use std::{borrow::Cow, fmt, str::FromStr};

use hyper::Uri;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamOverrides;

/// Common prefix of every proxy route.
pub const PROXY_PREFIX: &str = "/proxy/";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("Unknown upstream: {0}")]
    NotFound(String),

    #[error("Invalid base URL for upstream '{id}': {reason}")]
    InvalidBaseUrl { id: UpstreamId, reason: String },

    #[error("Invalid rewrite rule for upstream '{id}': {source}")]
    InvalidRewrite {
        id: UpstreamId,
        #[source]
        source: regex::Error,
    },

    #[error("Cannot build upstream URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpstreamId {
    CorsAnywhere,
    Allorigins,
    Corsproxy,
    Custom,
    None,
}

impl UpstreamId {
    pub const ALL: [UpstreamId; 5] = [
        UpstreamId::CorsAnywhere,
        UpstreamId::Allorigins,
        UpstreamId::Corsproxy,
        UpstreamId::Custom,
        UpstreamId::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamId::CorsAnywhere => "cors-anywhere",
            UpstreamId::Allorigins => "allorigins",
            UpstreamId::Corsproxy => "corsproxy",
            UpstreamId::Custom => "custom",
            UpstreamId::None => "none",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for UpstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpstreamId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UpstreamId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| RegistryError::NotFound(s.to_string()))
    }
}

/// How requests for an upstream are carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
    /// Prefix-routed, bodies streamed through
    Streaming,
    /// Query-routed, upstream body read in full then relayed
    SingleShot,
    /// The browser loads the page itself; the gateway is not involved
    Direct,
}

/// `pattern -> replacement` applied to the incoming path before it is appended to the base URL.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// Rule removing a literal leading prefix.
    pub fn strip_prefix(prefix: &str) -> Result<Self, regex::Error> {
        Self::new(&format!("^{}", regex::escape(prefix)), "")
    }

    pub fn apply<'a>(&self, path: &'a str) -> Cow<'a, str> {
        self.pattern.replace(path, self.replacement.as_str())
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub id: UpstreamId,
    pub base_url: Option<Url>,
    pub path_prefix: String,
    pub rewrite: Option<RewriteRule>,
    pub mode: ForwardMode,
}

impl UpstreamTarget {
    fn streaming(id: UpstreamId, base_url: &str) -> RegistryResult<Self> {
        let url = Url::parse(base_url).map_err(|e| RegistryError::InvalidBaseUrl {
            id,
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
            return Err(RegistryError::InvalidBaseUrl {
                id,
                reason: format!("'{base_url}' is not an absolute http(s) URL"),
            });
        }

        let path_prefix = format!("{PROXY_PREFIX}{id}");
        let rewrite = RewriteRule::strip_prefix(&path_prefix)
            .map_err(|source| RegistryError::InvalidRewrite { id, source })?;

        Ok(Self {
            id,
            base_url: Some(url),
            path_prefix,
            rewrite: Some(rewrite),
            mode: ForwardMode::Streaming,
        })
    }

    fn without_base(id: UpstreamId, mode: ForwardMode) -> Self {
        Self {
            id,
            base_url: None,
            path_prefix: format!("{PROXY_PREFIX}{id}"),
            rewrite: None,
            mode,
        }
    }

    /// `true` when `path` is the bare prefix or continues it with `/`.
    pub fn matches_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Build the outbound URI for an incoming `path?query`: the rewrite rule is applied to
    /// the path and the remainder appended verbatim to the base URL.
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> RegistryResult<Uri> {
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| RegistryError::InvalidUri {
                uri: path.to_string(),
                reason: format!("upstream '{}' has no base URL", self.id),
            })?;

        let rest = match &self.rewrite {
            Some(rule) => rule.apply(path),
            None => Cow::Borrowed(path),
        };
        let rest = if rest.starts_with('/') {
            rest
        } else {
            Cow::Owned(format!("/{rest}"))
        };

        let mut uri = format!("{}{}", base.as_str().trim_end_matches('/'), rest);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            uri.push('?');
            uri.push_str(query);
        }

        uri.parse::<Uri>().map_err(|e| RegistryError::InvalidUri {
            uri,
            reason: e.to_string(),
        })
    }
}

/// Result of matching a request path against the `/proxy/` namespace.
#[derive(Debug, Clone, Copy)]
pub enum PathMatch<'a> {
    Streaming(&'a UpstreamTarget),
    SingleShot(&'a UpstreamTarget),
    /// Under `/proxy/` but naming no streaming or single-shot upstream
    Unknown,
    /// Outside `/proxy/`
    NotProxy,
}

#[derive(Debug, Clone)]
pub struct UpstreamRegistry {
    targets: Vec<UpstreamTarget>,
}

impl UpstreamRegistry {
    pub const CORS_ANYWHERE_URL: &'static str = "https://cors-anywhere.herokuapp.com/";
    pub const ALLORIGINS_URL: &'static str = "https://api.allorigins.win/";
    pub const CORSPROXY_URL: &'static str = "https://corsproxy.io/";

    /// The compiled-in table.
    pub fn builtin() -> RegistryResult<Self> {
        Self::with_overrides(&UpstreamOverrides::default())
    }

    /// The compiled-in table with base URLs replaced where configuration says so.
    pub fn with_overrides(overrides: &UpstreamOverrides) -> RegistryResult<Self> {
        let pick = |value: &Option<String>, default: &'static str| {
            value.clone().unwrap_or_else(|| default.to_string())
        };

        // Row order must follow UpstreamId declaration order.
        let targets = vec![
            UpstreamTarget::streaming(
                UpstreamId::CorsAnywhere,
                &pick(&overrides.cors_anywhere, Self::CORS_ANYWHERE_URL),
            )?,
            UpstreamTarget::streaming(
                UpstreamId::Allorigins,
                &pick(&overrides.allorigins, Self::ALLORIGINS_URL),
            )?,
            UpstreamTarget::streaming(
                UpstreamId::Corsproxy,
                &pick(&overrides.corsproxy, Self::CORSPROXY_URL),
            )?,
            UpstreamTarget::without_base(UpstreamId::Custom, ForwardMode::SingleShot),
            UpstreamTarget::without_base(UpstreamId::None, ForwardMode::Direct),
        ];

        Ok(Self { targets })
    }

    /// Look an upstream up by its wire identifier.
    pub fn lookup(&self, id: &str) -> RegistryResult<&UpstreamTarget> {
        let id: UpstreamId = id.parse()?;
        Ok(self.get(id))
    }

    pub fn get(&self, id: UpstreamId) -> &UpstreamTarget {
        &self.targets[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpstreamTarget> {
        self.targets.iter()
    }

    /// Classify a request path.
    pub fn match_path(&self, path: &str) -> PathMatch<'_> {
        if !path.starts_with(PROXY_PREFIX) {
            return PathMatch::NotProxy;
        }

        let custom = self.get(UpstreamId::Custom);
        // A single trailing slash is tolerated, as non-strict routers do.
        if path.strip_suffix('/').unwrap_or(path) == custom.path_prefix {
            return PathMatch::SingleShot(custom);
        }

        self.targets
            .iter()
            .filter(|t| t.mode == ForwardMode::Streaming)
            .find(|t| t.matches_path(path))
            .map(PathMatch::Streaming)
            .unwrap_or(PathMatch::Unknown)
    }
}
