use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix for structured environment overrides, e.g. `CORS_RELAY__PROXY__TIMEOUT=30s`.
pub const ENV_PREFIX: &str = "CORS_RELAY";

/// Plain environment variables kept for compatibility with `.env`-style deployments.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub port: Option<String>,
    pub cors_anywhere_url: Option<String>,
    pub allorigins_url: Option<String>,
    pub corsproxy_url: Option<String>,
    pub cors_origin: Option<String>,
}

impl EnvOverrides {
    /// Read `PORT`, `CORS_ANYWHERE_URL`, `ALLORIGINS_URL`, `CORSPROXY_URL` and `CORS_ORIGIN`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            port: var("PORT"),
            cors_anywhere_url: var("CORS_ANYWHERE_URL"),
            allorigins_url: var("ALLORIGINS_URL"),
            corsproxy_url: var("CORSPROXY_URL"),
            cors_origin: var("CORS_ORIGIN"),
        }
    }

    fn cors_origins(&self) -> Option<Vec<String>> {
        self.cors_origin.as_ref().map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}

/// Load configuration from the process environment and an optional file.
pub fn load_config(config_path: Option<&str>, required: bool) -> Result<ServerConfig> {
    load_config_with(config_path, required, &EnvOverrides::from_env())
}

/// Load configuration, layering defaults, the file, `CORS_RELAY__*` variables and the
/// given legacy overrides (highest precedence).
pub fn load_config_with(
    config_path: Option<&str>,
    required: bool,
    overrides: &EnvOverrides,
) -> Result<ServerConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        if required && !path.exists() {
            eyre::bail!("Configuration file '{}' not found", path.display());
        }
        builder = builder.add_source(File::new(config_path, file_format(path)).required(required));
    }

    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .set_override_option("port", overrides.port.clone())?
        .set_override_option("upstreams.cors_anywhere", overrides.cors_anywhere_url.clone())?
        .set_override_option("upstreams.allorigins", overrides.allorigins_url.clone())?
        .set_override_option("upstreams.corsproxy", overrides.corsproxy_url.clone())?
        .set_override_option("cors.allowed_origins", overrides.cors_origins())?
        .build()
        .with_context(|| format!("Failed to build config from {config_path:?}"))?;

    let server_config: ServerConfig = settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {config_path:?}"))?;

    Ok(server_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::UnknownUpstreamPolicy;

    #[test]
    fn test_no_file_yields_defaults() {
        let config = load_config_with(None, false, &EnvOverrides::default()).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.static_files.index_file, "index.html");
    }

    #[test]
    fn test_load_config_runs_outside_a_runtime() {
        let config = load_config(Some("/definitely/not/here.toml"), false).unwrap();
        assert!(!config.static_files.index_file.is_empty());
    }

    #[test]
    fn test_missing_optional_file_is_ignored() {
        let config = load_config_with(
            Some("/definitely/not/here.toml"),
            false,
            &EnvOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.port, 3001);
    }

    #[test]
    fn test_missing_required_file_fails() {
        let result = load_config_with(
            Some("/definitely/not/here.toml"),
            true,
            &EnvOverrides::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_toml_config() {
        let toml_content = r#"
host = "127.0.0.1"
port = 8088

[ip_cache]
refresh_interval = "30s"

[upstreams]
allorigins = "https://mirror.allorigins.test/"

[proxy]
timeout = "15s"
unknown_upstream = "not_found"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{toml_content}").unwrap();

        let config = load_config_with(
            Some(temp_file.path().to_str().unwrap()),
            true,
            &EnvOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:8088");
        assert_eq!(config.ip_cache.refresh_interval, "30s");
        assert_eq!(
            config.upstreams.allorigins.as_deref(),
            Some("https://mirror.allorigins.test/")
        );
        assert_eq!(config.proxy.unknown_upstream, UnknownUpstreamPolicy::NotFound);
    }

    #[test]
    fn test_load_yaml_config() {
        let yaml_content = r#"
port: 9000
cors:
  allowed_origins:
    - "https://games.example"
  allow_credentials: false
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{yaml_content}").unwrap();

        let config = load_config_with(
            Some(temp_file.path().to_str().unwrap()),
            true,
            &EnvOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cors.allowed_origins, vec!["https://games.example"]);
        assert!(!config.cors.allow_credentials);
    }

    #[test]
    fn test_legacy_env_overrides_win_over_file() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "port = 9000\n").unwrap();

        let overrides = EnvOverrides {
            port: Some("4321".to_string()),
            corsproxy_url: Some("https://corsproxy.internal/".to_string()),
            cors_origin: Some("http://a.test, http://b.test".to_string()),
            ..Default::default()
        };

        let config =
            load_config_with(Some(temp_file.path().to_str().unwrap()), true, &overrides).unwrap();
        assert_eq!(config.port, 4321);
        assert_eq!(
            config.upstreams.corsproxy.as_deref(),
            Some("https://corsproxy.internal/")
        );
        assert_eq!(
            config.cors.allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
