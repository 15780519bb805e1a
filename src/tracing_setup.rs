use eyre::{Result, WrapErr};
use hyper::{Method, Uri};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Build the level filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}")),
    }
}

/// Initialize logging from configuration: JSON lines for production, pretty output otherwise.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = env_filter(&config.level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if config.json {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(false).with_span_list(true))
            .try_init()
            .wrap_err("Failed to install JSON log subscriber")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install console log subscriber")?;
    }

    tracing::info!(
        level = %config.level,
        json = config.json,
        "Logging initialized"
    );
    Ok(())
}

/// Create a request-scoped tracing span
pub fn create_request_span(method: &Method, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = %method,
        http.path = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Create a span around one outbound call to an upstream
pub fn create_upstream_span(upstream: &str, uri: &Uri, method: &Method) -> tracing::Span {
    tracing::info_span!(
        "upstream_request",
        upstream = upstream,
        upstream.url = %uri,
        http.method = %method,
        http.status_code = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        // Only meaningful without RUST_LOG overriding the configured level.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter("info,cors_relay=loud").is_err());
        }
    }

    #[test]
    fn test_valid_level_directives() {
        assert!(env_filter("debug").is_ok());
        assert!(env_filter("info,cors_relay=trace").is_ok());
    }

    #[test]
    fn test_spans_accept_late_status() {
        let span = create_upstream_span(
            "allorigins",
            &"https://api.allorigins.win/raw".parse().unwrap(),
            &Method::GET,
        );
        span.record("http.status_code", 200u16);

        let span = create_request_span(&Method::POST, "/proxy/corsproxy", "req-1");
        span.record("duration_ms", 12u64);
    }
}
