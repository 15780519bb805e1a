use std::net::SocketAddr;

use http::HeaderValue;

use crate::config::models::{CorsConfig, ServerConfig, UpstreamOverrides};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem at once.
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr()) {
            errors.push(e);
        }

        errors.extend(Self::validate_upstreams(&config.upstreams));

        if let Err(e) = Self::validate_duration(
            "ip_cache.refresh_interval",
            &config.ip_cache.refresh_interval,
        ) {
            errors.push(e);
        }

        if let Some(timeout) = &config.proxy.timeout {
            if let Err(e) = Self::validate_duration("proxy.timeout", timeout) {
                errors.push(e);
            }
        }

        errors.extend(Self::validate_cors(&config.cors));

        if config.static_files.index_file.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "static_files.index_file".to_string(),
                message: "Entry document name must not be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "host must be an IP address (e.g. '127.0.0.1' or '0.0.0.0')".to_string(),
            });
        }
        Ok(())
    }

    fn validate_upstreams(overrides: &UpstreamOverrides) -> Vec<ValidationError> {
        [
            ("upstreams.cors_anywhere", &overrides.cors_anywhere),
            ("upstreams.allorigins", &overrides.allorigins),
            ("upstreams.corsproxy", &overrides.corsproxy),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|url| (field, url)))
        .filter_map(|(field, url)| Self::validate_url(url, field).err())
        .collect()
    }

    /// Validate URL format
    pub(crate) fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(d) if d.is_zero() => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Duration must be greater than zero".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid duration '{value}': {e}"),
            }),
        }
    }

    fn validate_cors(cors: &CorsConfig) -> Vec<ValidationError> {
        cors.allowed_origins
            .iter()
            .filter(|origin| HeaderValue::from_str(origin).is_err())
            .map(|origin| ValidationError::InvalidField {
                field: "cors.allowed_origins".to_string(),
                message: format!("'{origin}' is not a valid header value"),
            })
            .collect()
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
