//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject placeholder secrets on enabled surfaces
//!
//! Returns all validation errors, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::CrmConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];
const PLACEHOLDER_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Validate a parsed configuration.
pub fn validate_config(config: &CrmConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut check = |ok: bool, field: &'static str, message: &str| {
        if !ok {
            errors.push(ValidationError {
                field,
                message: message.to_string(),
            });
        }
    };

    check(
        config.listener.bind_address.parse::<SocketAddr>().is_ok(),
        "listener.bind_address",
        "must be a socket address such as 0.0.0.0:8080",
    );
    if let Some(tls) = &config.listener.tls {
        check(!tls.cert_path.is_empty(), "listener.tls.cert_path", "must not be empty");
        check(!tls.key_path.is_empty(), "listener.tls.key_path", "must not be empty");
    }

    check(config.timeouts.request_secs > 0, "timeouts.request_secs", "must be greater than 0");

    if config.rate_limit.enabled {
        check(
            config.rate_limit.requests_per_second > 0,
            "rate_limit.requests_per_second",
            "must be greater than 0",
        );
        check(config.rate_limit.burst_size > 0, "rate_limit.burst_size", "must be greater than 0");
        check(
            config.rate_limit.login_per_second > 0,
            "rate_limit.login_per_second",
            "must be greater than 0",
        );
    }

    check(config.retries.max_attempts >= 1, "retries.max_attempts", "must be at least 1");
    check(
        config.retries.base_delay_ms <= config.retries.max_delay_ms,
        "retries.base_delay_ms",
        "must not exceed retries.max_delay_ms",
    );

    check(
        LOG_FORMATS.contains(&config.observability.log_format.as_str()),
        "observability.log_format",
        "must be one of pretty, compact, json",
    );
    if config.observability.metrics_enabled {
        check(
            config.observability.metrics_address.parse::<SocketAddr>().is_ok(),
            "observability.metrics_address",
            "must be a socket address",
        );
    }

    if config.admin.enabled {
        check(
            config.admin.api_key != PLACEHOLDER_KEY && config.admin.api_key.len() >= 16,
            "admin.api_key",
            "must be set to a secret of at least 16 characters",
        );
    }

    check(config.security.max_body_size > 0, "security.max_body_size", "must be greater than 0");
    for origin in &config.security.cors_origins {
        check(
            url::Url::parse(origin).is_ok(),
            "security.cors_origins",
            format!("`{origin}` is not a valid origin URL").as_str(),
        );
    }

    check(config.auth.session_ttl_secs > 0, "auth.session_ttl_secs", "must be greater than 0");
    check(config.auth.min_password_len >= 6, "auth.min_password_len", "must be at least 6");
    if let Some(bootstrap) = &config.auth.bootstrap {
        check(bootstrap.email.contains('@'), "auth.bootstrap.email", "must be an email address");
        check(
            bootstrap.password.len() >= config.auth.min_password_len,
            "auth.bootstrap.password",
            "is shorter than auth.min_password_len",
        );
    }

    check(
        config.storage.max_attachment_bytes > 0,
        "storage.max_attachment_bytes",
        "must be greater than 0",
    );
    check(
        !config.storage.allowed_content_types.is_empty(),
        "storage.allowed_content_types",
        "must list at least one content type",
    );

    check(
        config.realtime.channel_capacity > 0,
        "realtime.channel_capacity",
        "must be greater than 0",
    );
    check(
        config.realtime.max_connections_per_user > 0,
        "realtime.max_connections_per_user",
        "must be greater than 0",
    );
    check(config.maintenance.interval_secs > 0, "maintenance.interval_secs", "must be greater than 0");

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BootstrapConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CrmConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_collected() {
        let mut config = CrmConfig::default();
        config.listener.bind_address = "nope".into();
        config.retries.max_attempts = 0;
        config.admin.enabled = true;
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "retries.max_attempts",
                "observability.log_format",
                "admin.api_key"
            ]
        );
    }

    #[test]
    fn test_bootstrap_password_must_meet_minimum() {
        let mut config = CrmConfig::default();
        config.auth.bootstrap = Some(BootstrapConfig {
            email: "ops@example.com".into(),
            password: "short".into(),
            name: "Ops".into(),
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "auth.bootstrap.password");
    }
}
