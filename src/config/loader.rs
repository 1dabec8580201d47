//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ResilienceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ResilienceConfig, ConfigError> {
    let config: ResilienceConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.store.failure_threshold, 3);
        assert_eq!(config.volatile.max_per_thread, 100);
        assert_eq!(config.volatile.max_age_hours, 24);
        assert_eq!(config.recovery.max_attempts, 3);
        assert_eq!(config.components.len(), 3);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[observability]
log_format = "json"
metrics_enabled = false

[store]
path = "/var/lib/checkpoints"
fallback_enabled = false

[[components]]
name = "cache"
probe_address = "127.0.0.1:6379"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.store.path, "/var/lib/checkpoints");
        assert!(!config.store.fallback_enabled);
        assert_eq!(config.store.failure_threshold, 3);
        assert_eq!(config.components.len(), 1);
        assert_eq!(config.components[0].probe_address.as_deref(), Some("127.0.0.1:6379"));
    }

    #[test]
    fn test_validation_errors_surface() {
        let err = parse_config("[store]\nfailure_threshold = 0\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors[0].field, "store.failure_threshold"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/degraded-mode.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
