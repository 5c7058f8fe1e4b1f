//! Environment configuration.
//!
//! The runtime is configured entirely through process environment
//! variables set by the host. Required values are resolved once at cold
//! start and missing ones fail fast.

use std::path::PathBuf;

use thiserror::Error;

use crate::envelope::{ErrorEnvelope, ErrorKind};

/// Endpoint of the Runtime API, as `host:port`.
pub const RUNTIME_API_VAR: &str = "AWS_LAMBDA_RUNTIME_API";
/// Handler identifier, as `<module>.<export>`.
pub const HANDLER_VAR: &str = "_HANDLER";
/// Directory the deployed code nominally lives under.
pub const TASK_ROOT_VAR: &str = "LAMBDA_TASK_ROOT";
/// Name of the deployed function.
pub const FUNCTION_NAME_VAR: &str = "AWS_LAMBDA_FUNCTION_NAME";
/// Version of the deployed function.
pub const FUNCTION_VERSION_VAR: &str = "AWS_LAMBDA_FUNCTION_VERSION";
/// Configured memory limit, in megabytes.
pub const MEMORY_SIZE_VAR: &str = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE";

/// Raised when a required environment variable is absent or empty.
#[derive(Debug, Error)]
#[error("missing required environment variable {name}")]
pub struct ConfigError {
    pub name: String,
}

impl From<ConfigError> for ErrorEnvelope {
    fn from(err: ConfigError) -> Self {
        ErrorEnvelope::new(ErrorKind::Config, err.to_string())
    }
}

/// Resolve a required environment variable. Empty counts as absent.
pub fn resolve(name: &str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError {
            name: name.to_string(),
        }),
    }
}

/// Resolve an optional environment variable, falling back to a default.
pub fn resolve_or(name: &str, fallback: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}

/// Runtime configuration resolved from the environment at cold start.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Runtime API endpoint, `host:port`.
    pub runtime_api: String,
    /// Handler identifier, `<module>.<export>`.
    pub handler_id: String,
    /// Task root directory.
    pub task_root: PathBuf,
    pub function_name: String,
    pub function_version: String,
    pub memory_limit_in_mb: i32,
}

impl RuntimeConfig {
    /// Read the full configuration, failing on the first missing required
    /// variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            runtime_api: resolve(RUNTIME_API_VAR)?,
            handler_id: resolve(HANDLER_VAR)?,
            task_root: PathBuf::from(resolve(TASK_ROOT_VAR)?),
            function_name: resolve_or(FUNCTION_NAME_VAR, "unknown"),
            function_version: resolve_or(FUNCTION_VERSION_VAR, "$LATEST"),
            memory_limit_in_mb: resolve_or(MEMORY_SIZE_VAR, "128").parse().unwrap_or(128),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_present_variable() {
        std::env::set_var("LAMBENT_TEST_RESOLVE_SET", "value");
        assert_eq!(resolve("LAMBENT_TEST_RESOLVE_SET").unwrap(), "value");
    }

    #[test]
    fn test_resolve_missing_variable() {
        std::env::remove_var("LAMBENT_TEST_RESOLVE_MISSING");
        let err = resolve("LAMBENT_TEST_RESOLVE_MISSING").unwrap_err();
        assert_eq!(err.name, "LAMBENT_TEST_RESOLVE_MISSING");
        assert!(err.to_string().contains("LAMBENT_TEST_RESOLVE_MISSING"));
    }

    #[test]
    fn test_resolve_empty_counts_as_missing() {
        std::env::set_var("LAMBENT_TEST_RESOLVE_EMPTY", "");
        assert!(resolve("LAMBENT_TEST_RESOLVE_EMPTY").is_err());
    }

    #[test]
    fn test_resolve_or_falls_back() {
        std::env::remove_var("LAMBENT_TEST_RESOLVE_OR");
        assert_eq!(resolve_or("LAMBENT_TEST_RESOLVE_OR", "fallback"), "fallback");
        std::env::set_var("LAMBENT_TEST_RESOLVE_OR", "set");
        assert_eq!(resolve_or("LAMBENT_TEST_RESOLVE_OR", "fallback"), "set");
    }

    #[test]
    fn test_config_error_maps_to_config_envelope() {
        let envelope = ErrorEnvelope::from(ConfigError {
            name: HANDLER_VAR.to_string(),
        });
        assert_eq!(envelope.error_type(), "ConfigError");
        assert!(envelope.message.contains("_HANDLER"));
    }

    #[test]
    fn test_from_env_requires_the_core_variables() {
        std::env::remove_var(RUNTIME_API_VAR);
        std::env::remove_var(HANDLER_VAR);
        std::env::remove_var(TASK_ROOT_VAR);
        let err = RuntimeConfig::from_env().unwrap_err();
        assert_eq!(err.name, RUNTIME_API_VAR);

        std::env::set_var(RUNTIME_API_VAR, "127.0.0.1:9001");
        std::env::set_var(HANDLER_VAR, "app.handler");
        std::env::set_var(TASK_ROOT_VAR, "/var/task");
        let config = RuntimeConfig::from_env().unwrap();
        assert_eq!(config.runtime_api, "127.0.0.1:9001");
        assert_eq!(config.handler_id, "app.handler");
        assert_eq!(config.task_root, PathBuf::from("/var/task"));
        assert_eq!(config.function_name, "unknown");
        assert_eq!(config.function_version, "$LATEST");
        assert_eq!(config.memory_limit_in_mb, 128);

        std::env::remove_var(RUNTIME_API_VAR);
        std::env::remove_var(HANDLER_VAR);
        std::env::remove_var(TASK_ROOT_VAR);
    }
}
