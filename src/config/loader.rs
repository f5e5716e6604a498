//! Configuration loading from disk.

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Config, LogFormat, LogOutput};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value in {var}: {reason}")]
    EnvOverride { var: String, reason: String },

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
}

/// All semantic errors found in one validation pass.
#[derive(Debug)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Load, override, and validate configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut config: Config =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;

    validate_config(&config).map_err(|errors| ConfigError::Validation(ValidationErrors(errors)))?;

    Ok(config)
}

/// Apply `LB_`-prefixed environment overrides onto a parsed config.
///
/// Variables map onto config keys through an explicit table; keys not listed
/// here are configurable only through the file.
fn apply_env_overrides<F>(config: &mut Config, get: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = get("LB_SERVER_ADDRESS") {
        config.server.address = addr;
    }
    if let Some(addr) = get("LB_SERVER_ADMIN_ADDRESS") {
        config.server.admin_address = addr;
    }
    if let Some(v) = get("LB_SERVER_ADMIN_ENABLE") {
        config.server.admin_enable = parse_env("LB_SERVER_ADMIN_ENABLE", &v)?;
    }
    if let Some(v) = get("LB_SERVER_READ_TIMEOUT") {
        config.server.read_timeout = parse_env("LB_SERVER_READ_TIMEOUT", &v)?;
    }
    if let Some(v) = get("LB_SERVER_WRITE_TIMEOUT") {
        config.server.write_timeout = parse_env("LB_SERVER_WRITE_TIMEOUT", &v)?;
    }
    if let Some(v) = get("LB_SERVER_IDLE_TIMEOUT") {
        config.server.idle_timeout = parse_env("LB_SERVER_IDLE_TIMEOUT", &v)?;
    }
    if let Some(v) = get("LB_SERVER_UPSTREAM_TIMEOUT") {
        config.server.upstream_timeout = parse_env("LB_SERVER_UPSTREAM_TIMEOUT", &v)?;
    }
    if let Some(v) = get("LB_SERVER_SHUTDOWN_GRACE") {
        config.server.shutdown_grace = parse_env("LB_SERVER_SHUTDOWN_GRACE", &v)?;
    }
    if let Some(level) = get("LB_LOG_LEVEL") {
        config.monitoring.logging.level = level;
    }
    if let Some(v) = get("LB_LOG_FORMAT") {
        config.monitoring.logging.format = match v.as_str() {
            "json" => LogFormat::Json,
            "console" => LogFormat::Console,
            other => {
                return Err(ConfigError::EnvOverride {
                    var: "LB_LOG_FORMAT".to_string(),
                    reason: format!("unknown format '{other}'"),
                })
            }
        };
    }
    if let Some(v) = get("LB_LOG_OUTPUT") {
        config.monitoring.logging.output = match v.as_str() {
            "stdout" => LogOutput::Stdout,
            "stderr" => LogOutput::Stderr,
            other => {
                return Err(ConfigError::EnvOverride {
                    var: "LB_LOG_OUTPUT".to_string(),
                    reason: format!("unknown output '{other}'"),
                })
            }
        };
    }
    if let Some(v) = get("LB_PROMETHEUS_ENABLED") {
        config.monitoring.prometheus.enabled = parse_env("LB_PROMETHEUS_ENABLED", &v)?;
    }
    if let Some(v) = get("LB_PROMETHEUS_PORT") {
        config.monitoring.prometheus.port = parse_env("LB_PROMETHEUS_PORT", &v)?;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::EnvOverride {
        var: var.to_string(),
        reason: e.to_string(),
    })
}
