use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Settings shared by every service, read from `APP__*` variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.shutdown_timeout_secs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "APP__SHUTDOWN_TIMEOUT_SECS must be greater than 0"
            )));
        }
        Ok(())
    }
}

/// Read an environment variable, falling back to `default` when unset.
pub fn get_env(key: &str, default: Option<&str>) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => default.map(str::to_string).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("{} is required but not set", key))
        }),
    }
}

/// Read an optional environment variable; empty values count as unset.
pub fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse an environment variable.
pub fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default))?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}

/// Read a millisecond duration; zero is rejected.
pub fn duration_ms_env(key: &str, default_ms: u64) -> Result<Duration, AppError> {
    let ms: u64 = parse_env(key, &default_ms.to_string())?;
    if ms == 0 {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be greater than 0",
            key
        )));
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u16 = parse_env("SERVICE_CORE_TEST_SURELY_UNSET_PORT", "6379").unwrap();
        assert_eq!(value, 6379);
    }

    #[test]
    fn missing_required_variable_is_config_error() {
        let err = get_env("SERVICE_CORE_TEST_SURELY_UNSET_KEY", None).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err = duration_ms_env("SERVICE_CORE_TEST_SURELY_UNSET_MS", 0).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
