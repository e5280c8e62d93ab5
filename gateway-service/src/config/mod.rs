use crate::services::retry::RetryConfig;
use service_core::config::{duration_ms_env, get_env, parse_env, Config as CoreConfig};
use service_core::error::AppError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: CoreConfig,
    pub forward: ForwardConfig,
    pub service_name: String,
}

/// Outbound settings for calls to the data service.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Base URL of the data service, without a trailing slash.
    pub base_url: String,
    /// Ceiling on a single forwarded call.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Ceiling on the readiness probe.
    pub health_timeout: Duration,
    pub health_path: String,
    pub retry: RetryConfig,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            request_timeout: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(2000),
            health_timeout: Duration::from_millis(2000),
            health_path: "/health".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl ForwardConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = get_env("DATA_SERVICE_URL", Some("http://127.0.0.1:8081"))?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATA_SERVICE_URL must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let mut health_path = get_env("DATA_SERVICE_HEALTH_PATH", Some("/health"))?;
        if !health_path.starts_with('/') {
            health_path.insert(0, '/');
        }

        let retry = RetryConfig {
            max_retries: parse_env("FORWARD_MAX_RETRIES", "0")?,
            initial_backoff: duration_ms_env("FORWARD_INITIAL_BACKOFF_MS", 100)?,
            max_backoff: duration_ms_env("FORWARD_MAX_BACKOFF_MS", 2000)?,
            ..RetryConfig::default()
        };

        Ok(Self {
            base_url,
            request_timeout: duration_ms_env("FORWARD_TIMEOUT_MS", 5000)?,
            connect_timeout: duration_ms_env("FORWARD_CONNECT_TIMEOUT_MS", 2000)?,
            health_timeout: duration_ms_env("HEALTH_PROBE_TIMEOUT_MS", 2000)?,
            health_path,
            retry,
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: CoreConfig::load()?,
            forward: ForwardConfig::from_env()?,
            service_name: get_env("SERVICE_NAME", Some("gateway-service"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_retry() {
        let config = ForwardConfig::default();
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.health_timeout, Duration::from_secs(2));
        assert_eq!(config.health_path, "/health");
    }
}
