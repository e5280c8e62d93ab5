use secrecy::{ExposeSecret, Secret};
use service_core::config::{duration_ms_env, get_env, get_optional_env, parse_env, Config as CoreConfig};
use service_core::error::AppError;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: CoreConfig,
    pub store: StoreConfig,
    pub service_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub host: String,
    pub port: u16,
    pub password: Option<Secret<String>>,
    pub db: i64,
    /// Upper bound on any single store command.
    pub op_timeout: Duration,
    /// Upper bound on the readiness ping.
    pub ping_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            op_timeout: Duration::from_millis(2000),
            ping_timeout: Duration::from_millis(1000),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            backend: parse_env("STORE_BACKEND", "redis")?,
            host: get_env("STORE_HOST", Some("127.0.0.1"))?,
            port: parse_env("STORE_PORT", "6379")?,
            password: get_optional_env("STORE_PASSWORD").map(Secret::new),
            db: parse_env("STORE_DB", "0")?,
            op_timeout: duration_ms_env("STORE_OP_TIMEOUT_MS", 2000)?,
            ping_timeout: duration_ms_env("STORE_PING_TIMEOUT_MS", 1000)?,
        })
    }

    /// Connection URL; carries the credential, so it stays wrapped.
    pub fn url(&self) -> Secret<String> {
        let auth = match &self.password {
            Some(password) => format!(":{}@", urlencoding::encode(password.expose_secret())),
            None => String::new(),
        };
        Secret::new(format!(
            "redis://{}{}:{}/{}",
            auth, self.host, self.port, self.db
        ))
    }

    /// URL safe for logs.
    pub fn redacted_url(&self) -> String {
        let auth = if self.password.is_some() { ":***@" } else { "" };
        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.db)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: CoreConfig::load()?,
            store: StoreConfig::from_env()?,
            service_name: get_env("SERVICE_NAME", Some("data-service"))?,
        })
    }
}
