use data_service::config::{StoreBackend, StoreConfig};
use secrecy::ExposeSecret;
use serial_test::serial;
use std::time::Duration;

const STORE_VARS: [&str; 7] = [
    "STORE_BACKEND",
    "STORE_HOST",
    "STORE_PORT",
    "STORE_PASSWORD",
    "STORE_DB",
    "STORE_OP_TIMEOUT_MS",
    "STORE_PING_TIMEOUT_MS",
];

fn clear_store_env() {
    for var in STORE_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn store_config_defaults() {
    clear_store_env();

    let config = StoreConfig::from_env().unwrap();

    assert_eq!(config.backend, StoreBackend::Redis);
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 6379);
    assert!(config.password.is_none());
    assert_eq!(config.op_timeout, Duration::from_millis(2000));
    assert_eq!(config.ping_timeout, Duration::from_millis(1000));
}

#[test]
#[serial]
fn store_config_reads_environment() {
    clear_store_env();
    std::env::set_var("STORE_BACKEND", "memory");
    std::env::set_var("STORE_HOST", "cache.internal");
    std::env::set_var("STORE_PORT", "6380");
    std::env::set_var("STORE_PASSWORD", "hunter2");
    std::env::set_var("STORE_DB", "3");

    let config = StoreConfig::from_env().unwrap();
    clear_store_env();

    assert_eq!(config.backend, StoreBackend::Memory);
    assert_eq!(
        config.url().expose_secret(),
        "redis://:hunter2@cache.internal:6380/3"
    );
}

#[test]
#[serial]
fn invalid_values_are_rejected() {
    clear_store_env();
    std::env::set_var("STORE_PORT", "not-a-port");
    assert!(StoreConfig::from_env().is_err());

    clear_store_env();
    std::env::set_var("STORE_OP_TIMEOUT_MS", "0");
    assert!(StoreConfig::from_env().is_err());

    clear_store_env();
}
