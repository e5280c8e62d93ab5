use crate::config::StoreConfig;
use crate::services::store::{KvStore, StoreError};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, FromRedisValue, Script};
use secrecy::ExposeSecret;
use service_core::lifecycle::ManagedResource;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// KEYS: entries, index. ARGV: id, value, unique.
const INSERT_UNIQUE_SCRIPT: &str = r#"
local owner = redis.call('HGET', KEYS[2], ARGV[3])
if owner and redis.call('HEXISTS', KEYS[1], owner) == 1 then
  return 0
end
redis.call('HSET', KEYS[2], ARGV[3], ARGV[1])
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return 1
"#;

/// KEYS: entries, index. ARGV: id, unique.
const REMOVE_UNIQUE_SCRIPT: &str = r#"
if redis.call('HDEL', KEYS[1], ARGV[1]) == 0 then
  return 0
end
if redis.call('HGET', KEYS[2], ARGV[2]) == ARGV[1] then
  redis.call('HDEL', KEYS[2], ARGV[2])
end
return 1
"#;

/// Redis-backed store.
///
/// The connection is established lazily: if the store is down at startup the
/// service still comes up and the next command retries the connection.
pub struct RedisStore {
    client: Client,
    manager: Mutex<Option<ConnectionManager>>,
    op_timeout: Duration,
    closed: AtomicBool,
    insert_unique_script: Script,
    remove_unique_script: Script,
}

impl RedisStore {
    pub async fn new(config: &StoreConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.redacted_url(), "Connecting to Redis");
        let client = Client::open(config.url().expose_secret().as_str())?;

        let store = Self {
            client,
            manager: Mutex::new(None),
            op_timeout: config.op_timeout,
            closed: AtomicBool::new(false),
            insert_unique_script: Script::new(INSERT_UNIQUE_SCRIPT),
            remove_unique_script: Script::new(REMOVE_UNIQUE_SCRIPT),
        };

        match store.bounded(store.connection()).await {
            Ok(_) => tracing::info!("Successfully connected to Redis"),
            Err(e) => tracing::warn!(
                error = %e,
                "Redis not reachable at startup, continuing degraded"
            ),
        }

        Ok(store)
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }

        let mut guard = self.manager.lock().await;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }

        let manager = self.client.get_connection_manager().await?;
        *guard = Some(manager.clone());
        Ok(manager)
    }

    /// Run `op` under the per-operation deadline. The deadline covers waiting
    /// for the connection lock and connecting as well as the command itself.
    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
    }

    async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            cmd.query_async(&mut conn).await.map_err(StoreError::from)
        })
        .await
    }

    async fn invoke<T: FromRedisValue>(
        &self,
        invocation: &redis::ScriptInvocation<'_>,
    ) -> Result<T, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            invocation
                .invoke_async(&mut conn)
                .await
                .map_err(StoreError::from)
        })
        .await
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let _: String = self.query(&redis::cmd("PING")).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.query(redis::cmd("SET").arg(key).arg(value)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.query(redis::cmd("EXISTS").arg(key)).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.query(redis::cmd("HGET").arg(key).arg(field)).await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let _: i64 = self
            .query(redis::cmd("HSET").arg(key).arg(field).arg(value))
            .await?;
        Ok(())
    }

    async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        self.query(redis::cmd("HSETNX").arg(key).arg(field).arg(value))
            .await
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.query(redis::cmd("HDEL").arg(key).arg(field)).await?;
        Ok(removed > 0)
    }

    async fn hash_values(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.query(redis::cmd("HVALS").arg(key)).await
    }

    async fn insert_unique(
        &self,
        key: &str,
        id: &str,
        value: &str,
        index: &str,
        unique: &str,
    ) -> Result<bool, StoreError> {
        let mut invocation = self.insert_unique_script.key(key);
        invocation.key(index).arg(id).arg(value).arg(unique);
        self.invoke(&invocation).await
    }

    async fn remove_unique(
        &self,
        key: &str,
        id: &str,
        index: &str,
        unique: &str,
    ) -> Result<bool, StoreError> {
        let mut invocation = self.remove_unique_script.key(key);
        invocation.key(index).arg(id).arg(unique);
        self.invoke(&invocation).await
    }
}

#[async_trait]
impl ManagedResource for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the manager closes the multiplexed connection.
        self.manager.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::net::TcpListener;

    fn unreachable_config() -> StoreConfig {
        StoreConfig {
            // Reserved TEST-NET address; nothing listens there.
            host: "192.0.2.1".to_string(),
            op_timeout: Duration::from_millis(200),
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn starts_degraded_when_store_is_unreachable() {
        let store = RedisStore::new(&unreachable_config()).await.unwrap();
        let started = std::time::Instant::now();

        assert!(store.ping().await.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn closed_store_rejects_commands() {
        let store = RedisStore::new(&unreachable_config()).await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(store.get("k").await, Err(StoreError::Closed)));
    }

    /// Accepts connections and never answers, so the SELECT handshake hangs.
    async fn silent_listener() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        port
    }

    #[tokio::test]
    async fn concurrent_commands_each_respect_the_deadline_when_store_hangs() {
        let config = StoreConfig {
            host: "127.0.0.1".to_string(),
            port: silent_listener().await,
            db: 1,
            op_timeout: Duration::from_millis(200),
            ..StoreConfig::default()
        };
        let store = Arc::new(RedisStore::new(&config).await.unwrap());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = store.ping().await;
                    (result, started.elapsed())
                })
            })
            .collect();

        for task in tasks {
            let (result, elapsed) = task.await.unwrap();
            assert!(matches!(result, Err(StoreError::Timeout(_))));
            assert!(
                elapsed < Duration::from_millis(500),
                "command took {:?}",
                elapsed
            );
        }
    }
}
