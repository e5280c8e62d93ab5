pub mod metrics;
pub mod redis;
pub mod repository;
pub mod store;

pub use self::redis::RedisStore;
pub use repository::{RecordRepository, RepositoryError};
pub use store::{KvStore, MemoryStore, StoreError};
