pub mod app_config;
pub mod memory_repo;
pub mod redis_repo;

pub use app_config::{Config, StoreBackend};
pub use memory_repo::InMemoryRecordStore;
pub use redis_repo::RedisRecordStore;
