pub mod database;
pub mod lock;

pub use database::{DatabaseClient, MongoDbClient};
pub use lock::{LockClient, RedisLockClient};
