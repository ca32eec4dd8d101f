pub mod database;
pub mod lock;
pub mod service;

pub use database::DatabaseArgs;
pub use lock::LockArgs;
pub use service::ServiceParams;
