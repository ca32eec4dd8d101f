use crate::cli::RunCmd;
use crate::core::client::database::DatabaseClient;
use crate::core::client::lock::{LockClient, LockService};
use crate::core::client::{MongoDbClient, RedisLockClient};
use crate::core::error::ConsumerCoreError;
use crate::error::ConsumerResult;
use crate::types::params::{DatabaseArgs, LockArgs, ServiceParams};
use crate::worker::processor::{JobProcessor, NoopJobProcessor};
use std::sync::Arc;
use tracing::info;

/// Everything a worker needs, shared as `Arc<Config>`
pub struct Config {
    service_config: ServiceParams,
    database: Arc<dyn DatabaseClient>,
    lock: Arc<dyn LockClient>,
    processor: Arc<dyn JobProcessor>,
}

impl Config {
    pub fn new(
        service_config: ServiceParams,
        database: Arc<dyn DatabaseClient>,
        lock: Arc<dyn LockClient>,
        processor: Arc<dyn JobProcessor>,
    ) -> Self {
        Self { service_config, database, lock, processor }
    }

    /// from_run_cmd - Build the configuration from the `run` command arguments
    /// Validates every parameter group, then connects the MongoDB and Redis clients
    /// # Arguments
    /// * `run_cmd` - The parsed `run` command
    /// # Returns
    /// * `ConsumerResult<Config>` - The configuration, or the first validation / connection error
    pub async fn from_run_cmd(run_cmd: &RunCmd) -> ConsumerResult<Self> {
        let database_args = DatabaseArgs::try_from(run_cmd.mongodb_args.clone())?;
        let lock_args = LockArgs::try_from(run_cmd.redis_args.clone())?;

        let mut service_config = ServiceParams::from(run_cmd.service_args.clone());
        service_config.lock_namespace = lock_args.namespace.clone();
        service_config.lock_ttl = lock_args.ttl;
        service_config.validate()?;

        let database = MongoDbClient::new(&database_args).await.map_err(ConsumerCoreError::from)?;
        info!(
            database = %database_args.database_name,
            collection = %database_args.collection_name,
            "Connected to MongoDB"
        );
        let lock = RedisLockClient::new(&lock_args).map_err(ConsumerCoreError::from)?;
        info!(namespace = %lock_args.namespace, ttl_ms = lock_args.ttl.as_millis() as u64, "Redis lock pool created");

        Ok(Self::new(service_config, Arc::new(database), Arc::new(lock), Arc::new(NoopJobProcessor)))
    }

    pub fn service_config(&self) -> &ServiceParams {
        &self.service_config
    }

    pub fn database(&self) -> &Arc<dyn DatabaseClient> {
        &self.database
    }

    pub fn lock_service(&self) -> LockService {
        LockService::new(self.lock.clone())
    }

    pub fn processor(&self) -> &Arc<dyn JobProcessor> {
        &self.processor
    }
}
