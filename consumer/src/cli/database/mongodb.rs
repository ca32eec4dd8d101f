use crate::types::constant::{DEFAULT_COLLECTION_NAME, DEFAULT_DATABASE_NAME};
use clap::Args;

/// Parameters used to config MongoDB.
#[derive(Debug, Clone, Args)]
pub struct MongoDBCliArgs {
    /// The connection string to the MongoDB server. Change streams need a replica set.
    #[arg(env = "CHANGESTREAM_MONGODB_CONNECTION_URL", long, default_value = "mongodb://localhost:27017")]
    pub mongodb_connection_url: String,

    /// The name of the database.
    #[arg(env = "CHANGESTREAM_MONGODB_DATABASE_NAME", long, default_value = DEFAULT_DATABASE_NAME)]
    pub mongodb_database_name: String,

    /// The name of the watched collection.
    #[arg(env = "CHANGESTREAM_MONGODB_COLLECTION_NAME", long, default_value = DEFAULT_COLLECTION_NAME)]
    pub mongodb_collection_name: String,
}
