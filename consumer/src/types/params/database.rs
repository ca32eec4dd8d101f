use crate::cli::database::mongodb::MongoDBCliArgs;
use crate::error::ConsumerError;

#[derive(Debug, Clone)]
pub struct DatabaseArgs {
    pub connection_uri: String,
    pub database_name: String,
    /// The watched collection holding the records
    pub collection_name: String,
}

impl TryFrom<MongoDBCliArgs> for DatabaseArgs {
    type Error = ConsumerError;

    fn try_from(args: MongoDBCliArgs) -> Result<Self, Self::Error> {
        let params = Self {
            connection_uri: args.mongodb_connection_url,
            database_name: args.mongodb_database_name,
            collection_name: args.mongodb_collection_name,
        };
        for (name, value) in [
            ("mongodb_connection_url", &params.connection_uri),
            ("mongodb_database_name", &params.database_name),
            ("mongodb_collection_name", &params.collection_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConsumerError::ConfigError(format!("{name} must not be empty")));
            }
        }
        Ok(params)
    }
}
