use crate::cli::database::mongodb::MongoDBCliArgs;
use crate::cli::lock::redis::RedisCliArgs;
use crate::cli::service::ServiceCliArgs;
use clap::{Args, Parser, Subcommand};

pub mod database;
pub mod lock;
pub mod service;

#[derive(Parser, Debug)]
#[command(
    name = "changestream-consumer",
    about = "Single-consumer job processor over a MongoDB change stream",
    long_about = "Watches a MongoDB collection for `queued` and retryable `failed` records, claims each one with a \
    Redis TTL lock, marks it `completed`, and periodically catches up on records the change stream missed.",
    after_help = "Examples:\n  \
    changestream-consumer run --mongodb-connection-url mongodb://localhost:27017/?replicaSet=rs0\n  \
    changestream-consumer run --observation-window-secs 60 --catchup-order identifier"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the consumer
    Run {
        #[command(flatten)]
        run_command: Box<RunCmd>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunCmd {
    #[clap(flatten)]
    pub mongodb_args: MongoDBCliArgs,

    #[clap(flatten)]
    pub redis_args: RedisCliArgs,

    #[clap(flatten)]
    pub service_args: ServiceCliArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::jobs::types::CatchupOrder;
    use rstest::rstest;

    #[test]
    fn run_command_uses_defaults() {
        let cli = Cli::try_parse_from(["changestream-consumer", "run"]).unwrap();
        let Commands::Run { run_command } = cli.command;

        assert_eq!(run_command.mongodb_args.mongodb_database_name, "sample_airbnb");
        assert_eq!(run_command.mongodb_args.mongodb_collection_name, "listingsAndReviews");
        assert_eq!(run_command.redis_args.lock_namespace, "handleEvents");
        assert_eq!(run_command.redis_args.lock_ttl_ms, 1000);
        assert_eq!(run_command.service_args.retry_limit, 2);
        assert_eq!(run_command.service_args.catchup_order, CatchupOrder::CreatedAt);
        assert!(run_command.service_args.resume_from_last_completed);
        assert!(run_command.service_args.observation_window_secs.is_none());
        assert_eq!(run_command.service_args.catchup_concurrency, 16);
    }

    #[test]
    fn run_command_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "changestream-consumer",
            "run",
            "--catchup-order",
            "identifier",
            "--retry-limit",
            "5",
            "--resume-from-last-completed",
            "false",
            "--sweep-interval-secs",
            "30",
        ])
        .unwrap();
        let Commands::Run { run_command } = cli.command;

        assert_eq!(run_command.service_args.catchup_order, CatchupOrder::Identifier);
        assert_eq!(run_command.service_args.retry_limit, 5);
        assert!(!run_command.service_args.resume_from_last_completed);
        assert_eq!(run_command.service_args.sweep_interval_secs, Some(30));
    }

    #[rstest]
    #[case::retry_limit("--retry-limit")]
    #[case::sweep_interval("--sweep-interval-secs")]
    #[case::catchup_concurrency("--catchup-concurrency")]
    fn zero_is_rejected(#[case] flag: &str) {
        assert!(Cli::try_parse_from(["changestream-consumer", "run", flag, "0"]).is_err());
    }
}
