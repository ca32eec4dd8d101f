/// Contains the CLI arguments for the service
pub mod cli;
/// Contains the core logic for the service
pub mod core;
/// Contains the error types for the service
pub mod error;
/// Contains the types for the service
pub mod types;
/// Contains the utils for the service
pub mod utils;
/// Contains the workers: change stream listener, event handler, catch-up scanner
pub mod worker;

#[cfg(test)]
mod tests;

pub use error::{ConsumerError, ConsumerResult};
