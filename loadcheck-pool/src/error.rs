//! Pool error types

use loadcheck_core::BenchError;
use thiserror::Error;

/// Errors raised while building users or registering them
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build HTTP client for user '{name}': {source}")]
    Client {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("user '{0}' is already registered")]
    DuplicateUser(String),
}

impl From<PoolError> for BenchError {
    fn from(err: PoolError) -> Self {
        BenchError::contract(err.to_string())
    }
}
