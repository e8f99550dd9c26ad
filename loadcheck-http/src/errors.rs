//! HTTP error types

use loadcheck_core::BenchError;

/// Errors raised while preparing requests
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("Invalid multipart file part: {0}")]
    InvalidFilePart(#[source] reqwest::Error),
}

impl From<HttpError> for BenchError {
    fn from(err: HttpError) -> Self {
        BenchError::contract(err.to_string())
    }
}
