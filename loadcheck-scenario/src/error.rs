//! Scenario file errors

use loadcheck_core::BenchError;
use std::path::PathBuf;
use thiserror::Error;

pub type ScenarioResult<T> = std::result::Result<T, ScenarioError>;

/// Problems found while loading or compiling a scenario file
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid template '{template}': {message}")]
    Template { template: String, message: String },

    #[error("scenario '{scenario}': {message}")]
    Scenario { scenario: String, message: String },

    #[error("scenario '{scenario}', step {step}: {message}")]
    Step {
        scenario: String,
        step: usize,
        message: String,
    },

    #[error("scenario name '{0}' is used more than once")]
    DuplicateName(String),
}

impl ScenarioError {
    pub(crate) fn template(template: &str, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.to_string(),
            message: message.into(),
        }
    }
}

impl From<ScenarioError> for BenchError {
    fn from(err: ScenarioError) -> Self {
        BenchError::contract(err.to_string())
    }
}
