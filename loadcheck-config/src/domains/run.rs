//! Load phase configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long and how wide a run drives the target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Length of the load phase
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_duration"
    )]
    pub duration: Duration,

    /// Seed for scenario and user selection; random when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Abort the run after this many consecutive transport failures on one
    /// worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_transport_failures: Option<u32>,

    /// Treat every transport failure as fatal
    #[serde(default = "crate::domains::utils::default_false")]
    pub transport_errors_fatal: bool,

    /// Distinct failure messages kept in the run summary
    #[serde(default = "default_max_failure_messages")]
    pub max_failure_messages: usize,

    /// Skip the pre-test checks before the load phase
    #[serde(default = "crate::domains::utils::default_false")]
    pub skip_checks: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            duration: default_duration(),
            seed: None,
            max_consecutive_transport_failures: None,
            transport_errors_fatal: false,
            max_failure_messages: default_max_failure_messages(),
            skip_checks: false,
        }
    }
}

impl Validatable for RunConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.workers, "workers", self.domain_name())?;
        validate_positive(self.duration.as_secs(), "duration", self.domain_name())?;

        if let Some(limit) = self.max_consecutive_transport_failures {
            validate_positive(
                limit,
                "max_consecutive_transport_failures",
                self.domain_name(),
            )?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "run"
    }
}

fn default_workers() -> usize {
    8
}

fn default_duration() -> Duration {
    Duration::from_secs(60)
}

fn default_max_failure_messages() -> usize {
    20
}
