//! Scenario orchestration for loadcheck
//!
//! This crate schedules scenarios onto a bounded set of concurrent workers
//! for the configured run duration, aggregates their outcomes, and aborts
//! the whole run on the first fatal fault.

pub mod orchestrator;
pub mod scenario;
pub mod shutdown;
pub mod summary;

// Re-export commonly used types
pub use loadcheck_core::RunContext;
pub use orchestrator::{Orchestrator, RunSettings};
pub use scenario::{Scenario, ScenarioContext, ScenarioTable};
pub use shutdown::cancel_on_interrupt;
pub use summary::{CheckReport, FailureEntry, RunSummary, ScenarioTally};
