//! HTTP action player for loadcheck
//!
//! [`ActionPlayer`] binds one leased virtual user to the shared counters and
//! plays [`loadcheck_core::ActionSpec`]s against the target: it builds the
//! request, races it against the run context, evaluates the declared
//! expectations in order, and classifies the outcome.

pub mod config;
pub mod errors;
pub mod player;

// Re-export main types for convenience
pub use config::HttpSettings;
pub use errors::HttpError;
pub use player::ActionPlayer;
