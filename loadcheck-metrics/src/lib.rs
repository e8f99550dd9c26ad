//! Outcome counters for loadcheck
//!
//! Every played action increments a named counter (for example
//! `staticfile-304` or `bulletins-200`). The counters are owned by the run
//! and shared by reference count; a snapshot feeds the reporting layer.

pub mod counters;

pub use counters::{CounterSnapshot, Counters, SharedCounters};

/// Create a new shared counter set
pub fn create_counters() -> SharedCounters {
    std::sync::Arc::new(Counters::new())
}
