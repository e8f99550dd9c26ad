//! Logging setup for loadcheck
//!
//! All output goes through `tracing`. This crate only installs the global
//! subscriber, shaped by the `logging` section of the configuration.

pub mod init;

pub use init::{filter_directives, init_logging, init_simple_tracing};
