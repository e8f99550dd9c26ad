//! Core domain types for loadcheck
//!
//! This crate defines the language shared by every other loadcheck crate:
//! declarative action specifications, the response view handed to
//! validators, and the tagged error type that separates recoverable check
//! failures from run-terminating faults.

pub mod action;
pub mod context;
pub mod error;
pub mod response;
pub mod types;

// Re-export commonly used types at the crate root
pub use action::{ActionBody, ActionSpec, ActionSpecBuilder, ExpectedStatus, FilePart};
pub use context::RunContext;
pub use error::{BenchError, BenchResult, ErrorKind};
pub use response::{ensure, Assertion, DecodeError, Document, ResponseView, Validator};
pub use types::{Credentials, HttpMethod, HttpMethodError};
