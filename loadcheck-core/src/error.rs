//! Outcome classification for benchmark actions
//!
//! Every failed action surfaces as a [`BenchError`]. The variant is the
//! outcome tag: check and transport failures end only the current scenario
//! attempt, a fatal fault ends the whole run, and contract violations are
//! raised while building specs or leases, before anything is sent.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for loadcheck operations
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Classification tag of a [`BenchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Expectation mismatch (status, redirect target, structural assertion)
    Check,
    /// Connection or timeout error from the network layer
    Transport,
    /// The target broke its basic response contract
    Fatal,
    /// The caller misused the engine
    Contract,
    /// The run context was cancelled while the action was in flight
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Check => "check",
            ErrorKind::Transport => "transport",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Contract => "contract",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error produced by playing an action or running a scenario
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BenchError {
    /// Soft failure: an expectation did not hold
    #[error("{label}: {message}")]
    Check { label: String, message: String },

    /// Soft failure: the request never produced a response
    #[error("{label}: {message}")]
    Transport {
        label: String,
        message: String,
        timed_out: bool,
    },

    /// The target cannot be trusted any further
    #[error("fatal: {label}: {message}")]
    Fatal { label: String, message: String },

    /// Misuse of the engine API
    #[error("contract violation: {0}")]
    Contract(String),

    /// The run was cancelled
    #[error("run cancelled")]
    Cancelled,
}

impl BenchError {
    /// Soft check failure attributed to `label`
    pub fn check(label: impl Into<String>, message: impl Into<String>) -> Self {
        BenchError::Check {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Transport failure attributed to `label`
    pub fn transport(label: impl Into<String>, message: impl Into<String>) -> Self {
        BenchError::Transport {
            label: label.into(),
            message: message.into(),
            timed_out: false,
        }
    }

    /// Per-request timeout attributed to `label`
    pub fn timeout(label: impl Into<String>) -> Self {
        BenchError::Transport {
            label: label.into(),
            message: "request timed out".to_string(),
            timed_out: true,
        }
    }

    /// Fatal fault attributed to `label`
    pub fn fatal(label: impl Into<String>, message: impl Into<String>) -> Self {
        BenchError::Fatal {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Caller contract violation
    pub fn contract(message: impl Into<String>) -> Self {
        BenchError::Contract(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BenchError::Check { .. } => ErrorKind::Check,
            BenchError::Transport { .. } => ErrorKind::Transport,
            BenchError::Fatal { .. } => ErrorKind::Fatal,
            BenchError::Contract(_) => ErrorKind::Contract,
            BenchError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Label of the action that failed, if any
    pub fn label(&self) -> Option<&str> {
        match self {
            BenchError::Check { label, .. }
            | BenchError::Transport { label, .. }
            | BenchError::Fatal { label, .. } => Some(label),
            BenchError::Contract(_) | BenchError::Cancelled => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    /// Check and transport failures only end the current scenario attempt
    pub fn is_soft(&self) -> bool {
        matches!(self.kind(), ErrorKind::Check | ErrorKind::Transport)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Promote a soft failure to a fatal fault.
    ///
    /// Scenarios use this for checks whose failure means the target is not a
    /// valid implementation at all (for example, a login with unknown
    /// credentials that succeeds). Other kinds are returned unchanged.
    pub fn escalate(self) -> Self {
        match self {
            BenchError::Check { label, message } | BenchError::Transport { label, message, .. } => {
                BenchError::Fatal { label, message }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(BenchError::check("a", "b").kind(), ErrorKind::Check);
        assert_eq!(BenchError::timeout("a").kind(), ErrorKind::Transport);
        assert_eq!(BenchError::fatal("a", "b").kind(), ErrorKind::Fatal);
        assert_eq!(BenchError::contract("x").kind(), ErrorKind::Contract);
        assert_eq!(BenchError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_soft_and_fatal() {
        assert!(BenchError::check("a", "b").is_soft());
        assert!(BenchError::transport("a", "refused").is_soft());
        assert!(!BenchError::fatal("a", "b").is_soft());
        assert!(BenchError::fatal("a", "b").is_fatal());
        assert!(!BenchError::contract("x").is_soft());
    }

    #[test]
    fn test_escalate_keeps_label_and_message() {
        let err = BenchError::check("login rejected", "expected 403, got 302").escalate();
        assert!(err.is_fatal());
        assert_eq!(err.label(), Some("login rejected"));
        assert_eq!(err.to_string(), "fatal: login rejected: expected 403, got 302");

        assert_eq!(BenchError::Cancelled.escalate(), BenchError::Cancelled);
    }

    #[test]
    fn test_display() {
        let err = BenchError::check("top page", "expected 302 or 303, got 200");
        assert_eq!(err.to_string(), "top page: expected 302 or 303, got 200");
        assert_eq!(
            BenchError::contract("field count mismatch").to_string(),
            "contract violation: field count mismatch"
        );
    }
}
