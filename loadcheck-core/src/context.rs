//! Shared run context: cancellation, deadline and the first fatal fault
//!
//! Every suspension point in the engine (pool acquisition, in-flight
//! requests) races [`RunContext::cancelled`]. A fatal fault recorded through
//! [`RunContext::abort`] cancels the context, so every other worker unwinds
//! at its next suspension point.

use crate::error::BenchError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancellation-bearing context threaded through every engine call
#[derive(Debug, Clone)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    fatal: Arc<Mutex<Option<BenchError>>>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// Create a context without a deadline
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            fatal: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a context that ends `budget` from now.
    ///
    /// The deadline is advisory until [`arm_deadline`](Self::arm_deadline)
    /// is called from inside a runtime.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + budget),
            ..Self::new()
        }
    }

    /// Child context: cancelled with its parent, cancellable on its own, and
    /// sharing the parent's fatal slot
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            fatal: self.fatal.clone(),
        }
    }

    /// Child context with its own, possibly shorter, deadline
    pub fn child_with_deadline(&self, budget: Duration) -> Self {
        let deadline = Instant::now() + budget;
        Self {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
            fatal: self.fatal.clone(),
        }
    }

    /// Spawn a timer that cancels the context when the deadline elapses
    pub fn arm_deadline(&self) {
        let Some(deadline) = self.deadline else {
            return;
        };
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    info!("Run deadline reached, cancelling");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` without a deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Record a fatal fault and cancel the run.
    ///
    /// Only the first fault is kept; returns whether this call recorded it.
    pub fn abort(&self, fault: BenchError) -> bool {
        let recorded = {
            let mut slot = self.fatal.lock();
            if slot.is_none() {
                error!("Fatal fault, aborting run: {}", fault);
                *slot = Some(fault);
                true
            } else {
                false
            }
        };
        self.token.cancel();
        recorded
    }

    /// The fatal fault that aborted the run, if any
    pub fn fatal(&self) -> Option<BenchError> {
        self.fatal.lock().clone()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
