//! Interrupt handling for a run
//!
//! The first interrupt cancels the run context so workers unwind at their
//! next suspension point and a partial summary is still produced. A second
//! interrupt is left to the default handler.

use loadcheck_core::RunContext;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Cancel `ctx` on the first Ctrl-C.
///
/// The listener exits on its own once the context is cancelled for any
/// other reason.
pub fn cancel_on_interrupt(ctx: RunContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    warn!("Interrupt received, cancelling run");
                    ctx.cancel();
                }
                Err(e) => error!("Failed to listen for interrupt: {}", e),
            },
            _ = ctx.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_listener_exits_with_context() {
        let ctx = RunContext::new();
        let handle = cancel_on_interrupt(ctx.clone());

        ctx.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener should stop once the run is cancelled")
            .unwrap();
    }
}
