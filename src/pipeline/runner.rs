//! Background task that drives `PipelineContext` until told to stop.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::processor::{PipelineContext, PipelineState};

/// Handle to the running pipeline task.
pub struct PipelineHandle {
    handle: JoinHandle<PipelineContext>,
    shutdown: watch::Sender<bool>,
}

impl PipelineHandle {
    /// Ask the loop to stop at its next cancellation point.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the loop and wait for the in-flight cycle to finish.
    ///
    /// Returns the context so callers can inspect the final store.
    pub async fn shutdown(self) -> Option<PipelineContext> {
        self.request_shutdown();
        match self.handle.await {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                error!(error = %e, "Pipeline task panicked");
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawn the polling loop.
///
/// The shutdown signal is checked before every fetch and interrupts the
/// sleep between cycles; a cycle already in progress always completes.
pub fn spawn_pipeline(ctx: PipelineContext) -> PipelineHandle {
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(run(ctx, rx));
    PipelineHandle { handle, shutdown }
}

async fn run(mut ctx: PipelineContext, mut shutdown: watch::Receiver<bool>) -> PipelineContext {
    info!(
        "Email pipeline started, polling every {}s",
        ctx.poll_interval.as_secs_f32()
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        ctx.run_cycle().await;

        ctx.set_state(PipelineState::Sleeping);
        tokio::select! {
            _ = tokio::time::sleep(ctx.poll_interval) => {}
            changed = shutdown.changed() => {
                // Handle dropped
                if changed.is_err() {
                    break;
                }
            }
        }
        ctx.set_state(PipelineState::Idle);
    }

    ctx.set_state(PipelineState::Idle);
    info!("Email pipeline shutting down");
    ctx
}
