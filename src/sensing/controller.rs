use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{sensing_loop, LoopContext};
use super::source::PositionSource;

/// Owns the background classification task.
#[derive(Default)]
pub struct SensingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn start_sensing<S>(&mut self, source: S, ctx: LoopContext) -> Result<()>
    where
        S: PositionSource + 'static,
    {
        if self.is_running() {
            bail!("sensing already active");
        }

        info!(
            "starting sensing loop every {}ms (tick timeout {}ms)",
            ctx.tick_interval.as_millis(),
            ctx.tick_timeout.as_millis()
        );

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(source, ctx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Lets the tick in flight finish, then waits for the loop to exit.
    pub async fn stop_sensing(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sensing loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}
