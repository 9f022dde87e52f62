// SPDX-License-Identifier: Apache-2.0

use crate::coordinator::UpdateCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Periodic driver for [`UpdateCoordinator::update`].
///
/// A stop request is only observed between cycles, so an update that has
/// started always runs to completion. Dropping the scheduler also stops it.
pub struct UpdateScheduler {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl UpdateScheduler {
    #[must_use]
    pub fn start(
        coordinator: Arc<UpdateCoordinator>,
        interval: Duration,
        run_immediately: bool,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let first = if run_immediately {
            Instant::now()
        } else {
            Instant::now() + interval
        };
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "update scheduler started");
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let response = coordinator.update().await;
                        debug!(code = response.code, message = %response.message, "scheduled update done");
                    }
                }
            }
            info!("update scheduler stopped");
        });
        Self { stop_tx, handle }
    }

    /// Prevents further cycles and waits for an in-flight one to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
