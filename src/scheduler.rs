use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    data::RefreshSignal,
    fanout::{Delivery, SurfaceRegistry},
};

/// Decides when surfaces re-pull their data. Holds no state besides its
/// configuration; every signal goes straight to the registry.
#[derive(Clone)]
pub struct RefreshScheduler {
    registry: SurfaceRegistry,
    settle_delay: Duration,
    catch_up_delay: Duration,
}
impl RefreshScheduler {
    pub fn new(registry: SurfaceRegistry, settle_delay: Duration, catch_up_delay: Duration) -> Self {
        Self {
            registry,
            settle_delay,
            catch_up_delay,
        }
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    pub fn refresh_now(&self) -> Delivery {
        let delivery = self.registry.broadcast_refresh(RefreshSignal::now());
        log::trace!("refresh-data: {delivery:?}");
        delivery
    }

    /// Refreshes immediately and once more after the settle delay, since the
    /// window manager applies some changes asynchronously. Does not wait for
    /// the second refresh.
    pub fn refresh_after_action(&self) -> tokio::task::JoinHandle<()> {
        self.refresh_now();
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.settle_delay).await;
            this.refresh_now();
        })
    }

    /// First refresh for surfaces that may still be subscribing.
    pub async fn catch_up(&self) -> Delivery {
        tokio::time::sleep(self.catch_up_delay).await;
        log::info!("Refreshing existing surfaces");
        self.refresh_now()
    }

    /// Ticks until cancelled. Failures of individual sources never slow this down.
    pub async fn run_timer(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticks.tick() => {
                    self.refresh_now();
                }
            }
        }
        log::debug!("Refresh timer stopped");
    }
}
