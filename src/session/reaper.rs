//! Background eviction of idle sessions

use super::SessionStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodically removes sessions idle past the store's timeout.
///
/// The reaper is the only thing that deletes a session without the caller
/// choosing to exit.
pub struct SessionReaper<S> {
    store: S,
    interval: Duration,
}

impl<S: SessionStore + 'static> SessionReaper<S> {
    pub fn new(store: S, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run one sweep, returning the number of sessions evicted
    pub async fn sweep(&self) -> usize {
        match self.store.evict_idle().await {
            Ok(0) => 0,
            Ok(evicted) => {
                tracing::info!(evicted, "Evicted idle USSD sessions");
                evicted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session sweep failed");
                0
            }
        }
    }

    /// Sweep on a fixed interval until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            tracing::info!("Session reaper stopped");
        })
    }
}
