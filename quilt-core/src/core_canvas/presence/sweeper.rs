//! Background expiry of presence entries

use super::channel::PresenceChannel;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Handle to a running sweeper; dropping it also stops the task
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Ask the sweeper to stop and wait for it
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "presence sweeper task failed");
        }
    }
}

/// Spawn a task calling `sweep` every `interval` until shut down
pub fn spawn_sweeper(channel: PresenceChannel, interval: Duration) -> SweeperHandle {
    let (stop, mut stopped) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = channel.sweep(Instant::now()) {
                        error!(error = %err, "presence sweep failed, stopping sweeper");
                        break;
                    }
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("presence sweeper stopped");
    });
    SweeperHandle { stop, task }
}
