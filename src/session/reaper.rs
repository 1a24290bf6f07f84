//! Background sweep of idle sessions.

use super::registry::SessionRegistry;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawn a task that sweeps `registry` every `interval`, closing sessions
/// idle for longer than `max_idle`. Stops when `cancel` fires.
pub fn spawn_idle_reaper(
    registry: SessionRegistry,
    max_idle: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    info!(
        max_idle_secs = max_idle.as_secs(),
        interval_secs = interval.as_secs(),
        "Starting idle session reaper"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Idle session reaper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let reaped = registry.sweep_idle(max_idle).await;
                    if reaped > 0 {
                        info!(reaped, "Reaped idle sessions");
                    }
                }
            }
        }
    })
}
