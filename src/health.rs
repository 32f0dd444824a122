//! Periodic browser liveness monitoring.
//!
//! A cheap probe (listing open targets) runs on an interval, but only while
//! the pool is `Ready` and idle: probing under render load produces false
//! positives from transient slowness, and probing mid-restart is pointless.
//! A failed probe takes the same forced-restart path as a disconnect event.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lifecycle::{LifecycleController, PoolState};
use crate::scheduler::RenderGate;

pub fn spawn_health_monitor(
    controller: Arc<LifecycleController>,
    gate: Arc<RenderGate>,
    period: Duration,
    probe_timeout: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of `interval` fires immediately; skip it so the
        // monitor never races pool startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match controller.state() {
                PoolState::Closed => break,
                PoolState::Ready => {}
                _ => continue,
            }
            if !gate.is_idle() {
                debug!("skipping health probe: renders in flight");
                continue;
            }
            let Some(handle) = controller.ready_handle() else {
                continue;
            };
            let probe = timeout(probe_timeout, handle.probe()).await;
            let healthy = matches!(probe, Ok(Ok(())));
            if healthy {
                debug!("health probe ok");
                continue;
            }
            warn!("health probe failed; forcing browser restart");
            controller.restart(true).await;
        }
        debug!("health monitor stopped");
    })
}
