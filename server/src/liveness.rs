//! Periodic eviction of sessions that stopped reporting
//!
//! Transport close notifications are not always delivered (silently dropped
//! connections never signal), so a timer sweeps the registry and removes any
//! session that has been quiet for longer than the staleness threshold.

use crate::router::Router;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Spawns the liveness sweep
///
/// Every `period` the router evicts sessions silent for longer than
/// `threshold` and announces each one with `player_left`.
pub fn spawn_liveness_sweep(
    router: Arc<Router>,
    period: Duration,
    threshold: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let evicted = router.evict_stale(Instant::now(), threshold).await;
            if !evicted.is_empty() {
                debug!("Liveness sweep evicted {} session(s)", evicted.len());
            }
        }
    })
}
