//! Idle lobby reaper.
//!
//! Periodically evicts lobbies whose last activity is older than the
//! configured TTL.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled. A sweep that is
//! already running completes first.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ReaperConfig;
use crate::store::LobbyStore;

/// Run the reaper until `cancel_token` is cancelled.
pub async fn start_lobby_reaper(
    store: Arc<LobbyStore>,
    config: ReaperConfig,
    cancel_token: CancellationToken,
) {
    log::info!(
        "Starting lobby reaper (sweep every {}s, ttl {}s)",
        config.sweep_interval.as_secs(),
        config.lobby_ttl.as_secs()
    );

    let period = config.sweep_interval.max(Duration::from_millis(1));
    // First sweep one period after start, not immediately.
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(&store, config.lobby_ttl).await;
            }
            _ = cancel_token.cancelled() => {
                log::info!("Lobby reaper received shutdown signal, exiting");
                break;
            }
        }
    }
}

/// Evict every lobby idle for longer than `ttl`. Returns how many were evicted.
///
/// Works from a snapshot of the resident keys; each key is re-checked under
/// its own lock, so lobbies touched mid-sweep survive.
pub async fn run_sweep(store: &LobbyStore, ttl: Duration) -> usize {
    let now = Instant::now();
    let keys = store.keys().await;
    let mut evicted = 0;

    for key in &keys {
        if store.evict_if_stale(key, ttl, now).await {
            evicted += 1;
        }
    }

    if evicted > 0 {
        log::info!(
            "Reaper sweep evicted {evicted}/{} lobbies",
            keys.len()
        );
    } else {
        log::trace!("Reaper sweep: {} lobbies, none idle", keys.len());
    }
    evicted
}
