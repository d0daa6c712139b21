use crate::server::{session::store::SessionStore, telemetry::increment_sessions_evicted};
use core::time::Duration;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Periodically evicts idle sessions from `store`.
///
/// Runs one sweep every `every` until `shutdown_token` is cancelled. A sweep
/// that overruns its period delays the next tick instead of bursting to catch
/// up.
pub async fn sweep_loop(store: Arc<SessionStore>, every: Duration, shutdown_token: CancellationToken) {
    tracing::trace!(every_ms = every.as_millis() as u64, "Session sweeper started");

    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            now = ticker.tick() => {
                let report = store.sweep(now);
                if report.evicted > 0 {
                    increment_sessions_evicted(report.evicted as u64);
                    tracing::debug!(
                        evicted = report.evicted,
                        retained = report.retained,
                        "Swept sessions"
                    );
                }
            }
        }
    }

    tracing::trace!("Session sweeper stopped");
}
