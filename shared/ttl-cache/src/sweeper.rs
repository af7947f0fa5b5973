//! Background expiry task
//!
//! Sleeps until the earliest deadline (or the fallback interval when nothing
//! expires), wakes early when a `set` moves that deadline forward, and exits
//! on cancellation or once every cache handle is gone.

use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::cache::Shared;

pub(crate) async fn run<K, V>(
    shared: Weak<Shared<K, V>>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    fallback: Duration,
) where
    K: Eq + Hash,
{
    loop {
        let deadline = match shared.upgrade() {
            Some(cache) => cache.next_deadline(),
            None => return,
        };
        let until = deadline.unwrap_or_else(|| Instant::now() + fallback);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = wake.notified() => continue,
            _ = tokio::time::sleep_until(until) => {}
        }

        match shared.upgrade() {
            Some(cache) => {
                let purged = cache.purge_expired(Instant::now());
                if purged > 0 {
                    trace!(purged, "cache sweep removed expired entries");
                }
            }
            None => return,
        }
    }
}
