use super::{Inner, SessionHandler};
use std::sync::{Arc, Weak};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Spawns the background task that keeps `inner`'s session alive.
///
/// The task holds only a [`Weak`] reference, so dropping every handle to the
/// session ends it on the next tick even without an explicit close. Closing the
/// session cancels `token` and ends it immediately.
pub(super) fn spawn<H: SessionHandler>(inner: &Arc<Inner<H>>, token: CancellationToken) {
    let weak = Arc::downgrade(inner);
    let period = inner.config.keep_alive_interval;
    tokio::spawn(keep_alive_loop(weak, token, period));
}

async fn keep_alive_loop<H: SessionHandler>(
    weak: Weak<Inner<H>>,
    token: CancellationToken,
    period: core::time::Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    // A slow keep-alive must not trigger a burst of catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.keep_alive().await;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Keep-alive task stopped");
}
