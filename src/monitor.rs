//! Retry monitor: the background task that owns acknowledgement timing.
//!
//! The monitor multiplexes three inputs with `tokio::select!`:
//!
//! ```text
//!  shutdown (watch) ──────────────┐
//!  events   (mpsc: Ack, Pending) ─┼──▶ monitor loop ──▶ resend / expire
//!  ticker   (monitor_interval) ───┘
//! ```
//!
//! Inbound ACKs are settled as soon as they arrive; timeouts are only
//! evaluated on ticks, so every timeout is accurate to within one
//! `monitor_interval`.  The ticker only runs while something is pending:
//! a `Pending` event restarts it, and a scan that leaves the table empty
//! parks it.  The task holds a `Weak` reference to the endpoint and stops
//! by itself once every endpoint handle has been dropped.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::endpoint::Inner;
use crate::envelope::{Checksum, Codec};
use crate::transport::Transport;

/// Work handed to the monitor by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MonitorEvent {
    /// An ACK for `acked` arrived from `from` and no caller was blocked on it.
    Ack { acked: Checksum, from: SocketAddr },
    /// A new acknowledged send entered the pending table.
    Pending(Checksum),
}

pub(crate) async fn run<T: Transport, C: Codec>(
    endpoint: Weak<Inner<T, C>>,
    mut events: mpsc::UnboundedReceiver<MonitorEvent>,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut idle = true;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                log::info!("[monitor] shutdown requested");
                break;
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(inner) = endpoint.upgrade() else { break };
                if handle_event(&inner, event) && idle {
                    // First tick one full interval after the new entry.
                    ticker.reset();
                    idle = false;
                }
            }

            _ = ticker.tick(), if !idle => {
                let Some(inner) = endpoint.upgrade() else { break };
                idle = !scan(&inner).await;
                if idle {
                    log::trace!("[monitor] nothing pending, ticker parked");
                }
            }
        }
    }
    log::debug!("[monitor] stopped");
}

/// Returns `true` when the event brought new work for the ticker.
fn handle_event<T: Transport, C: Codec>(inner: &Arc<Inner<T, C>>, event: MonitorEvent) -> bool {
    match event {
        MonitorEvent::Ack { acked, from } => {
            let mut shared = inner.lock();
            match shared.pending.acknowledge(&acked) {
                Some(entry) => {
                    shared.stats.acknowledged += 1;
                    log::debug!(
                        "[monitor] ← ACK {} from {from} after {} resend(s)",
                        entry.envelope,
                        entry.resend_count()
                    );
                }
                None => {
                    shared.stats.stale_acks += 1;
                    log::warn!(
                        "[monitor] ACK for {acked} from {from} matches nothing pending; \
                         sent by another endpoint or already dropped"
                    );
                }
            }
            false
        }
        MonitorEvent::Pending(checksum) => {
            log::trace!("[monitor] tracking {checksum}");
            true
        }
    }
}

/// One timeout pass over the pending table.  Returns `true` while entries
/// remain.
async fn scan<T: Transport, C: Codec>(inner: &Arc<Inner<T, C>>) -> bool {
    let config = inner.config();
    let outcome = inner.lock().pending.tick(
        config.monitor_interval,
        config.resend_timeout,
        config.fail_timeout,
    );

    for (envelope, destination) in outcome.resend {
        log::warn!(
            "[monitor] → resend {envelope} to {destination}; no acknowledgement yet"
        );
        match inner.write_burst(&envelope, destination).await {
            Ok(()) => inner.lock().stats.resent += 1,
            Err(e) => log::warn!("[monitor] resend of {envelope} failed: {e}"),
        }
    }

    for entry in outcome.expired {
        inner.lock().stats.dropped += 1;
        log::warn!(
            "[monitor] {} to {} {} after {} resend(s)",
            entry.envelope,
            entry.destination,
            entry.state,
            entry.resend_count()
        );
        inner.notify_undelivered(&entry.envelope, entry.destination);
    }

    !inner.lock().pending.is_empty()
}
