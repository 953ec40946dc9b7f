//! Endpoint core: inbound dispatch, peer registration, outbound sends and
//! lifecycle.
//!
//! # Inbound path
//!
//! ```text
//!  transport.recv_from ─▶ codec.decode ─▶ DedupRing ─▶ receive handler
//!                             │              │              │
//!                         (count, drop)  (duplicate)        ▼
//!                                                    registration / ACK /
//!                                                    DATA bookkeeping ─▶ ACK reply
//! ```
//!
//! # Outbound path
//!
//! | Mode              | Pending entry | Returns                           |
//! |-------------------|---------------|-----------------------------------|
//! | `FireAndForget`   | no            | after the burst is written        |
//! | `Burst`           | no            | after the burst is written        |
//! | `AckNonBlocking`  | yes           | after the burst is written        |
//! | `AckBlocking`     | yes           | once acknowledged or timed out    |
//!
//! All mutable state lives behind one `std::sync::Mutex` that is never held
//! across an `.await`.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::SystemTime;

use tokio::sync::{mpsc, oneshot, watch};

use crate::config::{ConfigError, EndpointConfig};
use crate::envelope::{Checksum, Codec, Envelope, MessageKind, WireCodec};
use crate::error::EndpointError;
use crate::monitor::{self, MonitorEvent};
use crate::pending::{PendingEntry, PendingTable};
use crate::ring::DedupRing;
use crate::state::{DeliveryState, EndpointState};
use crate::transport::{Transport, TransportError, UdpTransport};

/// Callback for every newly accepted inbound envelope.
pub type ReceiveHandler = dyn Fn(&Envelope, SocketAddr) + Send + Sync;

/// Callback for a non-blocking acknowledged send that was never acknowledged.
pub type UndeliveredHandler = dyn Fn(&Envelope, SocketAddr) + Send + Sync;

/// How [`Endpoint::send`] delivers an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Write the envelope once per configured burst; no acknowledgement.
    FireAndForget,
    /// Same writes as `FireAndForget`, named for callers that rely on the
    /// configured burst for redundancy.
    Burst,
    /// Wait until the peer acknowledges or `fail_timeout` elapses.
    AckBlocking,
    /// Return at once; the retry monitor resends until acknowledged.
    AckNonBlocking,
}

/// Counters kept by an endpoint.  [`Endpoint::stats`] returns a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    /// Inbound envelopes accepted and handed to the receive handler.
    pub delivered: u64,
    /// Inbound envelopes discarded by the dedup ring.
    pub duplicates: u64,
    pub decode_errors: u64,
    /// Pending entries settled by an ACK.
    pub acknowledged: u64,
    /// ACKs that matched nothing pending.
    pub stale_acks: u64,
    /// Retransmissions performed by the retry monitor.
    pub resent: u64,
    /// Acknowledged sends that gave up (blocking timeouts and expiries).
    pub dropped: u64,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub(crate) struct Shared {
    pub(crate) lifecycle: EndpointState,
    pub(crate) ring: DedupRing,
    pub(crate) pending: PendingTable,
    /// Peer address → time of its first registration.
    pub(crate) registered: HashMap<SocketAddr, SystemTime>,
    /// Registered peers whose every envelope is acknowledged.
    pub(crate) ack_peers: HashSet<SocketAddr>,
    /// Blocked `AckBlocking` callers, keyed by the checksum they wait on.
    pub(crate) waiters: HashMap<Checksum, oneshot::Sender<()>>,
    pub(crate) stats: EndpointStats,
    /// Handed to the retry monitor on start.
    events_rx: Option<mpsc::UnboundedReceiver<MonitorEvent>>,
}

struct Handlers {
    receive: Arc<ReceiveHandler>,
    undelivered: Arc<UndeliveredHandler>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            receive: Arc::new(log_received),
            undelivered: Arc::new(log_undelivered),
        }
    }
}

fn log_received(envelope: &Envelope, from: SocketAddr) {
    log::info!("received {envelope} from {from}");
}

fn log_undelivered(envelope: &Envelope, destination: SocketAddr) {
    log::warn!("{envelope} to {destination} was never acknowledged");
}

pub(crate) struct Inner<T, C> {
    config: EndpointConfig,
    codec: C,
    transport: RwLock<Option<Arc<T>>>,
    shared: Mutex<Shared>,
    handlers: RwLock<Handlers>,
    events: mpsc::UnboundedSender<MonitorEvent>,
    shutdown: watch::Sender<bool>,
}

impl<T: Transport, C: Codec> Inner<T, C> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn transport(&self) -> Result<Arc<T>, EndpointError> {
        let slot = self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        slot.ok_or_else(|| match self.lock().lifecycle {
            EndpointState::Closed => EndpointError::Closed,
            _ => EndpointError::TransportNotReady,
        })
    }

    /// Write `envelope` `burst_count` times, `burst_interval` apart.
    pub(crate) async fn write_burst(
        &self,
        envelope: &Envelope,
        dest: SocketAddr,
    ) -> Result<(), EndpointError> {
        let transport = self.transport()?;
        let bytes = self.codec.encode(envelope);
        for i in 0..self.config.burst_count {
            if i > 0 {
                tokio::time::sleep(self.config.burst_interval).await;
            }
            transport.send_to(&bytes, dest).await?;
        }
        Ok(())
    }

    fn notify_received(&self, envelope: &Envelope, from: SocketAddr) {
        let handler = Arc::clone(
            &self
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .receive,
        );
        handler(envelope, from);
    }

    pub(crate) fn notify_undelivered(&self, envelope: &Envelope, destination: SocketAddr) {
        let handler = Arc::clone(
            &self
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .undelivered,
        );
        handler(envelope, destination);
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A reliable messaging endpoint over an unreliable datagram [`Transport`].
///
/// Cloning yields another handle to the same endpoint.  The receive loop
/// and retry monitor stop on [`Endpoint::shutdown`] or once every handle
/// has been dropped.
pub struct Endpoint<T, C = WireCodec> {
    inner: Arc<Inner<T, C>>,
}

impl<T, C> Clone for Endpoint<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Endpoint<T> {
    /// An endpoint using [`WireCodec`], not yet attached to a transport.
    pub fn new(config: EndpointConfig) -> Result<Self, EndpointError> {
        Self::with_codec(config, WireCodec)
    }

    /// [`Endpoint::new`] followed by [`Endpoint::start`].
    pub fn spawn(transport: T, config: EndpointConfig) -> Result<Self, EndpointError> {
        let endpoint = Self::new(config)?;
        endpoint.start(transport)?;
        Ok(endpoint)
    }
}

impl Endpoint<UdpTransport> {
    /// Bind a UDP socket at `addr` and start an endpoint on it.
    pub async fn bind(addr: SocketAddr, config: EndpointConfig) -> Result<Self, EndpointError> {
        config.validate()?;
        let transport = UdpTransport::bind(addr).await?;
        Self::spawn(transport, config)
    }
}

impl<T: Transport, C: Codec> Endpoint<T, C> {
    pub fn with_codec(config: EndpointConfig, codec: C) -> Result<Self, EndpointError> {
        config.validate()?;
        let ring = DedupRing::new(config.history_len)
            .ok_or(ConfigError::NotPositive("history_len"))?;
        let (events, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let shared = Shared {
            lifecycle: EndpointState::Created,
            ring,
            pending: PendingTable::new(),
            registered: HashMap::new(),
            ack_peers: HashSet::new(),
            waiters: HashMap::new(),
            stats: EndpointStats::default(),
            events_rx: Some(events_rx),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                codec,
                transport: RwLock::new(None),
                shared: Mutex::new(shared),
                handlers: RwLock::new(Handlers::default()),
                events,
                shutdown,
            }),
        })
    }

    /// Attach `transport` and spawn the receive loop and retry monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, transport: T) -> Result<(), EndpointError> {
        let events_rx = {
            let mut shared = self.inner.lock();
            match shared.lifecycle {
                EndpointState::Running => return Err(EndpointError::AlreadyStarted),
                EndpointState::Closed => return Err(EndpointError::Closed),
                EndpointState::Created => {}
            }
            shared.lifecycle = EndpointState::Running;
            shared.events_rx.take()
        };

        let local_addr = transport.local_addr();
        let transport = Arc::new(transport);
        *self
            .inner
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&transport));

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(receive_loop(
            weak.clone(),
            transport,
            self.inner.shutdown.subscribe(),
        ));
        if let Some(events) = events_rx {
            tokio::spawn(monitor::run(
                weak,
                events,
                self.inner.shutdown.subscribe(),
                self.inner.config.monitor_interval,
            ));
        }

        log::info!("[endpoint] listening on {local_addr}");
        Ok(())
    }

    /// Stop the background tasks and detach the transport.
    ///
    /// Blocked `AckBlocking` callers are not woken; they resolve through
    /// their own timeout.  Calling this twice is a no-op.
    pub fn shutdown(&self) {
        {
            let mut shared = self.inner.lock();
            if shared.lifecycle == EndpointState::Closed {
                return;
            }
            shared.lifecycle = EndpointState::Closed;
            shared.events_rx = None;
        }
        self.inner.shutdown.send_replace(true);
        self.inner
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        log::info!("[endpoint] shut down");
    }

    pub fn register_receive_handler(
        &self,
        handler: impl Fn(&Envelope, SocketAddr) + Send + Sync + 'static,
    ) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .receive = Arc::new(handler);
    }

    pub fn register_undelivered_handler(
        &self,
        handler: impl Fn(&Envelope, SocketAddr) + Send + Sync + 'static,
    ) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .undelivered = Arc::new(handler);
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Send `envelope` to `dest`.
    ///
    /// Returns `Ok(false)` only when an `AckBlocking` send times out.
    /// An acknowledged send of an envelope that is still awaiting its
    /// acknowledgement fails with [`EndpointError::AlreadyPending`].
    pub async fn send(
        &self,
        envelope: &Envelope,
        dest: SocketAddr,
        mode: SendMode,
    ) -> Result<bool, EndpointError> {
        self.ensure_running()?;
        log::debug!("[endpoint] → {envelope} to {dest} ({mode:?})");

        match mode {
            SendMode::FireAndForget | SendMode::Burst => {
                self.inner.write_burst(envelope, dest).await?;
                Ok(true)
            }
            SendMode::AckNonBlocking => {
                self.track(envelope, dest, None)?;
                self.transmit_tracked(envelope, dest).await?;
                Ok(true)
            }
            SendMode::AckBlocking => self.send_blocking(envelope, dest).await,
        }
    }

    /// Announce this endpoint to `peer`, optionally asking it to
    /// acknowledge everything this endpoint sends it from now on.
    ///
    /// Returns whether the peer acknowledged the registration.
    pub async fn register(
        &self,
        peer: SocketAddr,
        request_acks: bool,
    ) -> Result<bool, EndpointError> {
        let envelope = Envelope::register(request_acks);
        self.send(&envelope, peer, SendMode::AckBlocking).await
    }

    fn ensure_running(&self) -> Result<(), EndpointError> {
        match self.inner.lock().lifecycle {
            EndpointState::Running => Ok(()),
            EndpointState::Created => Err(EndpointError::TransportNotReady),
            EndpointState::Closed => Err(EndpointError::Closed),
        }
    }

    /// Start tracking `envelope`.  One checksum has at most one pending
    /// entry and at most one waiter.
    fn track(
        &self,
        envelope: &Envelope,
        dest: SocketAddr,
        waiter: Option<oneshot::Sender<()>>,
    ) -> Result<(), EndpointError> {
        let checksum = envelope.checksum();
        let mut shared = self.inner.lock();
        if shared.pending.contains(&checksum) {
            return Err(EndpointError::AlreadyPending(checksum));
        }
        let blocking = waiter.is_some();
        if let Some(waiter) = waiter {
            shared.waiters.insert(checksum, waiter);
        }
        shared.pending.insert(envelope.clone(), dest, blocking);
        Ok(())
    }

    /// First burst of a tracked envelope.  Rolls the tracking back if the
    /// transport refuses the write.
    async fn transmit_tracked(
        &self,
        envelope: &Envelope,
        dest: SocketAddr,
    ) -> Result<(), EndpointError> {
        let checksum = envelope.checksum();
        let written = self.inner.write_burst(envelope, dest).await;

        let mut shared = self.inner.lock();
        match written {
            Ok(()) => {
                shared.pending.mark_sent(&checksum);
                let _ = self.inner.events.send(MonitorEvent::Pending(checksum));
                Ok(())
            }
            Err(e) => {
                shared.pending.remove(&checksum);
                shared.waiters.remove(&checksum);
                Err(e)
            }
        }
    }

    async fn send_blocking(
        &self,
        envelope: &Envelope,
        dest: SocketAddr,
    ) -> Result<bool, EndpointError> {
        let checksum = envelope.checksum();
        let (signal, mut acknowledged) = oneshot::channel();
        self.track(envelope, dest, Some(signal))?;
        self.transmit_tracked(envelope, dest).await?;

        let fail_timeout = self.inner.config.fail_timeout;
        if let Ok(Ok(())) = tokio::time::timeout(fail_timeout, &mut acknowledged).await {
            return Ok(true);
        }

        // The ACK path fires the signal under this lock, so after taking it
        // the signal is either already set or can no longer be.
        let mut shared = self.inner.lock();
        shared.waiters.remove(&checksum);
        if acknowledged.try_recv().is_ok() {
            return Ok(true);
        }
        shared.stats.dropped += 1;
        if let Some(mut entry) = shared.pending.remove(&checksum) {
            let resends = entry.resend_count();
            entry.state = DeliveryState::TimedOut;
            log::warn!(
                "[endpoint] {} to {dest} {} after {resends} resend(s)",
                entry.envelope,
                entry.state
            );
        }
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Process one raw datagram from `from`.
    ///
    /// Called by the receive loop; public so a caller that owns its own
    /// socket can feed datagrams in directly.
    pub async fn on_datagram_received(&self, bytes: &[u8], from: SocketAddr) {
        let envelope = match self.inner.codec.decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.inner.lock().stats.decode_errors += 1;
                log::error!(
                    "[endpoint] discarding {} byte(s) from {from}: {e}",
                    bytes.len()
                );
                return;
            }
        };

        let fresh = {
            let mut shared = self.inner.lock();
            let fresh = shared.ring.accept(envelope.clone());
            if fresh {
                shared.stats.delivered += 1;
            } else {
                shared.stats.duplicates += 1;
            }
            fresh
        };

        if !fresh {
            log::debug!("[endpoint] duplicate {envelope} from {from} ignored");
            if self.inner.config.ack_duplicates && self.would_acknowledge(&envelope, from) {
                self.reply_ack(envelope.checksum(), from).await;
            }
            return;
        }

        log::debug!("[endpoint] ← {envelope} from {from}");
        self.inner.notify_received(&envelope, from);

        if let Some(acked) = self.dispatch(&envelope, from) {
            self.reply_ack(acked, from).await;
        }
    }

    /// Registration and acknowledgement bookkeeping for an accepted
    /// envelope.  Returns the checksum to acknowledge, if any.
    fn dispatch(&self, envelope: &Envelope, from: SocketAddr) -> Option<Checksum> {
        let mut shared = self.inner.lock();
        match envelope.kind() {
            MessageKind::Register | MessageKind::RegisterWithAck => {
                if let Entry::Vacant(slot) = shared.registered.entry(from) {
                    slot.insert(SystemTime::now());
                    log::info!("[endpoint] registered {from}");
                }
                let wants_acks = envelope.kind() == MessageKind::RegisterWithAck;
                if wants_acks && shared.ack_peers.insert(from) {
                    log::info!("[endpoint] {from} requested acknowledgements");
                }
                Some(envelope.checksum())
            }
            MessageKind::Ack => {
                let acked = envelope.acknowledged_id()?;
                match shared.waiters.remove(&acked) {
                    Some(waiter) => {
                        shared.pending.acknowledge(&acked);
                        shared.stats.acknowledged += 1;
                        let _ = waiter.send(());
                        log::debug!(
                            "[endpoint] ← ACK {acked} from {from} released a blocked sender"
                        );
                    }
                    None => {
                        let _ = self.inner.events.send(MonitorEvent::Ack { acked, from });
                    }
                }
                None
            }
            MessageKind::Data => shared
                .ack_peers
                .contains(&from)
                .then_some(envelope.checksum()),
        }
    }

    fn would_acknowledge(&self, envelope: &Envelope, from: SocketAddr) -> bool {
        match envelope.kind() {
            MessageKind::Register | MessageKind::RegisterWithAck => true,
            MessageKind::Data => self.acknowledges(from),
            MessageKind::Ack => false,
        }
    }

    async fn reply_ack(&self, acked: Checksum, to: SocketAddr) {
        let ack = Envelope::ack(acked);
        match self.inner.write_burst(&ack, to).await {
            Ok(()) => log::trace!("[endpoint] → ACK {acked} to {to}"),
            Err(e) => log::warn!("[endpoint] could not acknowledge {acked} to {to}: {e}"),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Address of the attached transport, if started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|transport| transport.local_addr())
    }

    pub fn registered_endpoints(&self) -> HashMap<SocketAddr, SystemTime> {
        self.inner.lock().registered.clone()
    }

    pub fn is_registered(&self, peer: SocketAddr) -> bool {
        self.inner.lock().registered.contains_key(&peer)
    }

    /// `true` if every envelope from `peer` is acknowledged.
    pub fn acknowledges(&self, peer: SocketAddr) -> bool {
        self.inner.lock().ack_peers.contains(&peer)
    }

    /// Forget every registered peer, including acknowledgement requests.
    pub fn clear_registrations(&self) {
        let mut shared = self.inner.lock();
        shared.registered.clear();
        shared.ack_peers.clear();
    }

    pub fn has_pending_acknowledgements(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_pending(&self, checksum: &Checksum) -> bool {
        self.inner.lock().pending.contains(checksum)
    }

    /// Snapshot of the pending entry for `checksum`.
    pub fn pending_entry(&self, checksum: &Checksum) -> Option<PendingEntry> {
        self.inner.lock().pending.get(checksum).cloned()
    }

    /// `true` if `checksum` is still in the dedup history.
    pub fn has_seen(&self, checksum: &Checksum) -> bool {
        self.inner.lock().ring.contains(checksum)
    }

    /// Number of `AckBlocking` callers currently waiting.
    pub fn waiting_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    pub fn stats(&self) -> EndpointStats {
        self.inner.lock().stats
    }

    pub fn state(&self) -> EndpointState {
        self.inner.lock().lifecycle
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

async fn receive_loop<T: Transport, C: Codec>(
    endpoint: Weak<Inner<T, C>>,
    transport: Arc<T>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let (bytes, from) = tokio::select! {
            _ = shutdown.changed() => break,
            received = transport.recv_from() => match received {
                Ok(datagram) => datagram,
                Err(TransportError::Closed) => break,
                Err(e) => {
                    log::warn!("[endpoint] receive failed: {e}");
                    continue;
                }
            },
        };

        let Some(inner) = endpoint.upgrade() else { break };
        Endpoint { inner }.on_datagram_received(&bytes, from).await;
    }
    log::debug!("[endpoint] receive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{SimNetwork, SimSocket};

    fn quick() -> EndpointConfig {
        EndpointConfig::local_network()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = quick().with_history_len(0);
        assert!(matches!(
            Endpoint::<SimSocket>::new(config),
            Err(EndpointError::Config(_))
        ));
    }

    #[tokio::test]
    async fn send_before_start_is_not_ready() {
        let endpoint = Endpoint::<SimSocket>::new(quick()).unwrap();
        let dest = "127.0.0.1:9".parse().unwrap();

        let result = endpoint
            .send(&Envelope::data(b"early".to_vec()), dest, SendMode::FireAndForget)
            .await;

        assert!(matches!(result, Err(EndpointError::TransportNotReady)));
        assert_eq!(endpoint.state(), EndpointState::Created);
        assert_eq!(endpoint.local_addr(), None);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let net = SimNetwork::reliable();
        let endpoint = Endpoint::spawn(net.bind_ephemeral(), quick()).unwrap();
        assert!(matches!(
            endpoint.start(net.bind_ephemeral()),
            Err(EndpointError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn shutdown_closes_every_mode() {
        let net = SimNetwork::reliable();
        let endpoint = Endpoint::spawn(net.bind_ephemeral(), quick()).unwrap();
        let dest = net.bind_ephemeral().local_addr();
        endpoint.shutdown();
        endpoint.shutdown();

        for mode in [
            SendMode::FireAndForget,
            SendMode::Burst,
            SendMode::AckBlocking,
            SendMode::AckNonBlocking,
        ] {
            let result = endpoint
                .send(&Envelope::data(b"late".to_vec()), dest, mode)
                .await;
            assert!(matches!(result, Err(EndpointError::Closed)), "{mode:?}");
        }
        assert_eq!(endpoint.state(), EndpointState::Closed);
        assert!(matches!(
            endpoint.start(net.bind_ephemeral()),
            Err(EndpointError::Closed)
        ));
    }

    #[tokio::test]
    async fn registration_is_recorded_without_a_transport() {
        let endpoint = Endpoint::<SimSocket>::new(quick()).unwrap();
        let peer: SocketAddr = "127.0.0.1:7000".parse().unwrap();

        let register = Envelope::register(true).encode();
        endpoint.on_datagram_received(&register, peer).await;

        assert!(endpoint.is_registered(peer));
        assert!(endpoint.acknowledges(peer));
        assert_eq!(endpoint.registered_endpoints().len(), 1);

        endpoint.clear_registrations();
        assert!(!endpoint.is_registered(peer));
        assert!(!endpoint.acknowledges(peer));
    }

    #[tokio::test]
    async fn unmatched_ack_goes_to_the_monitor_queue() {
        let endpoint = Endpoint::<SimSocket>::new(quick()).unwrap();
        let peer: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let stray = Envelope::data(b"never sent".to_vec()).checksum();

        endpoint
            .on_datagram_received(&Envelope::ack(stray).encode(), peer)
            .await;

        let queued = endpoint
            .inner
            .lock()
            .events_rx
            .as_mut()
            .and_then(|rx| rx.try_recv().ok());
        assert_eq!(queued, Some(MonitorEvent::Ack { acked: stray, from: peer }));
    }
}
