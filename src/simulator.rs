//! In-memory datagram network for tests and demos.
//!
//! [`SimNetwork`] is a shared switchboard: every [`SimSocket`] bound on it
//! gets a mailbox, and `send_to` drops the datagram straight into the
//! destination's mailbox after running it through the fault model.
//!
//! | Fault       | Knob                               | Effect                              |
//! |-------------|------------------------------------|-------------------------------------|
//! | Loss        | `loss_rate`                        | datagram never arrives              |
//! | Reordering  | `reorder_rate`, `reorder_delay`    | held back so later ones overtake it |
//! | Duplication | `duplicate_rate`                   | delivered twice                     |
//!
//! Faults come from a `StdRng` seeded by `SimulatorConfig::seed`, so a
//! failing run replays exactly.  Every write is logged whether or not it
//! was delivered; tests assert on that log.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::transport::{Transport, TransportError};

type Datagram = (Vec<u8>, SocketAddr);

/// First port handed out by [`SimNetwork::bind_ephemeral`].
const EPHEMERAL_PORT_BASE: u16 = 40_000;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is reordered.
    pub reorder_rate: f64,
    /// Fixed delay applied to reordered datagrams.
    pub reorder_delay: Duration,
    /// Probability that a datagram is duplicated.
    pub duplicate_rate: f64,
    /// Seed for the fault RNG.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            reorder_rate: 0.0,
            reorder_delay: Duration::ZERO,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

/// One write observed by the simulated network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub from: SocketAddr,
    pub to: SocketAddr,
    pub bytes: Vec<u8>,
    /// `false` when the fault model dropped it or nobody was bound at `to`.
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// SimNetwork
// ---------------------------------------------------------------------------

/// A shared in-process "wire" connecting any number of [`SimSocket`]s.
///
/// Cloning yields another handle to the same network.
#[derive(Clone)]
pub struct SimNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

struct NetworkInner {
    config: SimulatorConfig,
    rng: StdRng,
    sockets: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    log: Vec<SentDatagram>,
    next_port: u16,
}

impl SimNetwork {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner: Arc::new(Mutex::new(NetworkInner {
                config,
                rng,
                sockets: HashMap::new(),
                log: Vec::new(),
                next_port: EPHEMERAL_PORT_BASE,
            })),
        }
    }

    /// A network that never loses, delays or duplicates anything.
    pub fn reliable() -> Self {
        Self::new(SimulatorConfig::default())
    }

    fn lock(&self) -> MutexGuard<'_, NetworkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a socket at `addr`.
    pub fn bind(&self, addr: SocketAddr) -> Result<SimSocket, TransportError> {
        let mut inner = self.lock();
        if inner.sockets.contains_key(&addr) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("{addr} already bound on the simulated network"),
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.sockets.insert(addr, tx);
        Ok(SimSocket {
            local_addr: addr,
            network: self.clone(),
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    /// Attach a socket on the next free loopback port.
    pub fn bind_ephemeral(&self) -> SimSocket {
        loop {
            let port = {
                let mut inner = self.lock();
                let port = inner.next_port;
                inner.next_port = inner.next_port.wrapping_add(1).max(EPHEMERAL_PORT_BASE);
                port
            };
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            if let Ok(socket) = self.bind(addr) {
                return socket;
            }
        }
    }

    /// Change the loss probability for subsequent writes.
    pub fn set_loss_rate(&self, loss_rate: f64) {
        self.lock().config.loss_rate = loss_rate;
    }

    /// Every write seen so far, in order.
    pub fn sent(&self) -> Vec<SentDatagram> {
        self.lock().log.clone()
    }

    /// Payloads written from `from` to `to`, in order.
    pub fn sent_between(&self, from: SocketAddr, to: SocketAddr) -> Vec<Vec<u8>> {
        self.lock()
            .log
            .iter()
            .filter(|d| d.from == from && d.to == to)
            .map(|d| d.bytes.clone())
            .collect()
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, bytes: &[u8]) {
        let mut inner = self.lock();
        let NetworkInner {
            config,
            rng,
            sockets,
            log,
            ..
        } = &mut *inner;

        let lost = rng.random_bool(config.loss_rate.clamp(0.0, 1.0));
        let target = sockets.get(&to).filter(|_| !lost).cloned();
        log.push(SentDatagram {
            from,
            to,
            bytes: bytes.to_vec(),
            delivered: target.is_some(),
        });

        let Some(tx) = target else {
            log::trace!("[sim] {from} -> {to}: dropped ({} bytes)", bytes.len());
            return;
        };

        let copies = if rng.random_bool(config.duplicate_rate.clamp(0.0, 1.0)) {
            2
        } else {
            1
        };
        let reorder = rng.random_bool(config.reorder_rate.clamp(0.0, 1.0));
        let delay = config.reorder_delay;
        drop(inner);

        for _ in 0..copies {
            let datagram = (bytes.to_vec(), from);
            if reorder && !delay.is_zero() {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(datagram);
                });
            } else {
                // A closed receiver behaves like an unbound port.
                let _ = tx.send(datagram);
            }
        }
    }

    fn unbind(&self, addr: SocketAddr) {
        self.lock().sockets.remove(&addr);
    }
}

// ---------------------------------------------------------------------------
// SimSocket
// ---------------------------------------------------------------------------

/// A [`Transport`] attached to a [`SimNetwork`].
///
/// Dropping the socket frees its address; later writes to it are lost.
pub struct SimSocket {
    local_addr: SocketAddr,
    network: SimNetwork,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl Transport for SimSocket {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.network.deliver(self.local_addr, dest, bytes);
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        self.rx.lock().await.recv().await.ok_or(TransportError::Closed)
    }
}

impl Drop for SimSocket {
    fn drop(&mut self) {
        self.network.unbind(self.local_addr);
    }
}
