//! `udp-endpoint` — acknowledged, deduplicated message delivery over UDP.
//!
//! # Architecture
//!
//! ```text
//!   send(envelope, dest, mode)          receive handler
//!             │                                ▲
//!  ┌──────────▼────────────────────────────────┴──────┐
//!  │                     Endpoint                     │
//!  │  registrations · blocked waiters · statistics    │
//!  └───┬──────────────┬──────────────────────▲────────┘
//!      │ track        │ Ack / Pending        │ accepted envelopes
//!  ┌───▼──────────┐ ┌─▼─────────────┐  ┌─────┴──────┐
//!  │ PendingTable │◀│ Retry monitor │  │ DedupRing  │
//!  └──────────────┘ └─┬─────────────┘  └─────▲──────┘
//!                     │ resend               │ decoded
//!  ┌──────────────────▼──────────────────────┴──────┐
//!  │            Codec  (WireCodec: blake3 ids)      │
//!  └──────────────────┬──────────────────────▲──────┘
//!                     │ raw datagrams        │
//!  ┌──────────────────▼──────────────────────┴──────┐
//!  │   Transport  (UdpTransport · SimSocket)        │
//!  └────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once with duplicate filtering on the receiving
//! side.  There is no ordering, flow control or congestion control.
//!
//! Each module has a single responsibility:
//! - [`envelope`]   — message envelope, checksum and wire codec
//! - [`ring`]       — bounded duplicate-suppression history
//! - [`pending`]    — outbound envelopes awaiting acknowledgement
//! - `monitor`      — background resend / expiry task
//! - [`endpoint`]   — dispatch, registration, send modes, lifecycle
//! - [`state`]      — endpoint lifecycle and per-envelope delivery states
//! - [`config`]     — timeouts, burst and history settings
//! - [`error`]      — endpoint error type
//! - [`transport`]  — datagram transport trait and UDP implementation
//! - [`simulator`]  — in-memory lossy network for testing

pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
mod monitor;
pub mod pending;
pub mod ring;
pub mod simulator;
pub mod state;
pub mod transport;

pub use config::{ConfigError, EndpointConfig};
pub use endpoint::{Endpoint, EndpointStats, SendMode};
pub use envelope::{Checksum, Codec, DecodeError, Envelope, MessageKind, WireCodec};
pub use error::EndpointError;
pub use state::{DeliveryState, EndpointState};
pub use transport::{Transport, TransportError, UdpTransport};
