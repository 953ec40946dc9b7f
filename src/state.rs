//! Lifecycle states for the endpoint and for each acknowledged envelope.
//!
//! ```text
//!  endpoint:  CREATED ──start──▶ RUNNING ──shutdown──▶ CLOSED
//!
//!  envelope:  CREATED ──burst──▶ SENT ──resend──▶ RESENT(n) ─┐
//!                                  │                  ▲      │ resend
//!                                  │                  └──────┘
//!                                  ├──ACK──▶ ACKNOWLEDGED
//!                                  ├──fail_timeout, blocking──▶ TIMED_OUT
//!                                  └──fail_timeout, non-blocking──▶ EXPIRED
//! ```

use std::fmt;

/// Where an [`crate::endpoint::Endpoint`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    /// Constructed; no transport attached, sends fail.
    #[default]
    Created,
    /// Transport attached, receive loop and retry monitor running.
    Running,
    /// Shut down; sends fail and background tasks have been told to stop.
    Closed,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Delivery progress of one envelope sent with acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Created,
    /// First burst written; awaiting an ACK.
    Sent,
    /// Retransmitted by the retry monitor this many times.
    Resent(u32),
    Acknowledged,
    /// A blocking send gave up waiting.
    TimedOut,
    /// A non-blocking send exceeded the fail timeout.
    Expired,
}

impl DeliveryState {
    /// `true` once no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acknowledged | Self::TimedOut | Self::Expired)
    }

    /// The state after one more retransmission.
    pub fn resent(self) -> Self {
        match self {
            Self::Resent(n) => Self::Resent(n.saturating_add(1)),
            _ => Self::Resent(1),
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resent(n) => write!(f, "Resent({n})"),
            other => write!(f, "{other:?}"),
        }
    }
}
