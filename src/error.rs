use thiserror::Error;

use crate::config::ConfigError;
use crate::envelope::Checksum;
use crate::transport::TransportError;

/// Errors surfaced by [`crate::endpoint::Endpoint`] operations.
///
/// Acknowledgement timeouts are not errors: a blocking send that hears
/// nothing back returns `Ok(false)`.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// No transport attached yet; call `start` first.
    #[error("transport not ready: endpoint has not been started")]
    TransportNotReady,

    #[error("endpoint is shut down")]
    Closed,

    #[error("endpoint already started")]
    AlreadyStarted,

    /// An acknowledged send of this envelope is still in flight.
    #[error("envelope {0} is already awaiting acknowledgement")]
    AlreadyPending(Checksum),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
