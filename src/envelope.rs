//! Message envelope and its wire format.
//!
//! Every datagram exchanged between endpoints carries exactly one
//! [`Envelope`].  This module is responsible for:
//! - Defining the envelope kinds and the content-derived [`Checksum`] that
//!   identifies an envelope for deduplication and acknowledgement.
//! - Serialising an [`Envelope`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into an [`Envelope`], returning
//!   errors for malformed, truncated or corrupted input.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |                    Nonce                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |                Payload Length                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |                                               |
//! +-+-+-+-+-+-+-+-+            Checksum (64 bit)                  +
//! |                                                               |
//! +               +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |              Payload ...                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 17 bytes.
//! kind(1) + nonce(4) + payload_len(4) + checksum(8)

use std::fmt;

use rand::Rng;
use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 17;

// Byte offsets of each field within the serialised header.
const OFF_KIND: usize = 0;
const OFF_NONCE: usize = 1;
const OFF_PAYLOAD_LEN: usize = 5;
const OFF_CHECKSUM: usize = 9;

/// Payload length of an ACK envelope: the acknowledged checksum.
const ACK_PAYLOAD_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

/// Content-derived identifier of an envelope.
///
/// The first 8 bytes of the BLAKE3 digest over `kind || nonce || payload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum(pub u64);

impl Checksum {
    fn compute(kind: MessageKind, nonce: u32, payload: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[kind as u8]);
        hasher.update(&nonce.to_be_bytes());
        hasher.update(payload);
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();
        Self(u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// What an envelope means to the receiving endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Application payload.
    Data = 1,
    /// Acknowledges the envelope whose checksum is carried in the payload.
    Ack = 2,
    /// Announces the sender to the receiving endpoint.
    Register = 3,
    /// Announces the sender and asks the receiver to acknowledge every
    /// envelope the sender transmits from now on.
    RegisterWithAck = 4,
}

impl MessageKind {
    /// `true` for both registration kinds.
    pub fn is_registration(self) -> bool {
        matches!(self, Self::Register | Self::RegisterWithAck)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(Self::Data),
            2 => Ok(Self::Ack),
            3 => Ok(Self::Register),
            4 => Ok(Self::RegisterWithAck),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Register => "REGISTER",
            Self::RegisterWithAck => "REGISTER_WITH_ACK",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One unit of message exchange: kind, identifier and payload.
///
/// Envelopes are immutable.  The checksum is computed once by the
/// constructor and travels with the envelope through every resend, so a
/// retransmission is recognised as a duplicate by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: MessageKind,
    nonce: u32,
    checksum: Checksum,
    payload: Vec<u8>,
}

impl Envelope {
    /// Build an envelope with a fresh random nonce.
    pub fn new(kind: MessageKind, payload: impl Into<Vec<u8>>) -> Self {
        Self::with_nonce(kind, rand::rng().random(), payload)
    }

    /// Build an envelope with an explicit nonce.
    ///
    /// Two envelopes with equal kind, nonce and payload share a checksum.
    pub fn with_nonce(kind: MessageKind, nonce: u32, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        let checksum = Checksum::compute(kind, nonce, &payload);
        Self {
            kind,
            nonce,
            checksum,
            payload,
        }
    }

    /// A DATA envelope carrying `payload`.
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageKind::Data, payload)
    }

    /// An ACK referencing `acknowledged`.
    ///
    /// The nonce is fixed so that every ACK for the same envelope is
    /// byte-identical and deduplicated by the original sender.
    pub fn ack(acknowledged: Checksum) -> Self {
        Self::with_nonce(MessageKind::Ack, 0, acknowledged.0.to_be_bytes())
    }

    /// A REGISTER or REGISTER_WITH_ACK envelope.
    pub fn register(request_acks: bool) -> Self {
        let kind = if request_acks {
            MessageKind::RegisterWithAck
        } else {
            MessageKind::Register
        };
        Self::new(kind, Vec::new())
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the envelope and return its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// For ACK envelopes, the checksum of the acknowledged envelope.
    pub fn acknowledged_id(&self) -> Option<Checksum> {
        if self.kind != MessageKind::Ack {
            return None;
        }
        match self.payload.as_slice() {
            [a, b, c, d, e, f, g, h] => Some(Checksum(u64::from_be_bytes([
                *a, *b, *c, *d, *e, *f, *g, *h,
            ]))),
            _ => None,
        }
    }

    /// Serialise this envelope into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];

        buf[OFF_KIND] = self.kind as u8;
        buf[OFF_NONCE..OFF_NONCE + 4].copy_from_slice(&self.nonce.to_be_bytes());
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 4]
            .copy_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 8].copy_from_slice(&self.checksum.0.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        buf
    }

    /// Parse an [`Envelope`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the kind byte is not a known [`MessageKind`],
    /// - the `payload_len` field disagrees with `buf.len()`,
    /// - an ACK does not carry exactly one checksum, or
    /// - the checksum does not match the recomputed value.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::BufferTooShort);
        }

        let kind = MessageKind::try_from(buf[OFF_KIND])?;
        let nonce = read_u32(buf, OFF_NONCE);
        let payload_len = read_u32(buf, OFF_PAYLOAD_LEN) as usize;
        let checksum = Checksum(read_u64(buf, OFF_CHECKSUM));

        if buf.len() - HEADER_LEN != payload_len {
            return Err(DecodeError::LengthMismatch);
        }
        if kind == MessageKind::Ack && payload_len != ACK_PAYLOAD_LEN {
            return Err(DecodeError::MalformedAck);
        }

        let envelope = Self::with_nonce(kind, nonce, &buf[HEADER_LEN..]);
        if envelope.checksum != checksum {
            return Err(DecodeError::ChecksumMismatch);
        }
        Ok(envelope)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.acknowledged_id() {
            Some(acked) => write!(f, "{}[{}] -> {}", self.kind, self.checksum, acked),
            None => write!(
                f,
                "{}[{}] ({} bytes)",
                self.kind,
                self.checksum,
                self.payload.len()
            ),
        }
    }
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn read_u64(buf: &[u8], off: usize) -> u64 {
    let hi = u64::from(read_u32(buf, off));
    let lo = u64::from(read_u32(buf, off + 4));
    (hi << 32) | lo
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer too short to contain an envelope header")]
    BufferTooShort,
    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),
    #[error("payload_len field does not match remaining bytes")]
    LengthMismatch,
    #[error("ACK payload must be exactly one checksum")]
    MalformedAck,
    #[error("checksum verification failed")]
    ChecksumMismatch,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Turns envelopes into datagrams and back.
pub trait Codec: Send + Sync + 'static {
    fn encode(&self, envelope: &Envelope) -> Vec<u8>;
    fn decode(&self, buf: &[u8]) -> Result<Envelope, DecodeError>;
}

/// The binary layout documented at the top of this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl Codec for WireCodec {
    fn encode(&self, envelope: &Envelope) -> Vec<u8> {
        envelope.encode()
    }

    fn decode(&self, buf: &[u8]) -> Result<Envelope, DecodeError> {
        Envelope::decode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let env = Envelope::with_nonce(MessageKind::Data, 7, b"hello".to_vec());
        let decoded = Envelope::decode(&env.encode()).unwrap();
        assert_eq!(decoded, env);
        assert_eq!(decoded.payload(), b"hello");
    }

    #[test]
    fn encoded_length_equals_header_plus_payload() {
        let payload = b"exactly twelve!";
        let bytes = Envelope::data(payload.to_vec()).encode();
        assert_eq!(bytes.len(), HEADER_LEN + payload.len());
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Envelope::decode(&[]), Err(DecodeError::BufferTooShort));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Envelope::decode(&[0u8; HEADER_LEN - 1]),
            Err(DecodeError::BufferTooShort)
        );
    }

    #[test]
    fn decode_unknown_kind_returns_error() {
        let mut bytes = Envelope::data(b"x".to_vec()).encode();
        bytes[OFF_KIND] = 0x7f;
        assert_eq!(Envelope::decode(&bytes), Err(DecodeError::UnknownKind(0x7f)));
    }

    #[test]
    fn decode_truncated_payload_returns_error() {
        let mut bytes = Envelope::data(b"data".to_vec()).encode();
        bytes.pop();
        assert_eq!(Envelope::decode(&bytes), Err(DecodeError::LengthMismatch));
    }

    #[test]
    fn decode_corrupt_payload_returns_checksum_error() {
        let mut bytes = Envelope::data(b"test".to_vec()).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert_eq!(Envelope::decode(&bytes), Err(DecodeError::ChecksumMismatch));
    }

    #[test]
    fn decode_ack_with_wrong_payload_is_rejected() {
        let bogus = Envelope::with_nonce(MessageKind::Ack, 0, vec![1, 2, 3]);
        assert_eq!(
            Envelope::decode(&bogus.encode()),
            Err(DecodeError::MalformedAck)
        );
    }

    #[test]
    fn header_fields_big_endian_on_wire() {
        let env = Envelope::with_nonce(MessageKind::Register, 0x0102_0304, Vec::new());
        let bytes = env.encode();
        assert_eq!(bytes[OFF_KIND], MessageKind::Register as u8);
        assert_eq!(&bytes[OFF_NONCE..OFF_NONCE + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 4], &[0, 0, 0, 0]);
        assert_eq!(
            &bytes[OFF_CHECKSUM..OFF_CHECKSUM + 8],
            &env.checksum().0.to_be_bytes()
        );
    }

    #[test]
    fn ack_references_acknowledged_checksum() {
        let data = Envelope::data(b"payload".to_vec());
        let ack = Envelope::ack(data.checksum());
        assert_eq!(ack.kind(), MessageKind::Ack);
        assert_eq!(ack.acknowledged_id(), Some(data.checksum()));
        assert_eq!(data.acknowledged_id(), None);
    }

    #[test]
    fn acks_for_same_envelope_are_identical() {
        let data = Envelope::data(b"payload".to_vec());
        assert_eq!(
            Envelope::ack(data.checksum()).encode(),
            Envelope::ack(data.checksum()).encode()
        );
    }

    #[test]
    fn checksum_is_deterministic_for_same_content() {
        let a = Envelope::with_nonce(MessageKind::Data, 42, b"same".to_vec());
        let b = Envelope::with_nonce(MessageKind::Data, 42, b"same".to_vec());
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn checksum_depends_on_kind_and_nonce() {
        let base = Envelope::with_nonce(MessageKind::Data, 1, b"same".to_vec());
        let other_nonce = Envelope::with_nonce(MessageKind::Data, 2, b"same".to_vec());
        let other_kind = Envelope::with_nonce(MessageKind::Register, 1, b"same".to_vec());
        assert_ne!(base.checksum(), other_nonce.checksum());
        assert_ne!(base.checksum(), other_kind.checksum());
    }

    #[test]
    fn register_kind_follows_request() {
        assert_eq!(Envelope::register(false).kind(), MessageKind::Register);
        assert_eq!(Envelope::register(true).kind(), MessageKind::RegisterWithAck);
        assert!(MessageKind::RegisterWithAck.is_registration());
        assert!(!MessageKind::Data.is_registration());
    }

    #[test]
    fn wire_codec_matches_inherent_encoding() {
        let env = Envelope::data(b"codec".to_vec());
        let codec = WireCodec;
        assert_eq!(codec.encode(&env), env.encode());
        assert_eq!(codec.decode(&env.encode()).unwrap(), env);
    }
}
