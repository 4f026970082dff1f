//! Error types for the HomeKit source.

use std::fmt;

/// Errors that can occur while dialing, negotiating with, or streaming
/// from a HomeKit camera accessory.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Configuration**: [`Url`](Self::Url), [`MissingParam`](Self::MissingParam),
///   [`InvalidKey`](Self::InvalidKey): malformed connection URLs.
/// - **Negotiation**: [`Negotiation`](Self::Negotiation),
///   [`Tlv8`](Self::Tlv8), [`Base64`](Self::Base64): unusable capability
///   descriptors.
/// - **Producer**: [`NoTracks`](Self::NoTracks), [`AlreadyStarted`](Self::AlreadyStarted).
/// - **Accessory**: [`Accessory`](Self::Accessory),
///   [`StreamRejected`](Self::StreamRejected): collaborator failures.
/// - **Transport**: [`Rtp`](Self::Rtp), [`Io`](Self::Io).
#[derive(Debug, thiserror::Error)]
pub enum HomekitError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection URL could not be parsed.
    #[error("invalid connection URL: {0}")]
    Url(#[from] url::ParseError),

    /// A required query parameter is absent from the connection URL.
    #[error("missing query parameter: {0}")]
    MissingParam(&'static str),

    /// A long-term key parameter is not valid hex.
    #[error("invalid key in parameter: {0}")]
    InvalidKey(&'static str),

    /// [`Client::start`](crate::Client::start) was called with no receivers.
    #[error("producer without tracks")]
    NoTracks,

    /// [`Client::start`](crate::Client::start) was called while already streaming.
    #[error("producer already started")]
    AlreadyStarted,

    /// Capability descriptors are missing or cannot be narrowed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// Malformed TLV8 payload or missing TLV8 field.
    #[error("TLV8 error: {kind}")]
    Tlv8 { kind: Tlv8ErrorKind },

    /// Characteristic value is not valid base64.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Failure reported by the accessory connection (dial, read, image, close).
    #[error("accessory error: {0}")]
    Accessory(String),

    /// The accessory declined to open the remote stream.
    #[error("stream rejected by accessory: {0}")]
    StreamRejected(String),

    /// Malformed RTP datagram handed to the session registry.
    #[error("RTP error: {0}")]
    Rtp(&'static str),

    /// Status serialization or accessory JSON decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Specific kind of TLV8 failure.
#[derive(Debug)]
pub enum Tlv8ErrorKind {
    /// An item header promised more bytes than the buffer holds.
    Truncated,
    /// A required tag was not present.
    MissingTag(u8),
    /// A tag was present with a value of the wrong width.
    InvalidLength { tag: u8, len: usize },
}

impl fmt::Display for Tlv8ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated item"),
            Self::MissingTag(tag) => write!(f, "missing tag {tag:#04x}"),
            Self::InvalidLength { tag, len } => {
                write!(f, "tag {tag:#04x} has invalid length {len}")
            }
        }
    }
}

impl From<Tlv8ErrorKind> for HomekitError {
    fn from(kind: Tlv8ErrorKind) -> Self {
        HomekitError::Tlv8 { kind }
    }
}

/// Convenience alias for `Result<T, HomekitError>`.
pub type Result<T> = std::result::Result<T, HomekitError>;
