//! Error types for the polling transport.

use thiserror::Error;

/// Errors reported upward through [`EventSink::on_error`].
///
/// None of these are fatal to the transport: the affected exchange is
/// finished, and the transport remains usable for subsequent exchanges.
/// Inbound buffer overflow has no variant here on purpose — it is handled
/// by destroying the underlying connection, never reported as a protocol
/// error.
///
/// [`EventSink::on_error`]: crate::transport::EventSink::on_error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// A second poll GET arrived while one was still pending.
    #[error("overlap from client")]
    PollOverlap,

    /// A second data POST arrived while one was still in flight.
    #[error("data request overlap from client")]
    DataOverlap,

    /// The poll exchange's connection dropped before a flush.
    #[error("poll connection closed prematurely")]
    PollClosedPrematurely,

    /// The data exchange's connection dropped before end-of-body.
    #[error("data request connection closed prematurely")]
    DataClosedPrematurely,

    /// The inbound payload could not be decoded; the batch was dropped.
    #[error("payload decode error: {0}")]
    Decode(#[from] ParseError),
}

/// Errors while decoding an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A text-mode packet is missing the `length:packet` separator.
    #[error("missing length separator")]
    MissingSeparator,

    /// A packet length field is not a valid decimal number.
    #[error("invalid packet length")]
    InvalidLength,

    /// The payload ended before the announced packet length.
    #[error("unexpected end of payload")]
    UnexpectedEof,

    /// The packet type code is outside the known range.
    #[error("unknown packet type {0}")]
    UnknownType(u8),

    /// A text packet contains invalid UTF-8.
    #[error("packet data is not valid UTF-8")]
    InvalidUtf8,

    /// A binary-mode frame carries an unknown string/binary flag.
    #[error("invalid binary framing")]
    InvalidFraming,

    /// A base64-armored binary packet failed to decode.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
