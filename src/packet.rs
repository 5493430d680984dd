//! Protocol packet model.
//!
//! A packet is the unit the session layer exchanges with the transport;
//! one-or-more packets are framed into a single payload per HTTP body by
//! the [`parser`](crate::parser).

use bytes::Bytes;

/// The kind of a protocol packet. Wire codes are `0`–`6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Connection established (handshake).
    Open,
    /// Connection teardown.
    Close,
    /// Heartbeat probe.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Application data.
    Message,
    /// Transport upgrade.
    Upgrade,
    /// Zero-content packet used purely to flush a held-open poll.
    Noop,
}

impl PacketType {
    /// The packet's wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Close => 1,
            Self::Ping => 2,
            Self::Pong => 3,
            Self::Message => 4,
            Self::Upgrade => 5,
            Self::Noop => 6,
        }
    }

    /// Parse a wire code back into a packet type.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::Close),
            2 => Some(Self::Ping),
            3 => Some(Self::Pong),
            4 => Some(Self::Message),
            5 => Some(Self::Upgrade),
            6 => Some(Self::Noop),
            _ => None,
        }
    }

    /// The ASCII digit used in text-mode framing.
    #[must_use]
    pub const fn digit(self) -> u8 {
        self.code() + b'0'
    }
}

/// Packet payload: nothing, UTF-8 text, or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketData {
    /// No payload.
    Empty,
    /// UTF-8 text payload. Never the empty string; an empty text payload
    /// is represented as [`PacketData::Empty`].
    Text(String),
    /// Raw binary payload.
    Binary(Bytes),
}

/// One protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The packet kind.
    pub kind: PacketType,
    /// The packet payload.
    pub data: PacketData,
}

impl Packet {
    /// A packet with no payload.
    #[must_use]
    pub const fn empty(kind: PacketType) -> Self {
        Self {
            kind,
            data: PacketData::Empty,
        }
    }

    /// A packet carrying text. An empty string is normalized to
    /// [`PacketData::Empty`] so encoding round-trips.
    #[must_use]
    pub fn text(kind: PacketType, data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            kind,
            data: if data.is_empty() {
                PacketData::Empty
            } else {
                PacketData::Text(data)
            },
        }
    }

    /// A packet carrying raw bytes.
    #[must_use]
    pub fn binary(kind: PacketType, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: PacketData::Binary(data.into()),
        }
    }

    /// The no-op packet used to flush a held-open poll.
    #[must_use]
    pub const fn noop() -> Self {
        Self::empty(PacketType::Noop)
    }

    /// The close packet announcing connection teardown.
    #[must_use]
    pub const fn close() -> Self {
        Self::empty(PacketType::Close)
    }

    /// A message packet carrying text.
    #[must_use]
    pub fn message(data: impl Into<String>) -> Self {
        Self::text(PacketType::Message, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_round_trip() {
        for code in 0..=6 {
            let kind = PacketType::from_code(code).expect("known code");
            assert_eq!(kind.code(), code);
        }
    }

    #[test]
    fn from_code_rejects_out_of_range() {
        assert_eq!(PacketType::from_code(7), None);
        assert_eq!(PacketType::from_code(255), None);
    }

    #[test]
    fn empty_text_normalizes() {
        let packet = Packet::text(PacketType::Ping, "");
        assert_eq!(packet.data, PacketData::Empty);
    }
}
