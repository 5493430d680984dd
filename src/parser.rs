//! Payload codec: the Parser collaborator contract and its standard
//! implementation.
//!
//! A payload is one encoded batch of packets carried in a single HTTP
//! body. The transport treats payloads as opaque bytes keyed only by a
//! binary/text mode flag negotiated once per connection; this module owns
//! the actual framing:
//!
//! Text mode — per packet `<byte-length>:<packet>` where `<packet>` is
//! the type digit followed by UTF-8 data. Binary data in text mode is
//! armored as `b<digit><base64>`.
//!
//! Binary mode — per packet:
//!
//! ```text
//! ┌──────┬─────────────────────┬──────┬─────────┐
//! │ flag │ length digits (0–9)  │ 0xFF │ payload │
//! └──────┴─────────────────────┴──────┴─────────┘
//! ```
//!
//! where flag `0` marks a string payload (type digit + text) and flag `1`
//! a binary payload (type code byte + raw data). Lengths count bytes.

use core::fmt::Write as _;
use core::ops::ControlFlow;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;

use crate::error::ParseError;
use crate::packet::{Packet, PacketData, PacketType};

/// Longest accepted run of length digits in binary framing. Ten decimal
/// digits already exceed any plausible buffer ceiling.
const MAX_LENGTH_DIGITS: usize = 10;

/// The packet codec contract the transport depends on.
///
/// Decoding is callback-per-packet: decode order is delivery order, and
/// the callback can stop the batch early by returning
/// [`ControlFlow::Break`] (used when a close packet is encountered).
pub trait Parser {
    /// Encode a batch of packets into one payload.
    fn encode_payload(&self, packets: &[Packet], binary: bool) -> Bytes;

    /// Decode a payload, invoking `on_packet` once per packet in wire
    /// order.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the payload is malformed; packets
    /// already handed to the callback stand.
    fn decode_payload(
        &self,
        raw: &[u8],
        binary: bool,
        on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
    ) -> Result<(), ParseError>;
}

/// The standard payload framing described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec;

impl Parser for PayloadCodec {
    fn encode_payload(&self, packets: &[Packet], binary: bool) -> Bytes {
        if binary {
            encode_binary(packets)
        } else {
            encode_text(packets)
        }
    }

    fn decode_payload(
        &self,
        raw: &[u8],
        binary: bool,
        on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
    ) -> Result<(), ParseError> {
        if binary {
            decode_binary(raw, on_packet)
        } else {
            decode_text(raw, on_packet)
        }
    }
}

fn encode_text(packets: &[Packet]) -> Bytes {
    let mut out = String::new();
    for packet in packets {
        let encoded = encode_packet_text(packet);
        let _ = write!(out, "{}:{}", encoded.len(), encoded);
    }
    Bytes::from(out)
}

fn encode_packet_text(packet: &Packet) -> String {
    let digit = char::from(packet.kind.digit());
    match &packet.data {
        PacketData::Empty => digit.to_string(),
        PacketData::Text(text) => format!("{digit}{text}"),
        PacketData::Binary(data) => format!("b{digit}{}", BASE64.encode(data)),
    }
}

fn encode_binary(packets: &[Packet]) -> Bytes {
    let mut out = Vec::new();
    for packet in packets {
        let (flag, payload): (u8, Vec<u8>) = match &packet.data {
            PacketData::Binary(data) => {
                let mut payload = Vec::with_capacity(data.len() + 1);
                payload.push(packet.kind.code());
                payload.extend_from_slice(data);
                (1, payload)
            }
            _ => (0, encode_packet_text(packet).into_bytes()),
        };

        out.push(flag);
        for digit in payload.len().to_string().bytes() {
            out.push(digit - b'0');
        }
        out.push(0xFF);
        out.extend_from_slice(&payload);
    }
    Bytes::from(out)
}

fn decode_text(
    raw: &[u8],
    on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
) -> Result<(), ParseError> {
    let mut rest = raw;
    while !rest.is_empty() {
        let sep = rest
            .iter()
            .position(|&b| b == b':')
            .ok_or(ParseError::MissingSeparator)?;
        let len: usize = core::str::from_utf8(&rest[..sep])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ParseError::InvalidLength)?;

        let start = sep + 1;
        let end = start.checked_add(len).ok_or(ParseError::InvalidLength)?;
        if end > rest.len() {
            return Err(ParseError::UnexpectedEof);
        }

        let packet = decode_packet_text(&rest[start..end])?;
        rest = &rest[end..];

        if on_packet(packet).is_break() {
            return Ok(());
        }
    }
    Ok(())
}

fn decode_packet_text(raw: &[u8]) -> Result<Packet, ParseError> {
    let text = core::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8)?;

    if let Some(armored) = text.strip_prefix('b') {
        let type_byte = *armored.as_bytes().first().ok_or(ParseError::UnexpectedEof)?;
        let kind = packet_type_from_digit(type_byte)?;
        let data = BASE64.decode(&armored[1..])?;
        return Ok(Packet::binary(kind, data));
    }

    let type_byte = *raw.first().ok_or(ParseError::UnexpectedEof)?;
    let kind = packet_type_from_digit(type_byte)?;
    Ok(Packet::text(kind, &text[1..]))
}

fn decode_binary(
    raw: &[u8],
    on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
) -> Result<(), ParseError> {
    let mut rest = raw;
    while !rest.is_empty() {
        let flag = rest[0];
        if flag > 1 {
            return Err(ParseError::InvalidFraming);
        }
        rest = &rest[1..];

        let mut len: usize = 0;
        let mut digits = 0;
        loop {
            let (&byte, tail) = rest.split_first().ok_or(ParseError::UnexpectedEof)?;
            rest = tail;
            if byte == 0xFF {
                break;
            }
            if byte > 9 || digits == MAX_LENGTH_DIGITS {
                return Err(ParseError::InvalidLength);
            }
            len = len * 10 + usize::from(byte);
            digits += 1;
        }
        if digits == 0 {
            return Err(ParseError::InvalidLength);
        }
        if len > rest.len() {
            return Err(ParseError::UnexpectedEof);
        }

        let (payload, tail) = rest.split_at(len);
        rest = tail;

        let packet = if flag == 1 {
            let (&code, data) = payload.split_first().ok_or(ParseError::UnexpectedEof)?;
            let kind = PacketType::from_code(code).ok_or(ParseError::UnknownType(code))?;
            Packet::binary(kind, Bytes::copy_from_slice(data))
        } else {
            decode_packet_text(payload)?
        };

        if on_packet(packet).is_break() {
            return Ok(());
        }
    }
    Ok(())
}

fn packet_type_from_digit(byte: u8) -> Result<PacketType, ParseError> {
    byte.checked_sub(b'0')
        .and_then(PacketType::from_code)
        .ok_or(ParseError::UnknownType(byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &PayloadCodec, raw: &[u8], binary: bool) -> Vec<Packet> {
        let mut packets = Vec::new();
        codec
            .decode_payload(raw, binary, &mut |packet| {
                packets.push(packet);
                ControlFlow::Continue(())
            })
            .expect("decode");
        packets
    }

    #[test]
    fn text_payload_round_trips() {
        let codec = PayloadCodec;
        let packets = vec![
            Packet::message("hello"),
            Packet::empty(PacketType::Ping),
            Packet::noop(),
        ];

        let encoded = codec.encode_payload(&packets, false);
        assert_eq!(&encoded[..], b"6:4hello1:21:6");
        assert_eq!(decode_all(&codec, &encoded, false), packets);
    }

    #[test]
    fn binary_in_text_mode_is_base64_armored() {
        let codec = PayloadCodec;
        let packets = vec![Packet::binary(PacketType::Message, vec![0u8, 1, 255])];

        let encoded = codec.encode_payload(&packets, false);
        assert_eq!(&encoded[..], b"6:b4AAH/");
        assert_eq!(decode_all(&codec, &encoded, false), packets);
    }

    #[test]
    fn binary_payload_round_trips_mixed_packets() {
        let codec = PayloadCodec;
        let packets = vec![
            Packet::binary(PacketType::Message, vec![0u8, 1, 2, 3]),
            Packet::message("text"),
            Packet::close(),
        ];

        let encoded = codec.encode_payload(&packets, true);
        assert_eq!(decode_all(&codec, &encoded, true), packets);
    }

    #[test]
    fn empty_payload_decodes_to_nothing() {
        let codec = PayloadCodec;
        assert!(decode_all(&codec, b"", false).is_empty());
        assert!(decode_all(&codec, b"", true).is_empty());
    }

    #[test]
    fn callback_break_stops_the_batch() {
        let codec = PayloadCodec;
        let packets = vec![Packet::message("a"), Packet::close(), Packet::message("b")];
        let encoded = codec.encode_payload(&packets, false);

        let mut seen = Vec::new();
        codec
            .decode_payload(&encoded, false, &mut |packet| {
                if packet.kind == PacketType::Close {
                    return ControlFlow::Break(());
                }
                seen.push(packet);
                ControlFlow::Continue(())
            })
            .expect("decode");

        assert_eq!(seen, vec![Packet::message("a")]);
    }

    #[test]
    fn rejects_malformed_text_payloads() {
        let codec = PayloadCodec;
        let mut sink = |_: Packet| ControlFlow::Continue(());

        assert_eq!(
            codec.decode_payload(b"4hello", false, &mut sink),
            Err(ParseError::MissingSeparator)
        );
        assert_eq!(
            codec.decode_payload(b"abc:4hi", false, &mut sink),
            Err(ParseError::InvalidLength)
        );
        assert_eq!(
            codec.decode_payload(b"10:4hi", false, &mut sink),
            Err(ParseError::UnexpectedEof)
        );
        assert_eq!(
            codec.decode_payload(b"1:9", false, &mut sink),
            Err(ParseError::UnknownType(b'9'))
        );
    }

    #[test]
    fn rejects_malformed_binary_payloads() {
        let codec = PayloadCodec;
        let mut sink = |_: Packet| ControlFlow::Continue(());

        assert_eq!(
            codec.decode_payload(&[2, 1, 0xFF, b'4'], true, &mut sink),
            Err(ParseError::InvalidFraming)
        );
        assert_eq!(
            codec.decode_payload(&[0, 5, 0xFF, b'4'], true, &mut sink),
            Err(ParseError::UnexpectedEof)
        );
        assert_eq!(
            codec.decode_payload(&[0, 0xFF, b'4'], true, &mut sink),
            Err(ParseError::InvalidLength)
        );
    }
}
