//! # Engine Polling
//!
//! Server-side HTTP long-polling transport for an Engine.IO-style
//! bidirectional, message-oriented realtime protocol. A sequence of
//! stateless HTTP request/response pairs is turned into a logically
//! continuous duplex packet stream:
//!
//! ```text
//! ┌──────────┐                              ┌──────────┐
//! │  Client   │                              │  Server   │
//! └────┬─────┘                              └────┬─────┘
//!      │                                         │
//!      │  GET /  (poll)                          │
//!      │ ──────────────────────────────────────►  │
//!      │           ... (held open) ...           │ send(packets)
//!      │  200 + encoded payload                  │
//!      │ ◄──────────────────────────────────────  │
//!      │                                         │
//!      │  POST /  (data)                         │
//!      │  Body: encoded payload                  │
//!      │ ──────────────────────────────────────►  │ packets delivered
//!      │  200 "ok"                               │ upward, in wire order
//!      │ ◄──────────────────────────────────────  │
//! ```
//!
//! # Architecture
//!
//! The core is [`transport::PollingTransport`], a per-connection state
//! machine that pairs two independent HTTP request lifecycles — a
//! long-held poll GET and a transient data POST — onto one logical
//! connection, detects client protocol violations (overlapping
//! exchanges), and implements a race-free close handshake without ever
//! answering an HTTP request twice.
//!
//! The transport is synchronous and event-driven; it performs no I/O of
//! its own. The HTTP layer feeds it exchanges and body events through
//! [`transport::PollingTransport::handle_request`] and friends, and it
//! talks back through two narrow seams:
//!
//! - [`exchange::Responder`] — a single-shot response handle, consumed on
//!   use, so an exchange can never be double-answered.
//! - [`transport::EventSink`] — upward notifications (drain / packet /
//!   error / close) to the session layer.
//!
//! Payload bytes are encoded and decoded by a [`parser::Parser`]
//! collaborator; [`parser::PayloadCodec`] implements the standard
//! framing.
//!
//! With the `server` feature (default), [`server::PollingHandler`]
//! bridges the state machine to real `hyper` connections.

pub mod error;
pub mod exchange;
pub mod packet;
pub mod parser;
pub mod transport;

#[cfg(feature = "server")]
pub mod server;

/// Default ceiling on the inbound (POST body) buffer, in bytes.
///
/// A data request whose accumulated body exceeds this is treated as
/// hostile: the buffer is discarded and the underlying connection is
/// destroyed without an HTTP response.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 100 * 1024 * 1024;
