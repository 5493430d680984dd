//! The per-connection polling transport state machine.
//!
//! One [`PollingTransport`] multiplexes two independent HTTP request
//! lifecycles onto one logical connection:
//!
//! - at most one *poll exchange* (GET), held open until outbound packets
//!   are flushed into its response body;
//! - at most one *data exchange* (POST), whose body is buffered, decoded
//!   and delivered upward when it ends.
//!
//! All methods are synchronous reactions to I/O events; the transport
//! performs no I/O and no waiting of its own. The surrounding runtime is
//! expected to serialize events for a single instance (the `server`
//! module does so with a mutex), so no field needs interior locking.

use bytes::{Bytes, BytesMut};
use core::ops::ControlFlow;
use http::{header, HeaderName, Method, Response, StatusCode};

use crate::error::TransportError;
use crate::exchange::{DataExchange, Dispatch, ExchangeToken, PollExchange, RequestHead, Responder};
use crate::packet::{Packet, PacketType};
use crate::parser::Parser;
use crate::DEFAULT_MAX_BUFFER_SIZE;

/// Upward notification seam to the session layer.
///
/// Calls arrive in event order and never reenter the transport; a sink
/// that needs to call back into the transport (e.g. `send` on drain)
/// should record the event and act after the current transport call
/// returns.
pub trait EventSink {
    /// The outbound channel became ready to flush: a poll exchange is
    /// attached and `writable` is now true.
    fn on_drain(&mut self);

    /// One decoded inbound packet, in wire order.
    fn on_packet(&mut self, packet: Packet);

    /// A non-fatal protocol error; the transport remains usable.
    fn on_error(&mut self, error: TransportError);

    /// The client announced teardown with a close packet; the transport
    /// is now closed.
    fn on_close(&mut self);
}

/// Lifecycle of the transport as a whole. There is no transition out of
/// [`TransportState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Normal operation, cycling between writable and not-writable.
    Open,
    /// A close was requested while not writable; the close packet is
    /// buffered until an outbound channel becomes available.
    Closing,
    /// The close packet has been announced (or the connection destroyed).
    Closed,
}

type CloseCallback = Box<dyn FnOnce() + Send>;

const XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");

/// Server-side HTTP long-polling transport for one logical connection.
pub struct PollingTransport<P, R, S> {
    parser: P,
    sink: S,
    poll: Option<PollExchange<R>>,
    data: Option<DataExchange<R>>,
    inbound: BytesMut,
    pending_close: Option<CloseCallback>,
    writable: bool,
    state: TransportState,
    max_buffer_size: usize,
    supports_binary: bool,
    token_seq: u64,
}

impl<P, R, S> PollingTransport<P, R, S>
where
    P: Parser,
    R: Responder,
    S: EventSink,
{
    /// Create a transport with the default buffer ceiling and text-mode
    /// payload encoding.
    #[must_use]
    pub fn new(parser: P, sink: S) -> Self {
        Self {
            parser,
            sink,
            poll: None,
            data: None,
            inbound: BytesMut::new(),
            pending_close: None,
            writable: false,
            state: TransportState::Open,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            supports_binary: false,
            token_seq: 0,
        }
    }

    /// Set the inbound buffer ceiling. Exceeding it destroys the
    /// underlying connection.
    #[must_use]
    pub const fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Set the payload encoding mode negotiated for this connection.
    #[must_use]
    pub const fn with_supports_binary(mut self, supports_binary: bool) -> Self {
        self.supports_binary = supports_binary;
        self
    }

    /// Whether a poll exchange is attached and not yet flushed. Callers
    /// should only [`send`](Self::send) while this is true.
    #[must_use]
    pub const fn writable(&self) -> bool {
        self.writable
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TransportState {
        self.state
    }

    /// Route an incoming exchange: GET attaches the poll exchange, POST
    /// the data exchange, anything else is answered 500 with an empty
    /// body.
    pub fn handle_request(&mut self, head: RequestHead, responder: R) -> Dispatch {
        match *head.method() {
            Method::GET => self.attach_poll(responder),
            Method::POST => self.attach_data(head, responder),
            ref method => {
                tracing::debug!(%method, "unsupported method on polling transport");
                responder.respond(empty_response(StatusCode::INTERNAL_SERVER_ERROR));
                Dispatch::Rejected
            }
        }
    }

    fn attach_poll(&mut self, responder: R) -> Dispatch {
        if self.poll.is_some() {
            tracing::debug!("poll request overlap");
            self.sink.on_error(TransportError::PollOverlap);
            responder.respond(empty_response(StatusCode::INTERNAL_SERVER_ERROR));
            return Dispatch::Rejected;
        }

        let token = self.next_token();
        self.poll = Some(PollExchange::new(token, responder));
        self.writable = true;
        self.sink.on_drain();

        // A close deferred while unwritable is flushed immediately, so
        // the client is not left polling forever after the server already
        // decided to close.
        if self.writable && self.pending_close.is_some() {
            tracing::debug!("triggering empty send to append close packet");
            self.send(vec![Packet::noop()]);
        }

        Dispatch::Poll(token)
    }

    fn attach_data(&mut self, head: RequestHead, responder: R) -> Dispatch {
        if self.data.is_some() {
            tracing::debug!("data request overlap");
            self.sink.on_error(TransportError::DataOverlap);
            responder.respond(empty_response(StatusCode::INTERNAL_SERVER_ERROR));
            return Dispatch::Rejected;
        }

        let token = self.next_token();
        self.data = Some(DataExchange::new(token, head, responder));
        Dispatch::Data(token)
    }

    /// Append one body chunk of the current data exchange.
    ///
    /// Exceeding the buffer ceiling discards the buffer and destroys the
    /// underlying connection; the excess data may be adversarial, so no
    /// protocol-level response is written.
    pub fn on_data_chunk(&mut self, token: ExchangeToken, chunk: &[u8]) {
        if self.data.as_ref().map(DataExchange::token) != Some(token) {
            return;
        }

        self.inbound.extend_from_slice(chunk);
        if self.inbound.len() > self.max_buffer_size {
            tracing::warn!(
                size = self.inbound.len(),
                limit = self.max_buffer_size,
                "inbound buffer overflow, destroying connection"
            );
            self.inbound.clear();
            if let Some(exchange) = self.data.take() {
                exchange.into_responder().destroy();
            }
        }
    }

    /// End of the data exchange's body: decode the buffer, deliver the
    /// packets upward, then acknowledge the exchange.
    pub fn on_data_end(&mut self, token: ExchangeToken) {
        if self.data.as_ref().map(DataExchange::token) != Some(token) {
            return;
        }
        let Some(exchange) = self.data.take() else {
            return;
        };

        let raw = self.inbound.split();
        self.deliver_inbound(&raw, exchange.binary());

        let response = ack_response(exchange.head());
        exchange.into_responder().respond(response);
    }

    /// The poll exchange's connection dropped before a flush.
    pub fn on_poll_closed(&mut self, token: ExchangeToken) {
        if self.poll.as_ref().map(PollExchange::token) != Some(token) {
            return;
        }

        self.poll = None;
        self.writable = false;
        self.sink.on_error(TransportError::PollClosedPrematurely);
    }

    /// The data exchange's connection dropped before end-of-body.
    pub fn on_data_closed(&mut self, token: ExchangeToken) {
        if self.data.as_ref().map(DataExchange::token) != Some(token) {
            return;
        }

        self.data = None;
        self.inbound.clear();
        self.sink.on_error(TransportError::DataClosedPrematurely);
    }

    /// Flush a batch of outbound packets into the attached poll
    /// exchange's response.
    ///
    /// If a close is pending, a close packet is appended to the batch and
    /// the pending-close callback fires now: the close is announced at
    /// enqueue time, before the physical write completes.
    pub fn send(&mut self, mut packets: Vec<Packet>) {
        if let Some(on_complete) = self.pending_close.take() {
            tracing::debug!("appending close packet to payload");
            packets.push(Packet::close());
            self.state = TransportState::Closed;
            on_complete();
        }

        let encoded = self.parser.encode_payload(&packets, self.supports_binary);
        self.write(encoded);
    }

    /// Request a graceful close.
    ///
    /// An in-flight data exchange is aborted first. If the transport is
    /// writable the close packet goes out right away and `on_complete`
    /// runs synchronously; otherwise the close is buffered and fires
    /// exactly once, when the next send runs or the next poll attaches,
    /// whichever happens first.
    pub fn close(&mut self, on_complete: impl FnOnce() + Send + 'static) {
        if let Some(exchange) = self.data.take() {
            tracing::debug!("aborting ongoing data request");
            self.inbound.clear();
            exchange.into_responder().destroy();
        }

        if self.writable {
            tracing::debug!("transport writable, closing right away");
            self.send(vec![Packet::close()]);
            self.state = TransportState::Closed;
            on_complete();
        } else {
            tracing::debug!("transport not writable, buffering orderly close");
            self.state = TransportState::Closing;
            self.pending_close = Some(Box::new(on_complete));
        }
    }

    fn deliver_inbound(&mut self, raw: &[u8], binary: bool) {
        let mut got_close = false;

        let Self { parser, sink, .. } = self;
        let result = parser.decode_payload(raw, binary, &mut |packet| {
            if packet.kind == PacketType::Close {
                got_close = true;
                return ControlFlow::Break(());
            }
            sink.on_packet(packet);
            ControlFlow::Continue(())
        });

        if let Err(error) = result {
            tracing::warn!(%error, "dropping undecodable payload");
            self.sink.on_error(TransportError::Decode(error));
        }

        if got_close {
            self.handle_close_packet();
        }
    }

    fn handle_close_packet(&mut self) {
        tracing::debug!("received close packet from client");
        if self.writable {
            // Release the held-open poll request.
            self.send(vec![Packet::noop()]);
        }
        self.state = TransportState::Closed;
        self.sink.on_close();
    }

    fn write(&mut self, data: Bytes) {
        let Some(exchange) = self.poll.take() else {
            tracing::warn!("write with no poll exchange attached, dropping payload");
            return;
        };

        self.writable = false;
        exchange
            .into_responder()
            .respond(payload_response(data, self.supports_binary));
    }

    fn next_token(&mut self) -> ExchangeToken {
        self.token_seq += 1;
        ExchangeToken::new(self.token_seq)
    }
}

#[allow(clippy::expect_used)]
fn empty_response(status: StatusCode) -> Response<Bytes> {
    Response::builder()
        .status(status)
        .body(Bytes::new())
        .expect("static response")
}

#[allow(clippy::expect_used)]
fn payload_response(data: Bytes, binary: bool) -> Response<Bytes> {
    let content_type = if binary {
        "application/octet-stream"
    } else {
        "text/plain; charset=UTF-8"
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .body(data)
        .expect("static response")
}

#[allow(clippy::expect_used)]
fn ack_response(head: &RequestHead) -> Response<Bytes> {
    // text/html instead of text/plain, or certain user agents offer the
    // body as a file download.
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html")
        .header(header::CONTENT_LENGTH, 2);

    if head.is_legacy_ie() {
        builder = builder.header(XSS_PROTECTION, "0");
    }

    builder
        .body(Bytes::from_static(b"ok"))
        .expect("static response")
}
