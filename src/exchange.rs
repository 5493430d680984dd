//! The HTTP exchange abstraction the transport is driven by.
//!
//! An exchange is one request/response pair. The transport only ever sees
//! the request's head ([`RequestHead`]) and a single-shot response handle
//! ([`Responder`]); body bytes arrive as events on the transport itself.
//! Both halves of an exchange live together in one struct, so the
//! request and response are always set and cleared as a pair.

use bytes::Bytes;
use http::{header, HeaderMap, Method, Response};

/// The request half of an exchange: method and headers.
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: Method,
    headers: HeaderMap,
}

impl RequestHead {
    /// Build a head from a method and header map.
    #[must_use]
    pub const fn new(method: Method, headers: HeaderMap) -> Self {
        Self { method, headers }
    }

    /// The request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// The request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the declared content type marks the body as binary.
    #[must_use]
    pub fn is_binary_content(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == "application/octet-stream")
    }

    /// Whether the user agent is the legacy IE family that needs
    /// `X-XSS-Protection: 0` on the data acknowledgement to suppress a
    /// false-positive reflected-XSS warning.
    #[must_use]
    pub fn is_legacy_ie(&self) -> bool {
        self.headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ua| ua.contains(";MSIE") || ua.contains("Trident/"))
    }
}

/// Single-shot response handle for one exchange.
///
/// Both methods consume the responder, so an exchange can be answered at
/// most once by construction.
pub trait Responder {
    /// Write status, headers and body, then end the exchange.
    fn respond(self, response: Response<Bytes>);

    /// Forcibly terminate the underlying connection without writing an
    /// HTTP response. Used when further protocol conversation is unsafe
    /// (inbound buffer overflow) or pointless (aborting an in-flight data
    /// request during close).
    fn destroy(self);
}

/// Opaque identity of one attached exchange.
///
/// The poll GET and data POST legitimately arrive on independent TCP
/// connections, so close and body events carry the token of the exchange
/// they belong to; events from an exchange the transport has already
/// replaced are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeToken(u64);

impl ExchangeToken {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }
}

/// Outcome of handing a request to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Attached as the poll exchange.
    Poll(ExchangeToken),
    /// Attached as the data exchange; body events should follow.
    Data(ExchangeToken),
    /// Answered immediately (overlap or unsupported method); no further
    /// events are expected.
    Rejected,
}

/// The long-held GET exchange delivering outbound data.
#[derive(Debug)]
pub(crate) struct PollExchange<R> {
    token: ExchangeToken,
    responder: R,
}

impl<R: Responder> PollExchange<R> {
    pub(crate) const fn new(token: ExchangeToken, responder: R) -> Self {
        Self { token, responder }
    }

    pub(crate) const fn token(&self) -> ExchangeToken {
        self.token
    }

    pub(crate) fn into_responder(self) -> R {
        self.responder
    }
}

/// A transient POST exchange delivering inbound data.
#[derive(Debug)]
pub(crate) struct DataExchange<R> {
    token: ExchangeToken,
    head: RequestHead,
    responder: R,
    binary: bool,
}

impl<R: Responder> DataExchange<R> {
    pub(crate) fn new(token: ExchangeToken, head: RequestHead, responder: R) -> Self {
        let binary = head.is_binary_content();
        Self {
            token,
            head,
            responder,
            binary,
        }
    }

    pub(crate) const fn token(&self) -> ExchangeToken {
        self.token
    }

    pub(crate) const fn head(&self) -> &RequestHead {
        &self.head
    }

    pub(crate) const fn binary(&self) -> bool {
        self.binary
    }

    pub(crate) fn into_responder(self) -> R {
        self.responder
    }
}
