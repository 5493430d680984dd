//! Hyper bridge: drive a [`PollingTransport`] from real HTTP connections.
//!
//! The transport itself is synchronous; this module owns the translation
//! between hyper's async request lifecycle and the transport's events:
//!
//! ```text
//! GET/POST arrival  ──► handle_request()
//! body frames       ──► on_data_chunk() / on_data_end()
//! dropped future    ──► on_poll_closed() / on_data_closed()
//! Responder         ◄── oneshot carrying a response or a destroy order
//! ```
//!
//! A [`PollingHandler`] is cheap to clone and is meant to be captured by
//! a `hyper::service::service_fn` closure. Responding with
//! [`ConnectionDestroyed`] as the service error makes hyper tear the
//! connection down without writing a response, which is how the
//! transport's `destroy` order reaches the wire.

use std::sync::Arc;

use async_lock::Mutex;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::Request;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::exchange::{Dispatch, ExchangeToken, RequestHead, Responder};
use crate::parser::Parser;
use crate::transport::{EventSink, PollingTransport};

/// The transport ordered the underlying connection destroyed. Returned
/// as the service error so hyper aborts the connection without a
/// response.
#[derive(Debug, Clone, Copy, Error)]
#[error("connection destroyed by polling transport")]
pub struct ConnectionDestroyed;

/// What the transport decided to do with an exchange.
#[derive(Debug)]
enum Reply {
    Respond(Response<Bytes>),
    Destroy,
}

/// Single-shot responder backed by a oneshot channel to the request
/// handler that owns the exchange.
#[derive(Debug)]
pub struct ChannelResponder {
    tx: oneshot::Sender<Reply>,
}

impl Responder for ChannelResponder {
    fn respond(self, response: Response<Bytes>) {
        // The receiver only disappears if the client is already gone.
        let _ = self.tx.send(Reply::Respond(response));
    }

    fn destroy(self) {
        let _ = self.tx.send(Reply::Destroy);
    }
}

type SharedTransport<P, S> = Arc<Mutex<PollingTransport<P, ChannelResponder, S>>>;

/// Cloneable per-connection handler wrapping one [`PollingTransport`].
///
/// All clones drive the same transport; hyper serializes nothing across
/// TCP connections, so every transport call goes through the mutex.
pub struct PollingHandler<P, S> {
    transport: SharedTransport<P, S>,
}

impl<P, S> Clone for PollingHandler<P, S> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
        }
    }
}

impl<P, S> PollingHandler<P, S>
where
    P: Parser + Send + 'static,
    S: EventSink + Send + 'static,
{
    /// Wrap a transport for serving.
    #[must_use]
    pub fn new(transport: PollingTransport<P, ChannelResponder, S>) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
        }
    }

    /// The shared transport, for the session layer to call
    /// [`send`](PollingTransport::send) and
    /// [`close`](PollingTransport::close) on.
    #[must_use]
    pub fn transport(&self) -> &SharedTransport<P, S> {
        &self.transport
    }

    /// Serve one HTTP request against the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDestroyed`] when the transport ordered the
    /// underlying connection terminated; propagating it out of the
    /// service aborts the hyper connection.
    pub async fn handle(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, ConnectionDestroyed> {
        let (parts, body) = req.into_parts();
        tracing::debug!(method = %parts.method, path = %parts.uri.path(), "polling request");

        let head = RequestHead::new(parts.method, parts.headers);
        let (tx, rx) = oneshot::channel();
        let dispatch = self
            .transport
            .lock()
            .await
            .handle_request(head, ChannelResponder { tx });

        match dispatch {
            Dispatch::Rejected => finish(rx.await),
            Dispatch::Poll(token) => self.drive_poll(token, rx).await,
            Dispatch::Data(token) => self.drive_data(token, body, rx).await,
        }
    }

    /// Hold the poll exchange open until the transport flushes it.
    async fn drive_poll(
        &self,
        token: ExchangeToken,
        rx: oneshot::Receiver<Reply>,
    ) -> Result<Response<Full<Bytes>>, ConnectionDestroyed> {
        let mut guard = CloseGuard::new(self.transport.clone(), ExchangeKind::Poll, token);
        let reply = rx.await;
        guard.disarm();
        finish(reply)
    }

    /// Pump the data exchange's body into the transport, then wait for
    /// the acknowledgement.
    async fn drive_data(
        &self,
        token: ExchangeToken,
        mut body: Incoming,
        mut rx: oneshot::Receiver<Reply>,
    ) -> Result<Response<Full<Bytes>>, ConnectionDestroyed> {
        let mut guard = CloseGuard::new(self.transport.clone(), ExchangeKind::Data, token);

        loop {
            tokio::select! {
                // The transport destroyed the exchange mid-body (overflow
                // or a close aborting the data request).
                reply = &mut rx => {
                    guard.disarm();
                    return finish(reply);
                }
                frame = body.frame() => match frame {
                    Some(Ok(frame)) => {
                        if let Some(chunk) = frame.data_ref() {
                            self.transport.lock().await.on_data_chunk(token, chunk);
                        }
                    }
                    Some(Err(error)) => {
                        tracing::debug!(%error, "data request body failed");
                        guard.disarm();
                        self.transport.lock().await.on_data_closed(token);
                        return Err(ConnectionDestroyed);
                    }
                    None => break,
                },
            }
        }

        self.transport.lock().await.on_data_end(token);
        let reply = rx.await;
        guard.disarm();
        finish(reply)
    }
}

fn finish(
    reply: Result<Reply, oneshot::error::RecvError>,
) -> Result<Response<Full<Bytes>>, ConnectionDestroyed> {
    match reply {
        Ok(Reply::Respond(response)) => Ok(response.map(Full::new)),
        Ok(Reply::Destroy) | Err(_) => Err(ConnectionDestroyed),
    }
}

#[derive(Debug, Clone, Copy)]
enum ExchangeKind {
    Poll,
    Data,
}

/// Reports a premature client disconnect to the transport if the request
/// future is dropped before the exchange was answered.
struct CloseGuard<P, S>
where
    P: Parser + Send + 'static,
    S: EventSink + Send + 'static,
{
    transport: SharedTransport<P, S>,
    kind: ExchangeKind,
    token: ExchangeToken,
    armed: bool,
}

impl<P, S> CloseGuard<P, S>
where
    P: Parser + Send + 'static,
    S: EventSink + Send + 'static,
{
    fn new(transport: SharedTransport<P, S>, kind: ExchangeKind, token: ExchangeToken) -> Self {
        Self {
            transport,
            kind,
            token,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<P, S> Drop for CloseGuard<P, S>
where
    P: Parser + Send + 'static,
    S: EventSink + Send + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let transport = self.transport.clone();
        let kind = self.kind;
        let token = self.token;

        // The transport ignores the event if this exchange was already
        // replaced by the time the task runs.
        tokio::spawn(async move {
            let mut transport = transport.lock().await;
            match kind {
                ExchangeKind::Poll => transport.on_poll_closed(token),
                ExchangeKind::Data => transport.on_data_closed(token),
            }
        });
    }
}
