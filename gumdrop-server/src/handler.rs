//! The protocol handler contract: what HTTP/2 and WebSocket (and anything else built on top of
//! gumdrop-server) see of a connection.

use std::{io, net::SocketAddr};

/// Why a connection ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The handler or peer closed the connection cleanly.
    Graceful,
    /// The connection was idle past its configured timeout.
    IdleTimeout,
    /// A protocol-level violation forced an abortive close.
    Protocol(&'static str),
    /// The underlying transport failed.
    Io(io::Error),
}

/// Result of [`Sender::send`]: whether the outbound queue accepted the bytes without crossing
/// its high watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Ok,
    /// The outbound queue is over its watermark; callers should pause submitting more data
    /// until [`Handler::on_writable`] fires.
    BackPressure,
}

/// The write half and addressing info a [`Handler`] is given on every callback.
pub trait Sender {
    /// Queue cleartext bytes for the connection to write. Queuing never blocks; once the
    /// outbound queue passes its watermark this returns [`SendResult::BackPressure`] and the
    /// caller should stop submitting more data until the next [`Handler::on_writable`].
    fn send(&mut self, bytes: &[u8]) -> SendResult;

    /// Request the connection close after any currently queued bytes have been written.
    fn close(&mut self);

    fn peer_addr(&self) -> SocketAddr;

    fn local_addr(&self) -> SocketAddr;
}

/// A pluggable per-connection protocol handler.
///
/// Exactly one handler instance owns a connection for its whole lifetime; callbacks are
/// strictly serialised by the reactor, so a handler never needs to synchronise against itself.
pub trait Handler: Send + 'static {
    fn on_open(&mut self, sender: &mut dyn Sender);

    /// `data` is a zero-copy slice into the connection's inbound buffer, valid only for the
    /// duration of this call.
    fn on_data(&mut self, sender: &mut dyn Sender, data: &[u8]);

    /// Back-pressure has eased; the handler may resume calling [`Sender::send`].
    fn on_writable(&mut self, sender: &mut dyn Sender);

    fn on_close(&mut self, reason: CloseReason);

    fn on_error(&mut self, sender: &mut dyn Sender, error: &io::Error);
}

impl Handler for Box<dyn Handler> {
    fn on_open(&mut self, sender: &mut dyn Sender) {
        (**self).on_open(sender)
    }

    fn on_data(&mut self, sender: &mut dyn Sender, data: &[u8]) {
        (**self).on_data(sender, data)
    }

    fn on_writable(&mut self, sender: &mut dyn Sender) {
        (**self).on_writable(sender)
    }

    fn on_close(&mut self, reason: CloseReason) {
        (**self).on_close(reason)
    }

    fn on_error(&mut self, sender: &mut dyn Sender, error: &io::Error) {
        (**self).on_error(sender, error)
    }
}
