//! The per-connection pipeline: buffers, back-pressure, and the read/write loop that drives a
//! [`Handler`] from an [`AsyncIo`] transport.
//!
//! Every `Connection` is bound to exactly one worker loop for its lifetime (it is spawned with
//! [`tokio::task::spawn_local`] by [`crate::worker`]), so its buffers need no synchronisation:
//! the task itself is the "owning SelectorLoop thread".

use std::{io, net::SocketAddr, time::Duration};

use gumdrop_io::{
    bytes::{Buf, BytesMut},
    io::{AsyncIo, Interest},
};
use tracing::{debug, trace, warn};

use crate::handler::{CloseReason, Handler, SendResult, Sender};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    TlsHandshake,
    Open,
    Closing,
    Closed,
}

/// Outbound queue watermark past which [`Sender::send`] starts reporting back-pressure.
const DEFAULT_WRITE_HIGH_WATERMARK: usize = 256 * 1024;
const READ_CHUNK: usize = 64 * 1024;

struct ConnectionHandle {
    state: ConnectionState,
    outbound: BytesMut,
    high_watermark: usize,
    write_blocked: bool,
    close_requested: bool,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl Sender for ConnectionHandle {
    fn send(&mut self, bytes: &[u8]) -> SendResult {
        self.outbound.extend_from_slice(bytes);
        if self.outbound.len() >= self.high_watermark {
            SendResult::BackPressure
        } else {
            SendResult::Ok
        }
    }

    fn close(&mut self) {
        self.close_requested = true;
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Drive `handler` over `io` until the connection closes, either because the peer went away,
/// the handler requested a close, or `idle_timeout` elapsed with no activity.
pub async fn drive<Io, H>(
    mut io: Io,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    mut handler: H,
    idle_timeout: Duration,
) where
    Io: AsyncIo,
    H: Handler,
{
    let mut handle = ConnectionHandle {
        state: ConnectionState::Open,
        outbound: BytesMut::new(),
        high_watermark: DEFAULT_WRITE_HIGH_WATERMARK,
        write_blocked: false,
        close_requested: false,
        peer_addr,
        local_addr,
    };

    handler.on_open(&mut handle);

    let mut inbound = [0u8; READ_CHUNK];
    let reason = loop {
        if handle.close_requested && handle.outbound.is_empty() {
            break CloseReason::Graceful;
        }

        let interest = if handle.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };

        let ready = match tokio::time::timeout(idle_timeout, io.ready(interest)).await {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => break CloseReason::Io(e),
            Err(_elapsed) => break CloseReason::IdleTimeout,
        };

        if ready.is_writable() && !handle.outbound.is_empty() {
            match io::Write::write(&mut io, &handle.outbound) {
                Ok(0) => break CloseReason::Io(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    handle.outbound.advance(n);
                    if handle.write_blocked && handle.outbound.len() < handle.high_watermark {
                        handle.write_blocked = false;
                        handler.on_writable(&mut handle);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    handler.on_error(&mut handle, &e);
                    break CloseReason::Io(e);
                }
            }
        }

        if ready.is_readable() {
            match io::Read::read(&mut io, &mut inbound) {
                Ok(0) => {
                    trace!(%peer_addr, "peer closed connection");
                    break CloseReason::Graceful;
                }
                Ok(n) => handler.on_data(&mut handle, &inbound[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    handler.on_error(&mut handle, &e);
                    break CloseReason::Io(e);
                }
            }
        }
    };

    handle.state = ConnectionState::Closing;
    // best-effort final flush for a graceful close; an abortive close (timeout, error) skips it.
    if matches!(reason, CloseReason::Graceful) {
        while !handle.outbound.is_empty() {
            match io::Write::write(&mut io, &handle.outbound) {
                Ok(0) | Err(_) => break,
                Ok(n) => handle.outbound.advance(n),
            }
        }
    }

    use std::pin::Pin;
    if let Err(e) = std::future::poll_fn(|cx| Pin::new(&mut io).poll_shutdown(cx)).await {
        debug!(%peer_addr, error = %e, "error shutting down connection transport");
    }

    handle.state = ConnectionState::Closed;
    if matches!(reason, CloseReason::IdleTimeout) {
        warn!(%peer_addr, "connection abortively closed after idle timeout");
    }
    handler.on_close(reason);
}
