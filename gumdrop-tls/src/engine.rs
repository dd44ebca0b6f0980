//! Buffer-oriented TLS/DTLS facade.
//!
//! [`crate::rustls::TlsStream`] and [`crate::openssl::TlsStream`] drive a live [`AsyncIo`]
//! transport directly, which is the right shape for TCP. DTLS has no such transport: the UDP
//! socket underneath it is datagram-oriented, so the engine instead takes ciphertext datagrams
//! in and hands cleartext back through plain buffers, leaving the caller (gumdrop-server's
//! connection pipeline) in charge of `recv_from`/`send_to`.
//!
//! [`AsyncIo`]: gumdrop_io::io::AsyncIo

use std::{
    io::{self, Read, Write},
    time::Duration,
};

use gumdrop_io::bytes::BytesMut;

use crate::delegate::DelegatedTask;

/// A TLS/DTLS engine driven entirely through buffers.
pub trait TlsEngine {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encrypt `plaintext`, appending the resulting record(s)/datagram(s) to `out`.
    fn wrap(&mut self, plaintext: &[u8], out: &mut BytesMut) -> Result<(), Self::Error>;

    /// Feed inbound ciphertext to the engine, appending any decrypted application data to
    /// `out`. Returns the number of plaintext bytes appended.
    fn unwrap(&mut self, ciphertext: &[u8], out: &mut BytesMut) -> Result<usize, Self::Error>;

    fn is_handshaking(&self) -> bool;

    /// The next background task the engine wants run on the worker pool, if any.
    fn delegated_task(&mut self) -> Option<DelegatedTask>;

    /// For DTLS: how long until a retransmission is due if no ACK has arrived. `None` for
    /// engines with no retransmission concept.
    fn next_timeout(&self) -> Option<Duration>;
}

/// An in-memory duplex buffer standing in for a live transport, so a stream-oriented crypto
/// backend (openssl's `SslStream`) can be driven one datagram at a time instead of owning a
/// socket.
#[cfg(feature = "openssl")]
#[derive(Default)]
struct MemoryIo {
    inbound: std::collections::VecDeque<u8>,
    outbound: Vec<u8>,
}

#[cfg(feature = "openssl")]
impl Read for MemoryIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inbound.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.inbound.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.inbound.pop_front().expect("checked non-empty above");
        }
        Ok(n)
    }
}

#[cfg(feature = "openssl")]
impl Write for MemoryIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// DTLS (or buffer-driven TLS) engine backed by the `openssl` crate.
#[cfg(feature = "openssl")]
pub struct OpensslEngine {
    stream: openssl::ssl::SslStream<MemoryIo>,
    handshake_done: bool,
}

#[cfg(feature = "openssl")]
impl OpensslEngine {
    pub fn new(ssl: openssl::ssl::Ssl) -> Result<Self, crate::openssl::Error> {
        let stream = openssl::ssl::SslStream::new(ssl, MemoryIo::default())?;
        Ok(Self {
            stream,
            handshake_done: false,
        })
    }

    fn drive_handshake(&mut self) -> Result<(), crate::openssl::Error> {
        if self.handshake_done {
            return Ok(());
        }
        match self.stream.ssl().is_server() {
            true => match self.stream.accept() {
                Ok(()) => self.handshake_done = true,
                Err(ref e) if matches!(e.code(), openssl::ssl::ErrorCode::WANT_READ | openssl::ssl::ErrorCode::WANT_WRITE) => {}
                Err(e) => return Err(crate::openssl::Error::Tls(e)),
            },
            false => match self.stream.connect() {
                Ok(()) => self.handshake_done = true,
                Err(ref e) if matches!(e.code(), openssl::ssl::ErrorCode::WANT_READ | openssl::ssl::ErrorCode::WANT_WRITE) => {}
                Err(e) => return Err(crate::openssl::Error::Tls(e)),
            },
        }
        Ok(())
    }
}

#[cfg(feature = "openssl")]
impl TlsEngine for OpensslEngine {
    type Error = crate::openssl::Error;

    fn wrap(&mut self, plaintext: &[u8], out: &mut BytesMut) -> Result<(), Self::Error> {
        self.drive_handshake()?;
        if self.handshake_done && !plaintext.is_empty() {
            match self.stream.write_all(plaintext) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(crate::openssl::Error::Io(e)),
            }
        }
        out.extend_from_slice(&self.stream.get_ref().outbound);
        self.stream.get_mut().outbound.clear();
        Ok(())
    }

    fn unwrap(&mut self, ciphertext: &[u8], out: &mut BytesMut) -> Result<usize, Self::Error> {
        self.stream.get_mut().inbound.extend(ciphertext.iter().copied());
        self.drive_handshake()?;

        if !self.handshake_done {
            return Ok(0);
        }

        let mut total = 0;
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    out.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(crate::openssl::Error::Io(e)),
            }
        }
        Ok(total)
    }

    fn is_handshaking(&self) -> bool {
        !self.handshake_done
    }

    fn delegated_task(&mut self) -> Option<DelegatedTask> {
        (!self.handshake_done).then_some(DelegatedTask::Handshake)
    }

    fn next_timeout(&self) -> Option<Duration> {
        self.stream.ssl().dtls_get_timeout()
    }
}
