//! Listener and stream types wrapping [tokio::net], uniform under [crate::io::AsyncIo].

mod tcp;
mod udp;

pub use tcp::{TcpListener, TcpStream};
pub use udp::UdpSocket;

use std::{io, net::SocketAddr};

macro_rules! default_aio_impl {
    ($ty: ty) => {
        impl crate::io::AsyncIo for $ty {
            fn ready(
                &self,
                interest: crate::io::Interest,
            ) -> impl ::core::future::Future<Output = ::std::io::Result<crate::io::Ready>> + Send + '_ {
                self.0.ready(interest)
            }

            fn poll_ready(
                &self,
                interest: crate::io::Interest,
                cx: &mut ::core::task::Context<'_>,
            ) -> ::core::task::Poll<::std::io::Result<crate::io::Ready>> {
                match interest {
                    crate::io::Interest::READABLE => self.0.poll_read_ready(cx).map_ok(|_| crate::io::Ready::READABLE),
                    crate::io::Interest::WRITABLE => self.0.poll_write_ready(cx).map_ok(|_| crate::io::Ready::WRITABLE),
                    _ => unimplemented!("tokio does not support poll_ready for BOTH read and write ready"),
                }
            }

            fn is_vectored_write(&self) -> bool {
                crate::io::AsyncWrite::is_write_vectored(&self.0)
            }

            fn poll_shutdown(
                self: ::core::pin::Pin<&mut Self>,
                cx: &mut ::core::task::Context<'_>,
            ) -> ::core::task::Poll<::std::io::Result<()>> {
                crate::io::AsyncWrite::poll_shutdown(::core::pin::Pin::new(&mut self.get_mut().0), cx)
            }
        }
    };
}

use default_aio_impl;

/// Listener side of either a stream (TCP) or datagram (UDP, for DTLS) transport.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

impl Listener {
    /// Accept the next inbound peer.
    ///
    /// For TCP this is a real `accept()`. UDP has no connection concept at the socket level, so
    /// "accepting" a UDP listener hands back a clone of the same bound socket; callers (the DTLS
    /// engine) distinguish peers by the `SocketAddr` each datagram carries.
    pub async fn accept(&self) -> io::Result<Stream> {
        match self {
            Self::Tcp(tcp) => {
                let (stream, addr) = tcp.accept().await?;

                // round-trip through std to deregister from the listener thread's poll and
                // re-register on whichever worker thread ends up owning this connection.
                let stream = stream.into_std()?;
                let stream = TcpStream::from_std(stream)?;
                Ok(Stream::Tcp(stream, addr))
            }
            Self::Udp(udp) => Ok(Stream::Udp(udp.try_clone()?, udp.local_addr()?)),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Tcp(tcp) => tcp.local_addr(),
            Self::Udp(udp) => udp.local_addr(),
        }
    }
}

/// The accepted peer side of either transport.
pub enum Stream {
    Tcp(TcpStream, SocketAddr),
    Udp(UdpSocket, SocketAddr),
}

impl Stream {
    pub fn peer_addr(&self) -> SocketAddr {
        match self {
            Self::Tcp(_, addr) | Self::Udp(_, addr) => *addr,
        }
    }
}

impl From<Stream> for TcpStream {
    fn from(stream: Stream) -> Self {
        match stream {
            Stream::Tcp(tcp, _) => tcp,
            Stream::Udp(..) => unreachable!("cannot cast a udp stream to TcpStream"),
        }
    }
}

impl io::Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s, _) => io::Read::read(s, buf),
            Self::Udp(s, _) => io::Read::read(s, buf),
        }
    }
}

impl io::Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s, _) => io::Write::write(s, buf),
            Self::Udp(s, _) => io::Write::write(s, buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s, _) => io::Write::flush(s),
            Self::Udp(s, _) => io::Write::flush(s),
        }
    }
}

impl crate::io::AsyncIo for Stream {
    fn ready(
        &self,
        interest: crate::io::Interest,
    ) -> impl ::core::future::Future<Output = io::Result<crate::io::Ready>> + Send + '_ {
        async move {
            match self {
                Self::Tcp(s, _) => crate::io::AsyncIo::ready(s, interest).await,
                Self::Udp(s, _) => crate::io::AsyncIo::ready(s, interest).await,
            }
        }
    }

    fn poll_ready(
        &self,
        interest: crate::io::Interest,
        cx: &mut ::core::task::Context<'_>,
    ) -> ::core::task::Poll<io::Result<crate::io::Ready>> {
        match self {
            Self::Tcp(s, _) => crate::io::AsyncIo::poll_ready(s, interest, cx),
            Self::Udp(s, _) => crate::io::AsyncIo::poll_ready(s, interest, cx),
        }
    }

    fn is_vectored_write(&self) -> bool {
        match self {
            Self::Tcp(s, _) => crate::io::AsyncIo::is_vectored_write(s),
            Self::Udp(s, _) => crate::io::AsyncIo::is_vectored_write(s),
        }
    }

    fn poll_shutdown(
        self: ::core::pin::Pin<&mut Self>,
        cx: &mut ::core::task::Context<'_>,
    ) -> ::core::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s, _) => crate::io::AsyncIo::poll_shutdown(::core::pin::Pin::new(s), cx),
            Self::Udp(s, _) => crate::io::AsyncIo::poll_shutdown(::core::pin::Pin::new(s), cx),
        }
    }
}
