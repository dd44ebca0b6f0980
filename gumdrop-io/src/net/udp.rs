use std::{io, net::SocketAddr, sync::Arc};

/// A UDP socket wrapped for DTLS use.
///
/// DTLS has no connection-oriented transport underneath it, so `gumdrop-tls`'s DTLS engine reads
/// and writes whole datagrams through the [io::Read]/[io::Write] impls below rather than a byte
/// stream; each `read`/`write` call is exactly one `recv`/`send`.
pub struct UdpSocket(pub(crate) Arc<tokio::net::UdpSocket>);

impl UdpSocket {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        tokio::net::UdpSocket::bind(addr).await.map(Arc::new).map(Self)
    }

    pub fn from_std(socket: std::net::UdpSocket) -> io::Result<Self> {
        tokio::net::UdpSocket::from_std(socket).map(Arc::new).map(Self)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self(self.0.clone()))
    }

    pub async fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        self.0.connect(addr).await
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf).await
    }

    pub async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.0.send_to(buf, addr).await
    }
}

impl std::fmt::Debug for UdpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UdpSocket").field(&self.0).finish()
    }
}

impl io::Read for UdpSocket {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_recv(buf)
    }
}

impl io::Write for UdpSocket {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_send(buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl crate::io::AsyncIo for UdpSocket {
    fn ready(
        &self,
        interest: crate::io::Interest,
    ) -> impl std::future::Future<Output = io::Result<crate::io::Ready>> + Send + '_ {
        self.0.ready(interest)
    }

    fn poll_ready(
        &self,
        interest: crate::io::Interest,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<crate::io::Ready>> {
        match interest {
            crate::io::Interest::READABLE => self.0.poll_recv_ready(cx).map_ok(|_| crate::io::Ready::READABLE),
            crate::io::Interest::WRITABLE => self.0.poll_send_ready(cx).map_ok(|_| crate::io::Ready::WRITABLE),
            _ => unimplemented!("tokio does not support poll_ready for BOTH read and write ready"),
        }
    }

    fn is_vectored_write(&self) -> bool {
        false
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}
