use std::io;

use gumdrop_io::net::Listener;
use tracing::info;

/// Converts a bound standard-library socket into the listener type gumdrop-server's worker
/// loops accept from. The conversion is delayed until it runs on the thread that will own the
/// resulting listener, avoiding a runtime-locality panic from converting on the wrong thread.
pub trait IntoListener: Send {
    fn into_listener(self: Box<Self>) -> io::Result<Listener>;
}

impl IntoListener for std::net::TcpListener {
    fn into_listener(self: Box<Self>) -> io::Result<Listener> {
        self.set_nonblocking(true)?;
        let listener = gumdrop_io::net::TcpListener::from_std(*self)?;
        info!(addr = ?listener.local_addr().ok(), "started tcp listener");
        Ok(Listener::Tcp(listener))
    }
}

impl IntoListener for std::net::UdpSocket {
    fn into_listener(self: Box<Self>) -> io::Result<Listener> {
        self.set_nonblocking(true)?;
        let socket = gumdrop_io::net::UdpSocket::from_std(*self)?;
        info!(addr = ?socket.local_addr().ok(), "started udp listener");
        Ok(Listener::Udp(socket))
    }
}
