use std::{future::Future, io, net, pin::Pin, sync::Arc, time::Duration};

#[cfg(not(target_family = "wasm"))]
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use gumdrop_rate::ConnectionLimiter;

use crate::{
    handler::Handler,
    net::IntoListener,
    server::{Server, ServerFuture},
};

/// Per-listener configuration collected by [`Builder::listen`]/[`Builder::bind`].
pub(crate) struct ListenerSpec {
    pub(crate) name: String,
    pub(crate) listener: Box<dyn IntoListener>,
    pub(crate) handler_factory: Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>,
    pub(crate) limiter: Option<Arc<ConnectionLimiter>>,
    pub(crate) tls_config: Option<Arc<gumdrop_tls::rustls::ServerConfig>>,
    pub(crate) idle_timeout: Duration,
}

pub struct Builder {
    pub(crate) server_threads: usize,
    pub(crate) worker_threads: usize,
    pub(crate) worker_max_blocking_threads: usize,
    pub(crate) listeners: Vec<ListenerSpec>,
    pub(crate) enable_signal: bool,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) on_worker_start: Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>,
    backlog: u32,
    limiter_config: Option<(usize, usize, Duration)>,
    tls_config: Option<Arc<gumdrop_tls::rustls::ServerConfig>>,
    idle_timeout: Duration,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            server_threads: 1,
            worker_threads: std::thread::available_parallelism().map(|size| size.get()).unwrap_or(1),
            worker_max_blocking_threads: 512,
            listeners: Vec::new(),
            enable_signal: true,
            shutdown_timeout: Duration::from_secs(30),
            on_worker_start: Box::new(|| Box::pin(async {})),
            backlog: 2048,
            limiter_config: None,
            tls_config: None,
            idle_timeout: Duration::from_secs(75),
        }
    }

    /// Number of OS threads dedicated to registering listeners with the async runtime.
    ///
    /// # Panics
    /// Panics if `num` is 0.
    pub fn server_threads(mut self, num: usize) -> Self {
        assert_ne!(num, 0, "there must be at least one server thread");
        self.server_threads = num;
        self
    }

    /// Number of reactor worker threads to start, each running its own single-threaded
    /// executor and accepting connections from every configured listener.
    ///
    /// Defaults to the number of available logical CPUs.
    ///
    /// # Panics
    /// Panics if `num` is 0.
    pub fn worker_threads(mut self, num: usize) -> Self {
        assert_ne!(num, 0, "there must be at least one worker thread");
        self.worker_threads = num;
        self
    }

    /// Max number of blocking-task threads per worker's executor, used for delegated TLS work.
    ///
    /// # Panics
    /// Panics if `num` is 0.
    pub fn worker_max_blocking_threads(mut self, num: usize) -> Self {
        assert_ne!(num, 0, "blocking threads must be higher than 0");
        self.worker_max_blocking_threads = num;
        self
    }

    /// Disable OS signal handling. The server can then only be stopped through
    /// [`ServerHandle`](crate::ServerHandle).
    pub fn disable_signal(mut self) -> Self {
        self.enable_signal = false;
        self
    }

    /// Time budget for graceful shutdown: after a graceful stop is requested, workers wait this
    /// long for in-flight connections to finish on their own before force-closing them.
    ///
    /// Defaults to 30 seconds.
    pub fn shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout = Duration::from_secs(secs);
        self
    }

    /// TCP listen backlog for listeners created with [`Builder::bind`].
    pub fn backlog(mut self, num: u32) -> Self {
        self.backlog = num;
        self
    }

    /// Idle timeout applied to every connection registered after this call: if neither side
    /// sends data within this window the connection is abortively closed.
    ///
    /// Defaults to 75 seconds.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Per-IP concurrent-connection cap and connection-rate window applied to every listener
    /// registered after this call. `max_concurrent_per_ip == 0` disables the concurrent cap.
    pub fn connection_limit(mut self, max_concurrent_per_ip: usize, max_events_per_window: usize, window: Duration) -> Self {
        self.limiter_config = Some((max_concurrent_per_ip, max_events_per_window, window));
        self
    }

    /// TLS server configuration applied to every listener registered after this call.
    pub fn tls_config(mut self, config: Arc<gumdrop_tls::rustls::ServerConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    #[doc(hidden)]
    /// Async callback invoked once on every worker thread right after it starts.
    pub fn on_worker_start<F, Fut>(mut self, on_start: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
    {
        self.on_worker_start = Box::new(move || {
            let fut = on_start();
            Box::pin(async {
                fut.await;
            })
        });
        self
    }

    /// Register a handler factory for a pre-bound TCP listener.
    ///
    /// `factory` is called once per accepted connection, on whichever worker thread accepted
    /// it, to build that connection's [`Handler`].
    pub fn listen<N, F, H>(self, name: N, listener: net::TcpListener, factory: F) -> io::Result<Self>
    where
        N: AsRef<str>,
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler,
    {
        self.push(name, Box::new(listener), factory)
    }

    fn push<N, F, H>(mut self, name: N, listener: Box<dyn IntoListener>, factory: F) -> io::Result<Self>
    where
        N: AsRef<str>,
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler,
    {
        let name = name.as_ref().to_string();

        let limiter = self
            .limiter_config
            .map(|(max_concurrent, max_events, window)| Arc::new(ConnectionLimiter::new(max_concurrent, max_events, window)));

        self.listeners.push(ListenerSpec {
            name,
            listener,
            handler_factory: Arc::new(move || Box::new(factory()) as Box<dyn Handler>),
            limiter,
            tls_config: self.tls_config.clone(),
            idle_timeout: self.idle_timeout,
        });

        Ok(self)
    }

    pub fn build(self) -> ServerFuture {
        let enable_signal = self.enable_signal;
        match Server::new(self) {
            Ok(server) => ServerFuture::Init { server, enable_signal },
            Err(e) => ServerFuture::Error(e),
        }
    }
}

#[cfg(not(target_family = "wasm"))]
impl Builder {
    /// Bind a fresh TCP socket and register it with a handler factory.
    pub fn bind<N, A, F, H>(self, name: N, addr: A, factory: F) -> io::Result<Self>
    where
        N: AsRef<str>,
        A: net::ToSocketAddrs,
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler,
    {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "could not parse socket address"))?;

        let socket = if addr.is_ipv4() {
            Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?
        } else {
            Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?
        };
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(self.backlog as _)?;

        self.listen(name, socket.into(), factory)
    }

    /// Bind a UDP socket for DTLS listeners and register it with a handler factory.
    pub fn bind_udp<N, A, F, H>(self, name: N, addr: A, factory: F) -> io::Result<Self>
    where
        N: AsRef<str>,
        A: net::ToSocketAddrs,
        F: Fn() -> H + Send + Sync + 'static,
        H: Handler,
    {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "could not parse socket address"))?;

        let socket = net::UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        self.push(name, Box::new(socket), factory)
    }
}
