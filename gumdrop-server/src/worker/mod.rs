pub(crate) mod counter;
mod shutdown;

use std::{
    io,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    thread,
    time::Duration,
};

use gumdrop_io::net::Listener;
use gumdrop_rate::{ConnectionLimiter, TooManyConnections};
use tokio::{sync::watch, time::sleep};
use tracing::{error, info, warn};

use self::{counter::Counter, shutdown::ShutdownHandle};
use crate::{connection, handler::Handler};

/// Everything one worker loop needs to accept and drive connections for a single listener.
pub(crate) struct ListenerTask {
    pub(crate) name: String,
    pub(crate) listener: Arc<Listener>,
    pub(crate) handler_factory: Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>,
    pub(crate) limiter: Option<Arc<ConnectionLimiter>>,
    pub(crate) tls_config: Option<Arc<gumdrop_tls::rustls::ServerConfig>>,
    pub(crate) idle_timeout: Duration,
}

/// Runs every [`ListenerTask`] assigned to this worker loop concurrently until a stop is
/// requested on `stop_rx` or every accept loop exits on its own (a fatal accept error), then
/// waits out any still-open connections per `shutdown_timeout`.
pub(crate) async fn run(
    tasks: Vec<ListenerTask>,
    shutdown_timeout: Duration,
    is_graceful_shutdown: Arc<AtomicBool>,
    stop_rx: watch::Receiver<bool>,
) {
    let counter = Counter::new();
    let name = worker_name();

    let handles = tasks
        .into_iter()
        .map(|task| {
            let counter = counter.clone();
            let stop_rx = stop_rx.clone();
            tokio::task::spawn_local(accept_loop(task, counter, stop_rx))
        })
        .collect::<Vec<_>>();

    info!(worker = %name, "started");

    for handle in handles {
        if let Err(e) = handle.await {
            error!(worker = %name, error = %e, "accept loop panicked");
        }
    }

    ShutdownHandle::new(&name, shutdown_timeout, counter, is_graceful_shutdown.load(Ordering::SeqCst))
        .shutdown()
        .await;
}

async fn accept_loop(task: ListenerTask, counter: Counter, mut stop_rx: watch::Receiver<bool>) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            res = task.listener.accept() => res,
        };

        match accepted {
            Ok(stream) => {
                let peer_addr = stream.peer_addr();

                if let Some(limiter) = &task.limiter {
                    if let Err(e) = limiter.connection_opened(peer_addr.ip()) {
                        log_rejected(&task.name, peer_addr, e);
                        continue;
                    }
                }

                let guard = counter.guard();
                let handler = (task.handler_factory)();
                let idle_timeout = task.idle_timeout;
                let limiter = task.limiter.clone();
                let local_addr = task.listener.local_addr().unwrap_or(peer_addr);
                let tls_config = task.tls_config.clone();

                tokio::task::spawn_local(async move {
                    let _guard = guard;
                    run_connection(stream, peer_addr, local_addr, handler, idle_timeout, tls_config).await;
                    if let Some(limiter) = limiter {
                        limiter.connection_closed(peer_addr.ip());
                    }
                });
            }
            Err(ref e) if connection_error(e) => continue,
            Err(ref e) if fatal_error(e) => {
                warn!(listener = %task.name, error = %e, "accept loop exiting on fatal error");
                return;
            }
            Err(e) => {
                error!(listener = %task.name, error = %e, "error accepting connection");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn run_connection(
    stream: gumdrop_io::net::Stream,
    peer_addr: std::net::SocketAddr,
    local_addr: std::net::SocketAddr,
    handler: Box<dyn Handler>,
    idle_timeout: Duration,
    tls_config: Option<Arc<gumdrop_tls::rustls::ServerConfig>>,
) {
    match tls_config {
        Some(config) => {
            let conn = match gumdrop_tls::rustls::ServerConnection::new(config) {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(%peer_addr, error = %e, "failed to build tls session");
                    return;
                }
            };
            match gumdrop_tls::rustls::TlsStream::handshake(stream, conn).await {
                Ok(tls_stream) => connection::drive(tls_stream, peer_addr, local_addr, handler, idle_timeout).await,
                Err(e) => warn!(%peer_addr, error = %e, "tls handshake failed"),
            }
        }
        None => connection::drive(stream, peer_addr, local_addr, handler, idle_timeout).await,
    }
}

fn log_rejected(listener: &str, peer_addr: std::net::SocketAddr, reason: TooManyConnections) {
    tracing::debug!(%listener, %peer_addr, %reason, "connection rejected by rate limiter");
}

fn worker_name() -> String {
    thread::current()
        .name()
        .map(ToString::to_string)
        .unwrap_or_else(|| String::from("gumdrop-server-worker"))
}

/// Per-connection errors: the next `accept()` call might still succeed immediately.
fn connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

/// Resource-exhaustion-style errors (too many open files) that would otherwise spin the accept
/// loop; back off instead of treating them as fatal.
fn fatal_error(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::BrokenPipe
}
