mod future;
mod handle;

pub use self::future::{ServerFuture, ServerFutureInner};
pub use self::handle::ServerHandle;

use std::{
    io, mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    oneshot, watch,
};
use tracing::{error, info};

use crate::{
    builder::{Builder, ListenerSpec},
    handler::Handler,
    net::IntoListener,
    worker::{self, ListenerTask},
};

pub struct Server {
    is_graceful_shutdown: Arc<AtomicBool>,
    tx_cmd: UnboundedSender<Command>,
    rx_cmd: UnboundedReceiver<Command>,
    rt: Option<tokio::runtime::Runtime>,
    server_join_handle: Option<thread::JoinHandle<()>>,
    stop_accept: Option<oneshot::Sender<()>>,
    stop_workers: watch::Sender<bool>,
    worker_join_handles: Vec<thread::JoinHandle<()>>,
}

/// Everything but the raw listener from a [`ListenerSpec`], kept around in `Server::new` so it
/// can be paired back up with the async listener handle once the accept thread has registered
/// it with the runtime.
#[derive(Clone)]
struct ListenerMeta {
    name: String,
    handler_factory: Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>,
    limiter: Option<Arc<gumdrop_rate::ConnectionLimiter>>,
    tls_config: Option<Arc<gumdrop_tls::rustls::ServerConfig>>,
    idle_timeout: Duration,
}

impl Server {
    pub fn new(builder: Builder) -> io::Result<Self> {
        let Builder {
            server_threads,
            worker_threads,
            worker_max_blocking_threads,
            listeners,
            shutdown_timeout,
            on_worker_start,
            ..
        } = builder;

        let (boxed_listeners, metas): (Vec<_>, Vec<_>) = listeners
            .into_iter()
            .map(|spec| {
                let ListenerSpec {
                    name,
                    listener,
                    handler_factory,
                    limiter,
                    tls_config,
                    idle_timeout,
                } = spec;
                (
                    listener,
                    ListenerMeta {
                        name,
                        handler_factory,
                        limiter,
                        tls_config,
                        idle_timeout,
                    },
                )
            })
            .unzip();

        let (tx, rx) = std::sync::mpsc::sync_channel(1);

        let server_handle = thread::spawn(move || {
            let res = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                // these threads only ever register listeners with the runtime's reactor; no
                // application task ever runs on them.
                .worker_threads(server_threads)
                .build()
                .and_then(|rt| {
                    let res: io::Result<Vec<Arc<gumdrop_io::net::Listener>>> = rt.block_on(async {
                        boxed_listeners
                            .into_iter()
                            .map(|listener| listener.into_listener().map(Arc::new))
                            .collect()
                    });
                    res.map(|listeners| (listeners, rt))
                });

            let (tx2, rx2) = oneshot::channel();

            match res {
                Ok((listeners, rt)) => {
                    tx.send((tx2, Ok(listeners))).unwrap();
                    rt.block_on(async {
                        if rx2.await.is_err() {
                            error!("accept thread force stopped; ServerFuture dropped unexpectedly");
                        } else {
                            info!("accept thread stopped gracefully");
                        }
                    });
                }
                Err(e) => {
                    tx.send((tx2, Err(e))).unwrap();
                }
            }
        });

        let (stop_accept, listeners) = rx.recv().unwrap();
        let listeners = listeners?;

        let tasks: Vec<(String, Arc<gumdrop_io::net::Listener>, ListenerMeta)> = listeners
            .into_iter()
            .zip(metas)
            .map(|(listener, meta)| (meta.name.clone(), listener, meta))
            .collect();

        let is_graceful_shutdown = Arc::new(AtomicBool::new(false));
        let (stop_workers, stop_rx) = watch::channel(false);

        let worker_handles = (0..worker_threads)
            .map(|idx| {
                let tasks = tasks
                    .iter()
                    .map(|(name, listener, meta)| ListenerTask {
                        name: name.clone(),
                        listener: listener.clone(),
                        handler_factory: meta.handler_factory.clone(),
                        limiter: meta.limiter.clone(),
                        tls_config: meta.tls_config.clone(),
                        idle_timeout: meta.idle_timeout,
                    })
                    .collect::<Vec<_>>();

                let is_graceful_shutdown = is_graceful_shutdown.clone();
                let stop_rx = stop_rx.clone();
                let on_start_fut = on_worker_start();

                thread::Builder::new()
                    .name(format!("gumdrop-server-worker-{idx}"))
                    .spawn(move || {
                        let fut = async move {
                            on_start_fut.await;
                            worker::run(tasks, shutdown_timeout, is_graceful_shutdown, stop_rx).await;
                        };

                        tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .max_blocking_threads(worker_max_blocking_threads)
                            .build()
                            .unwrap()
                            .block_on(tokio::task::LocalSet::new().run_until(fut))
                    })
            })
            .collect::<io::Result<Vec<_>>>()?;

        let (tx_cmd, rx_cmd) = unbounded_channel();

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        Ok(Self {
            is_graceful_shutdown,
            tx_cmd,
            rx_cmd,
            rt: Some(rt),
            server_join_handle: Some(server_handle),
            stop_accept: Some(stop_accept),
            stop_workers,
            worker_join_handles: worker_handles,
        })
    }

    pub(crate) fn stop(&mut self, graceful: bool) {
        self.is_graceful_shutdown.store(graceful, Ordering::SeqCst);

        let _ = self.stop_workers.send(true);

        self.stop_accept
            .take()
            .unwrap()
            .send(())
            .expect("accept thread exited unexpectedly");

        self.server_join_handle.take().unwrap().join().unwrap();

        mem::take(&mut self.worker_join_handles).into_iter().for_each(|handle| {
            handle.join().unwrap();
        });
    }
}

pub(crate) enum Command {
    GracefulStop,
    ForceStop,
}
