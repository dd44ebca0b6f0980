use std::time::{Duration, Instant};

use tracing::info;

use super::counter::Counter;

/// Drives graceful shutdown for a single worker loop: waits for outstanding connections to
/// finish on their own, polling the live count every half second, up to `shutdown_timeout`.
/// Connections still open when the deadline passes are dropped (and therefore abortively
/// closed) once the worker loop itself exits.
pub(super) struct ShutdownHandle<'a> {
    name: &'a str,
    shutdown_timeout: Duration,
    counter: Counter,
    graceful: bool,
}

impl<'a> ShutdownHandle<'a> {
    pub(super) fn new(name: &'a str, shutdown_timeout: Duration, counter: Counter, graceful: bool) -> Self {
        Self {
            name,
            shutdown_timeout,
            counter,
            graceful,
        }
    }

    pub(super) async fn shutdown(self) {
        if !self.graceful {
            return;
        }

        let start = Instant::now();
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        while start.elapsed() < self.shutdown_timeout {
            if self.counter.get() == 0 {
                return;
            }
            interval.tick().await;
        }
    }
}

impl Drop for ShutdownHandle<'_> {
    fn drop(&mut self) {
        let remaining = self.counter.get();
        if remaining == 0 {
            info!(worker = self.name, "graceful stopped");
        } else {
            info!(worker = self.name, remaining, "force stopped with connections still open (estimate)");
        }
    }
}
