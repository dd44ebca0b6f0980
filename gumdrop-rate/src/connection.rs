//! Per-IP concurrent-connection and connection-rate limiting.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        RwLock,
    },
    time::{Duration, Instant},
};

use crate::{
    error::TooManyConnections,
    timer::{Clock, SystemClock},
    window::SlidingWindow,
};

struct Entry {
    active: AtomicUsize,
    window: std::sync::Mutex<SlidingWindow>,
}

/// Per-IP concurrent-connection cap plus a sliding-window connection-rate cap.
///
/// Entries live behind a sharded lock scheme: a read lock services the common case (an IP
/// that already has an entry), a write lock is only taken to insert or remove a key, matching
/// the "multi-reader, multi-writer with per-entry locks" requirement from the gumdrop core
/// concurrency model.
pub struct ConnectionLimiter<C: Clock = SystemClock> {
    max_concurrent_per_ip: usize,
    max_events: usize,
    window: Duration,
    entries: RwLock<HashMap<IpAddr, Entry>>,
    clock: C,
}

impl ConnectionLimiter<SystemClock> {
    /// `max_concurrent_per_ip == 0` disables the concurrent-connection cap.
    pub fn new(max_concurrent_per_ip: usize, max_events: usize, window: Duration) -> Self {
        Self::with_clock(max_concurrent_per_ip, max_events, window, SystemClock)
    }
}

impl<C: Clock> ConnectionLimiter<C> {
    pub fn with_clock(max_concurrent_per_ip: usize, max_events: usize, window: Duration, clock: C) -> Self {
        Self {
            max_concurrent_per_ip,
            max_events,
            window,
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Admit a new connection from `ip`, incrementing its active count and recording an event
    /// in the sliding window. Fails without mutating state if either cap is already exhausted.
    pub fn connection_opened(&self, ip: IpAddr) -> Result<(), TooManyConnections> {
        let now = self.clock.now();

        // fast path: entry already exists, only a read lock is needed.
        if let Some(entry) = self.entries.read().unwrap().get(&ip) {
            return Self::try_admit(entry, self.max_concurrent_per_ip, now);
        }

        // slow path: no entry yet, take the write lock to insert one.
        let mut guard = self.entries.write().unwrap();
        let entry = guard.entry(ip).or_insert_with(|| Entry {
            active: AtomicUsize::new(0),
            window: std::sync::Mutex::new(SlidingWindow::new(self.max_events, self.window)),
        });
        Self::try_admit(entry, self.max_concurrent_per_ip, now)
    }

    fn try_admit(entry: &Entry, max_concurrent_per_ip: usize, now: Instant) -> Result<(), TooManyConnections> {
        if max_concurrent_per_ip != 0 && entry.active.load(Ordering::Acquire) >= max_concurrent_per_ip {
            return Err(TooManyConnections::ConcurrentLimit);
        }
        let mut window = entry.window.lock().unwrap();
        if !window.try_acquire(now) {
            return Err(TooManyConnections::RateLimit);
        }
        drop(window);
        entry.active.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Release a previously admitted connection. Removes the IP's entry entirely once its
    /// active count reaches zero, bounding memory use for long-running listeners.
    pub fn connection_closed(&self, ip: IpAddr) {
        let remove = {
            let guard = self.entries.read().unwrap();
            match guard.get(&ip) {
                Some(entry) => entry.active.fetch_sub(1, Ordering::AcqRel) == 1,
                None => {
                    tracing::warn!(%ip, "connection_closed called for an IP with no tracked entry");
                    false
                }
            }
        };
        if remove {
            let mut guard = self.entries.write().unwrap();
            if let Some(entry) = guard.get(&ip) {
                if entry.active.load(Ordering::Acquire) == 0 {
                    guard.remove(&ip);
                }
            }
        }
    }

    /// Drop entries whose sliding window is empty and which have no active connections.
    /// Intended to run on a periodic timer owned by the selector loop.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let mut guard = self.entries.write().unwrap();
        guard.retain(|_, entry| {
            entry.active.load(Ordering::Acquire) > 0 || !entry.window.lock().unwrap().is_empty(now)
        });
    }

    pub fn tracked_ips(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timer::FakeClock;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, n))
    }

    #[test]
    fn concurrent_cap_enforced() {
        let lim = ConnectionLimiter::new(2, 100, Duration::from_secs(60));
        assert!(lim.connection_opened(ip(1)).is_ok());
        assert!(lim.connection_opened(ip(1)).is_ok());
        assert!(matches!(
            lim.connection_opened(ip(1)),
            Err(TooManyConnections::ConcurrentLimit)
        ));
        lim.connection_closed(ip(1));
        assert!(lim.connection_opened(ip(1)).is_ok());
    }

    #[test]
    fn zero_disables_concurrent_cap() {
        let lim = ConnectionLimiter::new(0, 1000, Duration::from_secs(60));
        for _ in 0..50 {
            assert!(lim.connection_opened(ip(2)).is_ok());
        }
    }

    #[test]
    fn sweep_drops_idle_entries() {
        let clock = FakeClock::default();
        let lim = ConnectionLimiter::with_clock(1, 1, Duration::from_millis(10), clock.clone());
        lim.connection_opened(ip(3)).unwrap();
        lim.connection_closed(ip(3));
        assert_eq!(lim.tracked_ips(), 1);
        clock.advance(Duration::from_millis(20));
        lim.sweep();
        assert_eq!(lim.tracked_ips(), 0);
    }

    #[test]
    fn independent_ips_do_not_interfere() {
        let lim = ConnectionLimiter::new(1, 10, Duration::from_secs(60));
        assert!(lim.connection_opened(ip(1)).is_ok());
        assert!(lim.connection_opened(ip(2)).is_ok());
        assert!(matches!(
            lim.connection_opened(ip(1)),
            Err(TooManyConnections::ConcurrentLimit)
        ));
    }
}
