//! Time source abstraction, so limiter tests can advance a fake clock instead of sleeping.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// A monotonic time source used by the rate limiters.
///
/// Production code runs against [`SystemClock`]; tests run against [`FakeClock`] so that
/// window-expiry and backoff-lockout behavior can be asserted without sleeping.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to. All clones share the same underlying time.
#[derive(Clone, Debug)]
pub struct FakeClock {
    epoch: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl FakeClock {
    pub fn advance(&self, by: Duration) {
        let by = by.as_nanos() as u64;
        self.offset_nanos.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fake_clock_advances_monotonically() {
        let clock = FakeClock::default();
        let t0 = clock.now();
        clock.advance(Duration::from_millis(10));
        assert!(clock.now() > t0);
        assert_eq!(clock.now() - t0, Duration::from_millis(10));
    }

    #[test]
    fn clones_share_time() {
        let clock = FakeClock::default();
        let clone = clock.clone();
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), clone.now());
    }
}
