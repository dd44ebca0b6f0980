//! Sliding-window event counter.
//!
//! A ring of up to `N` timestamps. An acquire succeeds when fewer than `N` events fall inside
//! the trailing window of length `W`; the oldest timestamp is evicted first.

use std::time::{Duration, Instant};

/// Fixed-capacity sliding-window counter: at most `max_events` acquires are admitted in any
/// trailing window of `window` duration.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    timestamps: Vec<Instant>,
    head: usize,
    count: usize,
    max_events: usize,
    window: Duration,
}

impl SlidingWindow {
    pub fn new(max_events: usize, window: Duration) -> Self {
        assert!(max_events > 0, "max_events must be non-zero");
        Self {
            timestamps: vec![Instant::now(); max_events],
            head: 0,
            count: 0,
            max_events,
            window,
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while self.count > 0 {
            let oldest_idx = (self.head + self.max_events - self.count) % self.max_events;
            let oldest = self.timestamps[oldest_idx];
            if now.saturating_duration_since(oldest) >= self.window {
                self.count -= 1;
            } else {
                break;
            }
        }
    }

    /// Attempt to record an event at `now`. Returns `true` if admitted.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.evict_expired(now);
        if self.count < self.max_events {
            self.timestamps[self.head] = now;
            self.head = (self.head + 1) % self.max_events;
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Would an acquire at `now` succeed, without recording one.
    pub fn can_acquire(&mut self, now: Instant) -> bool {
        self.evict_expired(now);
        self.count < self.max_events
    }

    /// How long until the next acquire would succeed. Zero if one would succeed now.
    pub fn time_until_available(&mut self, now: Instant) -> Duration {
        self.evict_expired(now);
        if self.count < self.max_events {
            return Duration::ZERO;
        }
        let oldest_idx = (self.head + self.max_events - self.count) % self.max_events;
        let oldest = self.timestamps[oldest_idx];
        (oldest + self.window).saturating_duration_since(now)
    }

    /// Number of events currently counted inside the window.
    pub fn len(&mut self, now: Instant) -> usize {
        self.evict_expired(now);
        self.count
    }

    pub fn is_empty(&mut self, now: Instant) -> bool {
        self.len(now) == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // S7 from the gumdrop spec: N=3, W=50ms. Acquires at t=0,10,20 succeed; t=25 fails;
    // t=55 succeeds because the t=0 entry has aged out of the window.
    #[test]
    fn scenario_s7_sliding_window() {
        let base = Instant::now();
        let mut w = SlidingWindow::new(3, Duration::from_millis(50));

        assert!(w.try_acquire(base));
        assert!(w.try_acquire(base + Duration::from_millis(10)));
        assert!(w.try_acquire(base + Duration::from_millis(20)));
        assert!(!w.try_acquire(base + Duration::from_millis(25)));
        assert!(w.try_acquire(base + Duration::from_millis(55)));
    }

    #[test]
    fn time_until_available_is_zero_when_room() {
        let base = Instant::now();
        let mut w = SlidingWindow::new(2, Duration::from_millis(100));
        assert_eq!(w.time_until_available(base), Duration::ZERO);
        w.try_acquire(base);
        assert_eq!(w.time_until_available(base), Duration::ZERO);
    }

    #[test]
    fn time_until_available_matches_oldest_expiry() {
        let base = Instant::now();
        let mut w = SlidingWindow::new(1, Duration::from_millis(100));
        assert!(w.try_acquire(base));
        assert_eq!(
            w.time_until_available(base + Duration::from_millis(40)),
            Duration::from_millis(60)
        );
    }

    #[test]
    fn never_exceeds_capacity_across_arbitrary_sequence() {
        let base = Instant::now();
        let mut w = SlidingWindow::new(5, Duration::from_millis(30));
        let mut admitted = 0u32;
        for ms in 0..1000u64 {
            let now = base + Duration::from_millis(ms);
            if w.try_acquire(now) {
                admitted += 1;
            }
            // property: never more than max_events admitted inside any 30ms window.
            assert!(w.len(now) <= 5);
        }
        assert!(admitted > 0);
    }
}
