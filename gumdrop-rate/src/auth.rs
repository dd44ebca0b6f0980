//! Per-key authentication-failure lockout with optional exponential backoff.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::RwLock,
    time::{Duration, Instant},
};

use crate::timer::{Clock, SystemClock};

#[derive(Debug, Clone, Copy)]
struct LockoutState {
    failure_count: u32,
    lockout_until: Option<Instant>,
    lockout_round: u32,
}

impl LockoutState {
    fn fresh() -> Self {
        Self {
            failure_count: 0,
            lockout_until: None,
            lockout_round: 0,
        }
    }
}

/// Configuration for [`AuthLimiter`].
#[derive(Debug, Clone, Copy)]
pub struct AuthLimitConfig {
    pub max_failures: u32,
    pub lockout: Duration,
    pub max_lockout: Duration,
    pub exponential_backoff: bool,
}

impl Default for AuthLimitConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            lockout: Duration::from_secs(1),
            max_lockout: Duration::from_secs(300),
            exponential_backoff: true,
        }
    }
}

/// Tracks failed-authentication counts per key (username, API token, peer IP, ...) and locks a
/// key out for an interval that doubles on each successive lockout when exponential backoff is
/// enabled.
pub struct AuthLimiter<K, C: Clock = SystemClock> {
    config: AuthLimitConfig,
    entries: RwLock<HashMap<K, LockoutState>>,
    clock: C,
}

impl<K: Eq + Hash + Clone> AuthLimiter<K, SystemClock> {
    pub fn new(config: AuthLimitConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K: Eq + Hash + Clone, C: Clock> AuthLimiter<K, C> {
    pub fn with_clock(config: AuthLimitConfig, clock: C) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Is `key` currently locked out. As a side effect, a lockout that has already expired is
    /// cleared (failure count reset to zero; the lockout round is kept for backoff history).
    pub fn is_locked(&self, key: &K) -> bool {
        let now = self.clock.now();
        let mut guard = self.entries.write().unwrap();
        let Some(state) = guard.get_mut(key) else {
            return false;
        };
        match state.lockout_until {
            Some(until) if until > now => true,
            Some(_) => {
                state.lockout_until = None;
                state.failure_count = 0;
                false
            }
            None => false,
        }
    }

    /// Record an authentication failure for `key`. Returns `true` if this failure triggered a
    /// (new) lockout.
    pub fn record_failure(&self, key: K) -> bool {
        let now = self.clock.now();
        let mut guard = self.entries.write().unwrap();
        let state = guard.entry(key).or_insert_with(LockoutState::fresh);

        state.failure_count += 1;
        if state.failure_count >= self.config.max_failures {
            state.lockout_round += 1;
            let base = if self.config.exponential_backoff {
                let shift = state.lockout_round.saturating_sub(1).min(31);
                self.config.lockout.saturating_mul(1u32 << shift)
            } else {
                self.config.lockout
            };
            let duration = base.min(self.config.max_lockout);
            state.lockout_until = Some(now + duration);
            true
        } else {
            false
        }
    }

    /// Record a successful authentication: clears the failure count and any active lockout,
    /// but keeps the round counter so a subsequent lockout continues the backoff sequence.
    pub fn record_success(&self, key: &K) {
        let mut guard = self.entries.write().unwrap();
        if let Some(state) = guard.get_mut(key) {
            state.failure_count = 0;
            state.lockout_until = None;
        }
    }

    /// Administrative unlock: forgets the key entirely, including its backoff round.
    pub fn unlock(&self, key: &K) {
        self.entries.write().unwrap().remove(key);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timer::FakeClock;

    fn config() -> AuthLimitConfig {
        AuthLimitConfig {
            max_failures: 3,
            lockout: Duration::from_millis(100),
            max_lockout: Duration::from_secs(10),
            exponential_backoff: true,
        }
    }

    // S8 from the gumdrop spec: maxFailures=3, lockoutMs=100, exponentialBackoff=true.
    // After 3 failures the key is locked until t+100. After the lockout expires and another
    // 3 failures occur, the second lockout ends at t+200 (round 2 => 100 * 2^1).
    #[test]
    fn scenario_s8_exponential_backoff() {
        let clock = FakeClock::default();
        let lim: AuthLimiter<&str, _> = AuthLimiter::with_clock(config(), clock.clone());

        assert!(!lim.record_failure("alice"));
        assert!(!lim.record_failure("alice"));
        assert!(lim.record_failure("alice"));
        assert!(lim.is_locked(&"alice"));

        clock.advance(Duration::from_millis(99));
        assert!(lim.is_locked(&"alice"));
        clock.advance(Duration::from_millis(2));
        assert!(!lim.is_locked(&"alice"));

        assert!(!lim.record_failure("alice"));
        assert!(!lim.record_failure("alice"));
        let locked_again = lim.record_failure("alice");
        assert!(locked_again);

        clock.advance(Duration::from_millis(199));
        assert!(lim.is_locked(&"alice"));
        clock.advance(Duration::from_millis(2));
        assert!(!lim.is_locked(&"alice"));
    }

    #[test]
    fn success_resets_failures_but_keeps_round() {
        let clock = FakeClock::default();
        let lim: AuthLimiter<&str, _> = AuthLimiter::with_clock(config(), clock.clone());

        lim.record_failure("bob");
        lim.record_failure("bob");
        lim.record_success(&"bob");
        assert!(!lim.is_locked(&"bob"));

        // three more failures should lock out again at the base interval (round still 0).
        lim.record_failure("bob");
        lim.record_failure("bob");
        assert!(lim.record_failure("bob"));
    }

    #[test]
    fn non_exponential_backoff_uses_fixed_interval() {
        let clock = FakeClock::default();
        let cfg = AuthLimitConfig {
            exponential_backoff: false,
            ..config()
        };
        let lim: AuthLimiter<&str, _> = AuthLimiter::with_clock(cfg, clock.clone());

        for _ in 0..3 {
            lim.record_failure("carol");
        }
        clock.advance(Duration::from_millis(101));
        assert!(!lim.is_locked(&"carol"));

        for _ in 0..3 {
            lim.record_failure("carol");
        }
        clock.advance(Duration::from_millis(101));
        assert!(!lim.is_locked(&"carol"));
    }

    #[test]
    fn backoff_saturates_at_max_lockout() {
        let clock = FakeClock::default();
        let cfg = AuthLimitConfig {
            max_failures: 1,
            lockout: Duration::from_millis(100),
            max_lockout: Duration::from_millis(250),
            exponential_backoff: true,
        };
        let lim: AuthLimiter<&str, _> = AuthLimiter::with_clock(cfg, clock.clone());

        lim.record_failure("dan"); // round 1: 100ms
        clock.advance(Duration::from_millis(101));
        assert!(!lim.is_locked(&"dan"));

        lim.record_failure("dan"); // round 2: would be 200ms, still under cap
        clock.advance(Duration::from_millis(201));
        assert!(!lim.is_locked(&"dan"));

        lim.record_failure("dan"); // round 3: would be 400ms, capped to 250ms
        clock.advance(Duration::from_millis(249));
        assert!(lim.is_locked(&"dan"));
        clock.advance(Duration::from_millis(2));
        assert!(!lim.is_locked(&"dan"));
    }

    #[test]
    fn unlock_forgets_backoff_round() {
        let clock = FakeClock::default();
        let lim: AuthLimiter<&str, _> = AuthLimiter::with_clock(config(), clock.clone());
        for _ in 0..3 {
            lim.record_failure("erin");
        }
        lim.unlock(&"erin");
        assert!(!lim.is_locked(&"erin"));
        // after unlock, round resets too: next lockout should use the base interval again.
        for _ in 0..3 {
            lim.record_failure("erin");
        }
        clock.advance(Duration::from_millis(101));
        assert!(!lim.is_locked(&"erin"));
    }
}
