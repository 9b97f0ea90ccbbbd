//! Session-scoped circuit breaker for the structured store.
//!
//! Two protections with different horizons:
//!
//! - **Cool-down**: right after any failure, further attempts wait
//!   `cooldown_ms`. This rides out transient lock contention.
//! - **Session disable**: after `threshold` consecutive failures the
//!   structured store stays off for the rest of the session. Successes do
//!   not undo this; only [`CircuitBreaker::reset`] does.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use catalog_cache::{CircuitBreaker, SessionStore};
//! use catalog_cache_core::ManualClock;
//!
//! let clock = ManualClock::new(0);
//! let mut breaker = CircuitBreaker::new(SessionStore::Memory, 3, 30_000, Arc::new(clock));
//! for _ in 0..3 {
//!     breaker.record_failure("database is locked");
//! }
//! assert!(breaker.is_disabled_this_session());
//! breaker.reset();
//! breaker.record_failure("database is locked");
//! assert!(!breaker.is_disabled_this_session());
//! ```

use std::sync::Arc;

use catalog_cache_core::Clock;
use tracing::{debug, info, warn};

use crate::session::{SessionState, SessionStore};

/// Counts storage failures and decides whether the structured store may be
/// used.
pub struct CircuitBreaker {
    state: SessionState,
    store: SessionStore,
    threshold: u32,
    cooldown_ms: i64,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Creates a breaker, restoring any state persisted earlier in the
    /// session.
    pub fn new(store: SessionStore, threshold: u32, cooldown_ms: i64, clock: Arc<dyn Clock>) -> Self {
        let state = store.load();
        if state.disabled {
            info!(
                reason = state.disabled_reason.as_deref().unwrap_or("unknown"),
                "Structured storage disabled earlier this session"
            );
        }
        Self {
            state,
            store,
            threshold: threshold.max(1),
            cooldown_ms,
            clock,
        }
    }

    pub fn is_disabled_this_session(&self) -> bool {
        self.state.disabled
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.state.disabled_reason.as_deref()
    }

    pub fn failure_count(&self) -> u32 {
        self.state.consecutive_failures
    }

    /// `true` when a failure happened less than the cool-down ago.
    pub fn in_cooldown(&self) -> bool {
        self.state
            .last_failure_at_ms
            .is_some_and(|at| self.clock.now_ms() - at < self.cooldown_ms)
    }

    /// `true` when the structured store may be tried now.
    pub fn should_attempt(&self) -> bool {
        !self.state.disabled && !self.in_cooldown()
    }

    /// Counts a failure; disables the store once the threshold is reached.
    pub fn record_failure(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.state.consecutive_failures += 1;
        self.state.last_failure_at_ms = Some(self.clock.now_ms());
        warn!(
            failures = self.state.consecutive_failures,
            threshold = self.threshold,
            reason = %reason,
            "Structured storage failure"
        );

        if !self.state.disabled && self.state.consecutive_failures >= self.threshold {
            warn!(reason = %reason, "Disabling structured storage for this session");
            self.state.disabled = true;
            self.state.disabled_reason = Some(reason);
        }
        self.persist();
    }

    /// Zeroes the failure counter. A session disable stays in force.
    pub fn record_success(&mut self) {
        if self.state.consecutive_failures == 0 && self.state.last_failure_at_ms.is_none() {
            return;
        }
        debug!("Structured storage healthy, clearing failure count");
        self.state.consecutive_failures = 0;
        self.state.last_failure_at_ms = None;
        self.persist();
    }

    /// Clears the disabled flag, the counter, and the cool-down, allowing a
    /// fresh attempt.
    pub fn reset(&mut self) {
        info!("Structured storage breaker reset");
        self.state = SessionState::default();
        self.persist();
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            warn!(error = %e, "Failed to persist session state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_cache_core::ManualClock;

    fn breaker(clock: &ManualClock) -> CircuitBreaker {
        CircuitBreaker::new(SessionStore::Memory, 3, 30_000, Arc::new(clock.clone()))
    }

    #[test]
    fn test_disables_after_exactly_threshold_failures() {
        let clock = ManualClock::new(0);
        let mut b = breaker(&clock);
        b.record_failure("a");
        b.record_failure("b");
        assert!(!b.is_disabled_this_session());
        b.record_failure("c");
        assert!(b.is_disabled_this_session());
        assert_eq!(b.disabled_reason(), Some("c"));
    }

    #[test]
    fn test_success_resets_counter_between_failures() {
        let clock = ManualClock::new(0);
        let mut b = breaker(&clock);
        b.record_failure("a");
        b.record_failure("b");
        b.record_success();
        b.record_failure("c");
        assert!(!b.is_disabled_this_session());
        assert_eq!(b.failure_count(), 1);
    }

    #[test]
    fn test_disable_is_sticky_across_success() {
        let clock = ManualClock::new(0);
        let mut b = breaker(&clock);
        for _ in 0..3 {
            b.record_failure("x");
        }
        b.record_success();
        assert!(b.is_disabled_this_session());
        clock.advance(10 * 60 * 1000);
        assert!(!b.should_attempt());
    }

    #[test]
    fn test_reset_allows_fresh_attempt() {
        let clock = ManualClock::new(0);
        let mut b = breaker(&clock);
        for _ in 0..3 {
            b.record_failure("x");
        }
        b.reset();
        assert!(!b.is_disabled_this_session());
        assert!(b.should_attempt());
        b.record_failure("y");
        assert!(!b.is_disabled_this_session());
    }

    #[test]
    fn test_cooldown_after_failure() {
        let clock = ManualClock::new(1_000);
        let mut b = breaker(&clock);
        assert!(b.should_attempt());
        b.record_failure("busy");
        assert!(!b.should_attempt());
        clock.advance(29_999);
        assert!(!b.should_attempt());
        clock.advance(1);
        assert!(b.should_attempt());
    }

    #[test]
    fn test_disabled_state_survives_new_breaker_in_same_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::File(dir.path().join("session.json"));
        let clock = ManualClock::new(0);
        {
            let mut b = CircuitBreaker::new(store.clone(), 3, 30_000, Arc::new(clock.clone()));
            for _ in 0..3 {
                b.record_failure("disk I/O error");
            }
        }
        let b = CircuitBreaker::new(store, 3, 30_000, Arc::new(clock));
        assert!(b.is_disabled_this_session());
        assert_eq!(b.disabled_reason(), Some("disk I/O error"));
    }
}
