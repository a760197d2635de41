//! # timer
//!
//! why: elections fire on randomized deadlines so nodes rarely collide
//! relations: owned by VolatileState, polled by the roles each tick
//! what: ElectionTimer with reset / forced expiry / expiry polling

use rand::Rng;
use std::time::{Duration, Instant};

/// holds a randomized deadline within [min_timeout, max_timeout]
#[derive(Debug)]
pub struct ElectionTimer {
    min_timeout: Duration,
    max_timeout: Duration,
    deadline: Instant,
    forced: bool,
}

impl ElectionTimer {
    pub fn new(min_timeout: Duration, max_timeout: Duration) -> Self {
        let mut timer = Self {
            min_timeout,
            max_timeout,
            deadline: Instant::now(),
            forced: false,
        };
        timer.reset();
        timer
    }

    fn random_timeout(&self) -> Duration {
        if self.min_timeout >= self.max_timeout {
            return self.min_timeout;
        }
        // both bounds are reachable deadlines
        rand::thread_rng().gen_range(self.min_timeout..=self.max_timeout)
    }

    /// rearm on a fresh randomized deadline
    pub fn reset(&mut self) {
        self.forced = false;
        self.deadline = Instant::now() + self.random_timeout();
    }

    /// force immediate expiry, e.g. on a targeted TimeoutNow
    pub fn timeout_now(&mut self) {
        self.forced = true;
    }

    pub fn is_expired(&self) -> bool {
        self.forced || Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_timer_is_not_expired() {
        let timer = ElectionTimer::new(Duration::from_secs(60), Duration::from_secs(120));
        assert!(!timer.is_expired());
    }

    #[test]
    fn timeout_now_forces_expiry_until_reset() {
        let mut timer = ElectionTimer::new(Duration::from_secs(60), Duration::from_secs(120));
        timer.timeout_now();
        assert!(timer.is_expired());
        timer.reset();
        assert!(!timer.is_expired());
    }

    #[test]
    fn equal_bounds_are_a_valid_range() {
        let timer = ElectionTimer::new(Duration::from_secs(60), Duration::from_secs(60));
        assert!(!timer.is_expired());
    }

    #[test]
    fn zero_bounds_expire_immediately() {
        let timer = ElectionTimer::new(Duration::ZERO, Duration::ZERO);
        assert!(timer.is_expired());
    }
}
