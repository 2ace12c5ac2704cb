//! Per-agent circuit breaker
//!
//! Closed → Open after `threshold` consecutive failures. Open agents are not
//! queried. A manual reset (or the optional cooldown) moves Open to
//! HalfOpen, where a single success closes the breaker and a single
//! failure reopens it.

use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// What a recorded outcome did to the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Tripped,
    Closed,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    threshold: u32,
    cooldown: Option<Duration>,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Option<Duration>) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            threshold: threshold.max(1),
            cooldown,
            opened_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Hot-reloaded thresholds apply from the next recorded outcome
    pub fn configure(&mut self, threshold: u32, cooldown: Option<Duration>) {
        self.threshold = threshold.max(1);
        self.cooldown = cooldown;
    }

    /// Whether the agent may be queried; applies the cooldown if configured
    pub fn allows_request(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => match (self.cooldown, self.opened_at) {
                (Some(cooldown), Some(opened)) if now.duration_since(opened) >= cooldown => {
                    self.state = BreakerState::HalfOpen;
                    true
                }
                _ => false,
            },
        }
    }

    pub fn record_success(&mut self) -> Transition {
        self.consecutive_failures = 0;
        let was = self.state;
        self.state = BreakerState::Closed;
        self.opened_at = None;
        if was == BreakerState::Closed {
            Transition::None
        } else {
            Transition::Closed
        }
    }

    pub fn record_failure(&mut self, now: Instant) -> Transition {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let trip = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => self.consecutive_failures >= self.threshold,
            BreakerState::Open => false,
        };
        if trip {
            self.state = BreakerState::Open;
            self.opened_at = Some(now);
            Transition::Tripped
        } else {
            Transition::None
        }
    }

    /// Manual reset: Open → HalfOpen. Returns false if the breaker was not open.
    pub fn reset(&mut self) -> bool {
        if self.state != BreakerState::Open {
            return false;
        }
        self.state = BreakerState::HalfOpen;
        self.opened_at = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_after_threshold() {
        let mut breaker = CircuitBreaker::new(5, None);
        let now = Instant::now();
        for _ in 0..4 {
            assert_eq!(breaker.record_failure(now), Transition::None);
        }
        assert!(breaker.allows_request(now));
        assert_eq!(breaker.record_failure(now), Transition::Tripped);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allows_request(now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_success_resets_counter() {
        let mut breaker = CircuitBreaker::new(2, None);
        let now = Instant::now();
        breaker.record_failure(now);
        breaker.record_success();
        assert_eq!(breaker.record_failure(now), Transition::None);
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[test]
    fn test_half_open_single_outcome() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(1, None);
        breaker.record_failure(now);
        assert!(breaker.reset());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.record_failure(now), Transition::Tripped);

        assert!(breaker.reset());
        assert_eq!(breaker.record_success(), Transition::Closed);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(!breaker.reset());
    }

    #[test]
    fn test_cooldown_moves_to_half_open() {
        let now = Instant::now();
        let mut breaker = CircuitBreaker::new(1, Some(Duration::from_millis(100)));
        breaker.record_failure(now);
        assert!(!breaker.allows_request(now + Duration::from_millis(50)));
        assert!(breaker.allows_request(now + Duration::from_millis(150)));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }
}
