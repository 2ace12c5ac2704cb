//! Session risk limits and the panic-stop latch

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::common::channels::{publish, HealthEvent, HealthSender};
use crate::common::errors::{DecisionError, Result};
use crate::config::types::RiskConfig;

/// Session-scoped running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub bankroll_delta: Decimal,
    pub hands_played: u32,
    pub hands_lost: u32,
    pub total_lost: Decimal,
    pub session_started: DateTime<Utc>,
    /// Hand ids already settled, kept across restarts
    #[serde(default)]
    recorded: BTreeSet<String>,
}

impl RiskState {
    pub fn new(session_started: DateTime<Utc>) -> Self {
        Self {
            bankroll_delta: Decimal::ZERO,
            hands_played: 0,
            hands_lost: 0,
            total_lost: Decimal::ZERO,
            session_started,
            recorded: BTreeSet::new(),
        }
    }

    pub fn has_recorded(&self, hand_id: &str) -> bool {
        self.recorded.contains(hand_id)
    }

    pub fn session_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.session_started).num_minutes()
    }
}

/// Configured limits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskLimits {
    /// Bankroll-delta floor; at or below it the session stops
    pub stop_loss: Decimal,
    pub max_hands: u32,
    pub max_session_minutes: u64,
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            stop_loss: config.stop_loss,
            max_hands: config.max_hands,
            max_session_minutes: config.max_session_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskViolation {
    StopLoss { bankroll_delta: Decimal, stop_loss: Decimal },
    HandLimit { hands_played: u32, max_hands: u32 },
    SessionTime { minutes: i64, max_minutes: u64 },
}

impl fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskViolation::StopLoss {
                bankroll_delta,
                stop_loss,
            } => write!(f, "bankroll delta {} at or below stop-loss {}", bankroll_delta, stop_loss),
            RiskViolation::HandLimit {
                hands_played,
                max_hands,
            } => write!(f, "{} hands played, limit {}", hands_played, max_hands),
            RiskViolation::SessionTime {
                minutes,
                max_minutes,
            } => write!(f, "session running {} minutes, limit {}", minutes, max_minutes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskCheck {
    Ok,
    Violation { reason: String },
}

impl RiskCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, RiskCheck::Ok)
    }
}

/// Pure limit check; never mutates state
pub fn check_limits(state: &RiskState, limits: &RiskLimits, now: DateTime<Utc>) -> Option<RiskViolation> {
    if state.bankroll_delta <= limits.stop_loss {
        return Some(RiskViolation::StopLoss {
            bankroll_delta: state.bankroll_delta,
            stop_loss: limits.stop_loss,
        });
    }
    if state.hands_played >= limits.max_hands {
        return Some(RiskViolation::HandLimit {
            hands_played: state.hands_played,
            max_hands: limits.max_hands,
        });
    }
    let minutes = state.session_minutes(now);
    if minutes >= limits.max_session_minutes as i64 {
        return Some(RiskViolation::SessionTime {
            minutes,
            max_minutes: limits.max_session_minutes,
        });
    }
    None
}

#[derive(Debug)]
struct GuardInner {
    state: RiskState,
    limits: RiskLimits,
    halted: Option<String>,
}

/// Owns the session's risk state and the panic latch
///
/// Once a violation is seen the guard stays halted until
/// [`RiskGuard::manual_reset`], even if the state later looks fine.
#[derive(Debug)]
pub struct RiskGuard {
    inner: Mutex<GuardInner>,
    health: Option<HealthSender>,
}

impl RiskGuard {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            inner: Mutex::new(GuardInner {
                state: RiskState::new(Utc::now()),
                limits: RiskLimits::from(config),
                halted: None,
            }),
            health: None,
        }
    }

    pub fn with_health(mut self, sender: HealthSender) -> Self {
        self.health = Some(sender);
        self
    }

    /// Resume from a persisted state (e.g. after a restart mid-session)
    pub fn with_state(self, state: RiskState) -> Self {
        self.lock().state = state;
        self
    }

    fn lock(&self) -> MutexGuard<'_, GuardInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn apply_config(&self, config: &RiskConfig) {
        self.lock().limits = RiskLimits::from(config);
    }

    pub fn state(&self) -> RiskState {
        self.lock().state.clone()
    }

    pub fn limits(&self) -> RiskLimits {
        self.lock().limits.clone()
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.lock().halted.clone()
    }

    /// Gate consulted once per decision before finalization
    ///
    /// A violation latches the guard and publishes a panic stop.
    pub fn check(&self) -> RiskCheck {
        self.check_at(Utc::now())
    }

    pub fn check_at(&self, now: DateTime<Utc>) -> RiskCheck {
        let mut inner = self.lock();
        if let Some(reason) = &inner.halted {
            return RiskCheck::Violation {
                reason: reason.clone(),
            };
        }

        match check_limits(&inner.state, &inner.limits, now) {
            None => RiskCheck::Ok,
            Some(violation) => {
                let reason = violation.to_string();
                error!("Risk violation, halting automated decisions: {}", reason);
                inner.halted = Some(reason.clone());
                drop(inner);
                publish(
                    self.health.as_ref(),
                    HealthEvent::PanicStop {
                        reason: reason.clone(),
                    },
                );
                RiskCheck::Violation { reason }
            }
        }
    }

    /// Record a finished hand's net result; each hand id counts once
    pub fn record_outcome(&self, hand_id: &str, net: Decimal) -> Result<()> {
        let mut inner = self.lock();
        let state = &mut inner.state;
        if !state.recorded.insert(hand_id.to_string()) {
            warn!("Outcome for hand {} already recorded, ignoring", hand_id);
            return Err(DecisionError::Validation(format!(
                "duplicate outcome for hand {}",
                hand_id
            )));
        }
        state.bankroll_delta += net;
        state.hands_played += 1;
        if net < Decimal::ZERO {
            state.hands_lost += 1;
            state.total_lost -= net;
        }
        info!(
            hand_id,
            %net,
            bankroll_delta = %state.bankroll_delta,
            hands_played = state.hands_played,
            "Recorded hand outcome"
        );
        Ok(())
    }

    /// Start a new session; the panic latch is left as it is
    pub fn reset_session(&self) {
        let mut inner = self.lock();
        inner.state = RiskState::new(Utc::now());
        info!("Risk session reset");
    }

    /// Clear the panic latch. Returns false if the guard was not halted.
    pub fn manual_reset(&self) -> bool {
        let cleared = self.lock().halted.take();
        if let Some(reason) = &cleared {
            info!("Panic stop cleared (was: {})", reason);
        }
        cleared.is_some()
    }
}
