//! Session and per-hand cost accounting

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Why an agent was refused before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostRefusal {
    SessionCeiling,
    PerHandCap,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostLedger {
    session_total: Decimal,
    per_agent: BTreeMap<String, Decimal>,
    hand_id: Option<String>,
    hand_total: Decimal,
    session_ceiling: Decimal,
    per_hand_cap: Decimal,
}

impl CostLedger {
    pub fn new(session_ceiling: Decimal, per_hand_cap: Decimal) -> Self {
        Self {
            session_total: Decimal::ZERO,
            per_agent: BTreeMap::new(),
            hand_id: None,
            hand_total: Decimal::ZERO,
            session_ceiling,
            per_hand_cap,
        }
    }

    pub fn set_limits(&mut self, session_ceiling: Decimal, per_hand_cap: Decimal) {
        self.session_ceiling = session_ceiling;
        self.per_hand_cap = per_hand_cap;
    }

    /// Start accounting for a hand; a new id resets the per-hand total
    pub fn enter_hand(&mut self, hand_id: &str) {
        if self.hand_id.as_deref() != Some(hand_id) {
            self.hand_id = Some(hand_id.to_string());
            self.hand_total = Decimal::ZERO;
        }
    }

    /// Check an estimated attempt against both limits
    ///
    /// `reserved` is what this decision has already committed to agents
    /// dispatched before this one and is not charged yet.
    pub fn admit(&self, estimate: Decimal, reserved: Decimal) -> Result<(), CostRefusal> {
        if self.session_total + reserved + estimate > self.session_ceiling {
            return Err(CostRefusal::SessionCeiling);
        }
        if self.hand_total + reserved + estimate > self.per_hand_cap {
            return Err(CostRefusal::PerHandCap);
        }
        Ok(())
    }

    pub fn charge(&mut self, agent: &str, amount: Decimal) {
        self.session_total += amount;
        self.hand_total += amount;
        *self.per_agent.entry(agent.to_string()).or_default() += amount;
        debug!(agent, %amount, session_total = %self.session_total, "Charged agent cost");
    }

    pub fn session_total(&self) -> Decimal {
        self.session_total
    }

    pub fn hand_total(&self) -> Decimal {
        self.hand_total
    }

    pub fn agent_total(&self, agent: &str) -> Decimal {
        self.per_agent.get(agent).copied().unwrap_or_default()
    }

    pub fn reset_session(&mut self) {
        self.session_total = Decimal::ZERO;
        self.per_agent.clear();
        self.hand_id = None;
        self.hand_total = Decimal::ZERO;
    }
}
