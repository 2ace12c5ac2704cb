//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::budget::Component;
use crate::common::errors::{DecisionError, Result};
use crate::common::types::Street;

/// Allowed runtime range for the blend coefficient
pub const ALPHA_RANGE: (f64, f64) = (0.3, 0.9);

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

impl EngineConfig {
    /// Reject values the decision core cannot run with
    pub fn validate(&self) -> Result<()> {
        self.budget.validate()?;
        self.strategy.validate()?;
        self.sizing.validate()?;
        self.agents.validate()?;
        if self.risk.stop_loss > Decimal::ZERO {
            return Err(DecisionError::Configuration(
                "risk.stop_loss is a bankroll-delta floor and must be <= 0".into(),
            ));
        }
        Ok(())
    }
}

/// Time budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total per-decision deadline in milliseconds
    #[serde(default = "default_total_ms")]
    pub total_ms: u64,
    /// Share of the total per component; must sum to 1
    #[serde(default = "default_ratios")]
    pub ratios: HashMap<Component, f64>,
    /// Component that absorbs overruns of other components
    #[serde(default = "default_donor")]
    pub donor: Component,
    /// Strategy slice that is never lent out
    #[serde(default = "default_strategy_min_reserve_ms")]
    pub strategy_min_reserve_ms: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_ms: default_total_ms(),
            ratios: default_ratios(),
            donor: default_donor(),
            strategy_min_reserve_ms: default_strategy_min_reserve_ms(),
        }
    }
}

impl BudgetConfig {
    fn validate(&self) -> Result<()> {
        if self.total_ms == 0 {
            return Err(DecisionError::Configuration("budget.total_ms must be > 0".into()));
        }
        if self.ratios.values().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(DecisionError::Configuration(
                "budget ratios must lie in [0, 1]".into(),
            ));
        }
        let sum: f64 = self.ratios.values().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(DecisionError::Configuration(format!(
                "budget ratios must sum to 1, got {}",
                sum
            )));
        }
        if matches!(self.donor, Component::Risk) {
            return Err(DecisionError::Configuration(
                "risk guard budget cannot be a donor".into(),
            ));
        }
        Ok(())
    }
}

fn default_total_ms() -> u64 {
    2000
}

fn default_ratios() -> HashMap<Component, f64> {
    HashMap::from([
        (Component::Perception, 0.15),
        (Component::Gto, 0.20),
        (Component::Agents, 0.40),
        (Component::Strategy, 0.10),
        (Component::Risk, 0.02),
        (Component::Executor, 0.08),
        (Component::Buffer, 0.05),
    ])
}

fn default_donor() -> Component {
    Component::Buffer
}

fn default_strategy_min_reserve_ms() -> u64 {
    50
}

/// GTO solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Optional JSON range table overriding the built-in preflop table
    #[serde(default)]
    pub range_table_path: Option<String>,
    /// Max bucket distance accepted by the fuzzy cache lookup
    #[serde(default = "default_fuzzy_radius")]
    pub fuzzy_radius: u16,
    /// Effective stack (bb) above which bet sizes are widened
    #[serde(default = "default_deep_stack_bb")]
    pub deep_stack_bb: f64,
    /// Regret-matching iterations for river refinement
    #[serde(default = "default_subgame_iterations")]
    pub subgame_iterations: u32,
    /// Minimum remaining solver budget to attempt river refinement
    #[serde(default = "default_subgame_min_budget_ms")]
    pub subgame_min_budget_ms: u64,
    /// Equity at or above which hero bets for value
    #[serde(default = "default_value_threshold")]
    pub value_threshold: f64,
    /// Equity below which hero checks back marginal holdings
    #[serde(default = "default_check_threshold")]
    pub check_threshold: f64,
    /// Continuation-bet frequency per board texture class
    #[serde(default = "default_cbet_frequency")]
    pub cbet_frequency: HashMap<String, f64>,
    #[serde(default = "default_ip_multiplier")]
    pub ip_aggression: f64,
    #[serde(default = "default_oop_multiplier")]
    pub oop_aggression: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            range_table_path: None,
            fuzzy_radius: default_fuzzy_radius(),
            deep_stack_bb: default_deep_stack_bb(),
            subgame_iterations: default_subgame_iterations(),
            subgame_min_budget_ms: default_subgame_min_budget_ms(),
            value_threshold: default_value_threshold(),
            check_threshold: default_check_threshold(),
            cbet_frequency: default_cbet_frequency(),
            ip_aggression: default_ip_multiplier(),
            oop_aggression: default_oop_multiplier(),
        }
    }
}

fn default_fuzzy_radius() -> u16 {
    2
}

fn default_deep_stack_bb() -> f64 {
    100.0
}

fn default_subgame_iterations() -> u32 {
    400
}

fn default_subgame_min_budget_ms() -> u64 {
    20
}

fn default_value_threshold() -> f64 {
    0.65
}

fn default_check_threshold() -> f64 {
    0.40
}

fn default_cbet_frequency() -> HashMap<String, f64> {
    HashMap::from([
        ("dry".to_string(), 0.75),
        ("paired".to_string(), 0.70),
        ("wet".to_string(), 0.45),
        ("monotone".to_string(), 0.35),
    ])
}

fn default_ip_multiplier() -> f64 {
    1.15
}

fn default_oop_multiplier() -> f64 {
    0.85
}

/// One external reasoner endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerConfig {
    pub name: String,
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token, if any
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_agent_timeout_ms")]
    pub timeout_ms: u64,
    /// Price per 1000 tokens
    #[serde(default)]
    pub cost_per_1k_tokens: Decimal,
    /// Tokens charged when the reply carries no usage
    #[serde(default = "default_estimated_tokens")]
    pub estimated_tokens: u32,
}

impl ReasonerConfig {
    /// Cost of one attempt at the estimated token count
    pub fn estimated_cost(&self) -> Decimal {
        self.cost_for_tokens(self.estimated_tokens)
    }

    pub fn cost_for_tokens(&self, tokens: u32) -> Decimal {
        self.cost_per_1k_tokens * Decimal::from(tokens) / dec!(1000)
    }
}

fn default_agent_timeout_ms() -> u64 {
    1200
}

fn default_estimated_tokens() -> u32 {
    800
}

/// Agent coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub reasoners: Vec<ReasonerConfig>,
    /// Consecutive failures that trip a breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Optional open → half-open cooldown; None means manual reset only
    #[serde(default)]
    pub breaker_cooldown_ms: Option<u64>,
    #[serde(default = "default_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub retry_backoff_cap_ms: u64,
    /// Smallest timeout worth dispatching a retry with
    #[serde(default = "default_min_retry_window_ms")]
    pub min_retry_window_ms: u64,
    #[serde(default = "default_session_cost_ceiling")]
    pub session_cost_ceiling: Decimal,
    #[serde(default = "default_per_hand_cost_cap")]
    pub per_hand_cost_cap: Decimal,
    /// Initial weights by reasoner name; missing names get an equal share
    #[serde(default)]
    pub initial_weights: HashMap<String, f64>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            reasoners: Vec::new(),
            failure_threshold: default_failure_threshold(),
            breaker_cooldown_ms: None,
            retry_backoff_base_ms: default_backoff_base_ms(),
            retry_backoff_cap_ms: default_backoff_cap_ms(),
            min_retry_window_ms: default_min_retry_window_ms(),
            session_cost_ceiling: default_session_cost_ceiling(),
            per_hand_cost_cap: default_per_hand_cost_cap(),
            initial_weights: HashMap::new(),
        }
    }
}

impl AgentsConfig {
    fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(DecisionError::Configuration(
                "agents.failure_threshold must be > 0".into(),
            ));
        }
        if self.session_cost_ceiling < Decimal::ZERO || self.per_hand_cost_cap < Decimal::ZERO {
            return Err(DecisionError::Configuration("cost caps must be >= 0".into()));
        }
        for r in &self.reasoners {
            url::Url::parse(&r.endpoint).map_err(|e| {
                DecisionError::Configuration(format!("reasoner {} endpoint: {}", r.name, e))
            })?;
        }
        let mut names: Vec<&str> = self.reasoners.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.reasoners.len() {
            return Err(DecisionError::Configuration("duplicate reasoner names".into()));
        }
        Ok(())
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    50
}

fn default_backoff_cap_ms() -> u64 {
    200
}

fn default_min_retry_window_ms() -> u64 {
    100
}

fn default_session_cost_ceiling() -> Decimal {
    dec!(50)
}

fn default_per_hand_cost_cap() -> Decimal {
    dec!(0.25)
}

/// How the final action is picked from the blended distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Sample,
    Argmax,
}

/// Strategy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Weight of the GTO distribution in the blend
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Total-variation distance above which a diagnostic trace is emitted
    #[serde(default = "default_divergence_threshold")]
    pub divergence_threshold: f64,
    #[serde(default)]
    pub selection: SelectionMode,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            divergence_threshold: default_divergence_threshold(),
            selection: SelectionMode::default(),
        }
    }
}

impl StrategyConfig {
    fn validate(&self) -> Result<()> {
        validate_alpha(self.alpha)?;
        if !(0.0..=1.0).contains(&self.divergence_threshold) {
            return Err(DecisionError::Configuration(
                "strategy.divergence_threshold must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

pub fn validate_alpha(alpha: f64) -> Result<()> {
    if !(ALPHA_RANGE.0..=ALPHA_RANGE.1).contains(&alpha) {
        return Err(DecisionError::Configuration(format!(
            "alpha {} outside [{}, {}]",
            alpha, ALPHA_RANGE.0, ALPHA_RANGE.1
        )));
    }
    Ok(())
}

fn default_alpha() -> f64 {
    0.7
}

fn default_divergence_threshold() -> f64 {
    0.30
}

/// Discrete bet sizes
///
/// Preflop sizes are raise-to multiples of the big blind; postflop sizes are
/// fractions of the pot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_preflop_sizes")]
    pub preflop: Vec<f64>,
    #[serde(default = "default_flop_sizes")]
    pub flop: Vec<f64>,
    #[serde(default = "default_turn_sizes")]
    pub turn: Vec<f64>,
    #[serde(default = "default_river_sizes")]
    pub river: Vec<f64>,
    /// Sizes added when the effective stack is deep
    #[serde(default = "default_deep_preflop_sizes")]
    pub deep_preflop: Vec<f64>,
    #[serde(default = "default_deep_postflop_sizes")]
    pub deep_postflop: Vec<f64>,
    /// Venue chip increment
    #[serde(default = "default_min_increment")]
    pub min_increment: f64,
    /// Optional cap on any bet as a multiple of the pot
    #[serde(default)]
    pub pot_cap_multiple: Option<f64>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            preflop: default_preflop_sizes(),
            flop: default_flop_sizes(),
            turn: default_turn_sizes(),
            river: default_river_sizes(),
            deep_preflop: default_deep_preflop_sizes(),
            deep_postflop: default_deep_postflop_sizes(),
            min_increment: default_min_increment(),
            pot_cap_multiple: None,
        }
    }
}

impl SizingConfig {
    /// Size set for a street, widened when `deep` is set
    pub fn sizes_for(&self, street: Street, deep: bool) -> Vec<f64> {
        let (base, extra) = match street {
            Street::Preflop => (&self.preflop, &self.deep_preflop),
            Street::Flop => (&self.flop, &self.deep_postflop),
            Street::Turn => (&self.turn, &self.deep_postflop),
            Street::River => (&self.river, &self.deep_postflop),
        };
        let mut sizes = base.clone();
        if deep {
            sizes.extend(extra.iter().copied());
        }
        sizes.sort_by(|a, b| a.total_cmp(b));
        sizes.dedup();
        sizes
    }

    fn validate(&self) -> Result<()> {
        for (street, sizes) in [
            ("preflop", &self.preflop),
            ("flop", &self.flop),
            ("turn", &self.turn),
            ("river", &self.river),
        ] {
            if sizes.is_empty() || sizes.iter().any(|s| !s.is_finite() || *s <= 0.0) {
                return Err(DecisionError::Configuration(format!(
                    "sizing.{} must be a non-empty set of positive sizes",
                    street
                )));
            }
        }
        if self.min_increment <= 0.0 {
            return Err(DecisionError::Configuration(
                "sizing.min_increment must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_preflop_sizes() -> Vec<f64> {
    vec![2.5, 3.0, 9.0, 22.0]
}

fn default_flop_sizes() -> Vec<f64> {
    vec![0.33, 0.5, 0.75]
}

fn default_turn_sizes() -> Vec<f64> {
    vec![0.5, 0.75, 1.0]
}

fn default_river_sizes() -> Vec<f64> {
    vec![0.5, 0.75, 1.0]
}

fn default_deep_preflop_sizes() -> Vec<f64> {
    vec![12.0, 30.0]
}

fn default_deep_postflop_sizes() -> Vec<f64> {
    vec![1.5, 2.0]
}

fn default_min_increment() -> f64 {
    0.01
}

/// Session risk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Bankroll delta at or below which the session stops (e.g. -500)
    #[serde(default = "default_stop_loss")]
    pub stop_loss: Decimal,
    #[serde(default = "default_max_hands")]
    pub max_hands: u32,
    #[serde(default = "default_max_session_minutes")]
    pub max_session_minutes: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss: default_stop_loss(),
            max_hands: default_max_hands(),
            max_session_minutes: default_max_session_minutes(),
        }
    }
}

fn default_stop_loss() -> Decimal {
    dec!(-500)
}

fn default_max_hands() -> u32 {
    2000
}

fn default_max_session_minutes() -> u64 {
    240
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_alpha_out_of_range_rejected() {
        let mut config = EngineConfig::default();
        config.strategy.alpha = 0.95;
        assert!(config.validate().is_err());
        assert!(validate_alpha(0.3).is_ok());
        assert!(validate_alpha(0.9).is_ok());
    }

    #[test]
    fn test_ratios_must_sum_to_one() {
        let mut config = EngineConfig::default();
        config.budget.ratios.insert(Component::Buffer, 0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deep_sizes_widen_set() {
        let sizing = SizingConfig::default();
        let shallow = sizing.sizes_for(Street::Flop, false);
        let deep = sizing.sizes_for(Street::Flop, true);
        assert_eq!(shallow, vec![0.33, 0.5, 0.75]);
        assert!(deep.contains(&2.0));
        assert!(deep.len() > shallow.len());
    }

    #[test]
    fn test_estimated_cost() {
        let reasoner = ReasonerConfig {
            name: "a".into(),
            endpoint: "http://localhost/".into(),
            model: "m".into(),
            api_key_env: None,
            timeout_ms: 1000,
            cost_per_1k_tokens: dec!(0.01),
            estimated_tokens: 500,
        };
        assert_eq!(reasoner.estimated_cost(), dec!(0.005));
    }
}
