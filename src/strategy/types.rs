use serde::Serialize;
use std::collections::BTreeMap;

use crate::agents::AggregatedAgentOutput;
use crate::budget::Component;
use crate::common::types::{ActionDistribution, ActionKind, GameState, Street};
use crate::solver::{GtoSolution, SolutionSource};

/// States of the synthesis state machine
///
/// `AwaitingInputs → Blending → Selecting → RiskChecking → Finalized`, with
/// `Fallback` reachable from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStage {
    AwaitingInputs,
    Blending,
    Selecting,
    RiskChecking,
    Finalized,
    Fallback,
}

/// Why the engine emitted the safe action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Risk guard violation on this decision
    RiskViolation { detail: String },
    /// Risk guard already latched by an earlier violation
    Halted { detail: String },
    /// Strategy slice ran out before selection completed
    Preempted,
    /// Nothing left to sample from after restricting to legal actions
    NoDistribution,
    /// No configured size fits the legal bounds and all-in is not legal
    Unsizable,
    /// The total deadline was spent before synthesis could start
    BudgetExceeded,
    /// The parser handed over a structurally broken state
    InvalidState { detail: String },
}

/// Final output handed to the executor
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyDecision {
    pub hand_id: String,
    pub session_id: String,
    pub street: Street,
    pub action: ActionKind,
    /// Total chips for the action (bet size or raise-to), when it has one
    pub amount: Option<f64>,
    /// Discrete size picked from the street's size set (bet and raise only)
    pub size: Option<f64>,
    /// Blend coefficient actually applied
    pub alpha: f64,
    /// Total-variation distance between GTO and agents, when agents contributed
    pub divergence: Option<f64>,
    pub seed: u64,
    pub seed_version: u8,
    pub stage: EngineStage,
    pub fallback: Option<FallbackReason>,
    /// Elapsed milliseconds per budget component
    pub timings: BTreeMap<Component, u64>,
    pub total_ms: u64,
    /// Human-readable account of how the action was reached
    pub reasoning: Vec<String>,
}

impl StrategyDecision {
    pub fn is_fallback(&self) -> bool {
        self.stage == EngineStage::Fallback
    }
}

/// Audit record emitted when GTO and the agents disagree strongly
#[derive(Debug, Clone, Serialize)]
pub struct DivergenceTrace {
    pub hand_id: String,
    pub session_id: String,
    pub seed: u64,
    pub divergence: f64,
    pub threshold: f64,
    pub gto_source: SolutionSource,
    pub gto: ActionDistribution,
    pub agents: ActionDistribution,
    /// `agent:model` of every contributing reasoner
    pub models: Vec<String>,
    pub state: GameState,
}

/// Everything that went into one decision, for the hand-history logger
#[derive(Debug, Clone, Serialize)]
pub struct DecisionTrace {
    pub decision: StrategyDecision,
    pub state: GameState,
    pub fingerprint: Option<String>,
    pub gto: Option<GtoSolution>,
    pub agents: Option<AggregatedAgentOutput>,
    pub gto_distribution: ActionDistribution,
    pub blended: ActionDistribution,
    pub stages: Vec<EngineStage>,
    pub divergence: Option<DivergenceTrace>,
}
