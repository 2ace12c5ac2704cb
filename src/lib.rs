//! HoldemDecisionCore Library
//!
//! A deadline-bound decision engine for hold'em: a local GTO solver and a
//! set of external reasoning services run concurrently against one time
//! budget, and a strategy engine blends their outputs into a single legal
//! action behind a risk gate.

pub mod agents;
pub mod budget;
pub mod common;
pub mod config;
pub mod core;
pub mod risk;
pub mod solver;
pub mod strategy;

// Re-export commonly used types
pub use agents::{AgentCoordinator, AggregatedAgentOutput, HttpReasoner};
pub use budget::{Component, DecisionBudget, TimeBudgetTracker};
pub use common::channels::{create_health_channel, HealthEvent, HealthSender};
pub use common::errors::{DecisionError, Result};
pub use common::traits::{DecisionSink, Reasoner};
pub use common::types::{
    ActionDistribution, ActionKind, Card, GameState, LegalAction, Position, Seat, Street,
};
pub use config::types::EngineConfig;
pub use config::SharedConfig;
pub use core::{ChannelSink, DecisionCore, TracingSink};
pub use risk::{RiskCheck, RiskGuard, RiskState};
pub use solver::{GtoSolution, GtoSolver, SolutionSource};
pub use strategy::{DecisionTrace, EngineStage, FallbackReason, StrategyDecision, StrategyEngine};
