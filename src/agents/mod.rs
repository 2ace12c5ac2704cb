//! External reasoning agents
//!
//! HTTP clients for the reasoning services, output validation, circuit
//! breakers, cost accounting and the coordinator that fans out to them.

pub mod breaker;
pub mod client;
pub mod cost;
pub mod coordinator;
pub mod messages;
pub mod validation;
pub mod weights;

pub use breaker::{BreakerState, CircuitBreaker};
pub use client::HttpReasoner;
pub use coordinator::{AgentCoordinator, AgentExclusion, AggregatedAgentOutput, ExclusionReason};
pub use messages::{AgentOutput, ReasonerReply, ReasonerRequest, TokenUsage};
pub use weights::{brier_score, AgentWeights, LabeledDecision, MIN_CALIBRATION_SAMPLES};
