//! Strategy engine: the single synthesis point of a decision
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐
//! │  GtoSolver   │   │  AgentCoordinator  │     (concurrent, own slices)
//! └──────┬───────┘   └─────────┬──────────┘
//!        │ GtoSolution         │ AggregatedAgentOutput
//!        ▼                     ▼
//! ┌─────────────────────────────────────────┐
//! │  StrategyEngine                         │
//! │    Blending   alpha × GTO + (1−alpha) × agents
//! │    Selecting  seeded sample + size quantization
//! │    RiskChecking                         │
//! │    Finalized | Fallback (safe action)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`blend`]: blending and divergence detection
//! - [`selection`]: seed derivation, sampling and argmax tie-break
//! - [`sizing`]: discrete bet-size quantization
//! - [`StrategyEngine`]: the state machine itself

pub mod blend;
pub mod engine;
pub mod selection;
pub mod sizing;
pub mod types;

pub use engine::{EngineInputs, StrategyEngine};
pub use selection::{derive_seed, select_action, SEED_VERSION};
pub use sizing::{size_action, SizedAction};
pub use types::{DecisionTrace, DivergenceTrace, EngineStage, FallbackReason, StrategyDecision};
