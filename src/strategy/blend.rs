//! Blending the GTO baseline with the agents, and divergence detection

use tracing::warn;

use super::types::DivergenceTrace;
use crate::agents::AggregatedAgentOutput;
use crate::common::types::{ActionDistribution, ActionKind, GameState};
use crate::solver::GtoSolution;

/// Log target for divergence audit records
pub const DIVERGENCE_TARGET: &str = "holdem_decision_core::divergence";

/// Alpha to apply: the configured baseline, or 1.0 when no agent output is usable
pub fn effective_alpha(alpha: f64, agents: Option<&AggregatedAgentOutput>) -> f64 {
    match agents {
        Some(agg) if !agg.no_agent && !agg.is_empty() => alpha,
        _ => 1.0,
    }
}

/// `alpha × gto + (1 − alpha) × agents`, restricted to the legal kinds
///
/// Returns an empty distribution only when neither input has mass on a
/// legal action.
pub fn blend(
    gto: &ActionDistribution,
    agents: Option<&ActionDistribution>,
    alpha: f64,
    legal: &[ActionKind],
) -> ActionDistribution {
    let gto_only = gto.restricted_to(legal);
    let Some(agents) = agents.filter(|a| alpha < 1.0 && !a.is_empty()) else {
        return gto_only;
    };

    let blended = gto_only.mix(alpha, &agents.restricted_to(legal)).restricted_to(legal);
    if blended.is_empty() {
        return gto_only;
    }
    blended
}

/// Total-variation distance between the GTO-only and agent-only distributions
pub fn divergence(gto: &ActionDistribution, agents: &ActionDistribution) -> f64 {
    gto.total_variation(agents)
}

/// Build and log a diagnostic trace when divergence exceeds `threshold`
///
/// Logging never blocks the decision; the trace is returned for the sinks.
pub fn detect_divergence(
    state: &GameState,
    seed: u64,
    gto: &GtoSolution,
    agents: &AggregatedAgentOutput,
    threshold: f64,
) -> (f64, Option<DivergenceTrace>) {
    let legal = state.legal_kinds();
    let gto_dist = gto.distribution().restricted_to(&legal);
    let agent_dist = agents.distribution.restricted_to(&legal);
    let value = divergence(&gto_dist, &agent_dist);
    if value <= threshold {
        return (value, None);
    }

    let trace = DivergenceTrace {
        hand_id: state.hand_id.clone(),
        session_id: state.session_id.clone(),
        seed,
        divergence: value,
        threshold,
        gto_source: gto.source,
        gto: gto_dist,
        agents: agent_dist,
        models: agents.models(),
        state: state.clone(),
    };
    match serde_json::to_string(&trace) {
        Ok(json) => warn!(
            target: DIVERGENCE_TARGET,
            divergence = value,
            "{}",
            json
        ),
        Err(e) => warn!(
            target: DIVERGENCE_TARGET,
            divergence = value,
            "Divergence trace not serializable: {}",
            e
        ),
    }
    (value, Some(trace))
}
