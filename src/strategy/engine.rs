//! The synthesis state machine
//!
//! `AwaitingInputs → Blending → Selecting → RiskChecking → Finalized`, with
//! `Fallback` reachable from every stage. The safe action is resolved before
//! any other work so a fallback never needs further computation.

use tracing::{debug, info, instrument, warn};

use super::blend::{blend, detect_divergence, effective_alpha};
use super::selection::{derive_seed, select_action, SEED_VERSION};
use super::sizing::{size_action, SizedAction};
use super::types::{DecisionTrace, DivergenceTrace, EngineStage, FallbackReason, StrategyDecision};
use crate::agents::AggregatedAgentOutput;
use crate::budget::{Component, DecisionBudget};
use crate::common::types::{ActionDistribution, ActionKind, GameState};
use crate::config::types::{EngineConfig, SizingConfig, StrategyConfig};
use crate::risk::{RiskCheck, RiskGuard};
use crate::solver::{default_policy, GtoSolution};

/// Inputs gathered for one decision
#[derive(Debug, Clone, Copy)]
pub struct EngineInputs<'a> {
    pub state: &'a GameState,
    /// `None` when the solver produced nothing in its slice
    pub gto: Option<&'a GtoSolution>,
    /// `None` when the coordinator produced nothing in its slice
    pub agents: Option<&'a AggregatedAgentOutput>,
}

#[derive(Debug, Clone)]
pub struct StrategyEngine {
    config: StrategyConfig,
    sizing: SizingConfig,
    deep_stack_bb: f64,
}

/// Bookkeeping of one pass through the state machine
struct Synthesis<'a> {
    inputs: EngineInputs<'a>,
    seed: u64,
    safe: SizedAction,
    stages: Vec<EngineStage>,
    reasoning: Vec<String>,
    alpha: f64,
    divergence: Option<f64>,
    divergence_trace: Option<DivergenceTrace>,
    gto: Option<GtoSolution>,
    gto_distribution: ActionDistribution,
    blended: ActionDistribution,
}

impl<'a> Synthesis<'a> {
    fn enter(&mut self, stage: EngineStage) {
        debug!(?stage, "Strategy stage");
        self.stages.push(stage);
    }

    fn note(&mut self, line: impl Into<String>) {
        self.reasoning.push(line.into());
    }
}

impl StrategyEngine {
    pub fn new(config: StrategyConfig, sizing: SizingConfig, deep_stack_bb: f64) -> Self {
        Self {
            config,
            sizing,
            deep_stack_bb,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.strategy.clone(),
            config.sizing.clone(),
            config.solver.deep_stack_bb,
        )
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn safe_action(&self, state: &GameState) -> SizedAction {
        let kind = state.safe_action();
        size_action(kind, None, state, &self.sizing, false).unwrap_or(SizedAction {
            kind,
            size: None,
            amount: None,
        })
    }

    fn start<'b>(&self, inputs: EngineInputs<'b>) -> Synthesis<'b> {
        let state = inputs.state;
        Synthesis {
            inputs,
            seed: derive_seed(&state.session_id, &state.hand_id, state.street, state.action_index()),
            safe: self.safe_action(state),
            stages: vec![EngineStage::AwaitingInputs],
            reasoning: Vec::new(),
            alpha: self.config.alpha,
            divergence: None,
            divergence_trace: None,
            gto: inputs.gto.cloned(),
            gto_distribution: ActionDistribution::new(),
            blended: ActionDistribution::new(),
        }
    }

    /// Emit the safe action without consulting any input
    pub fn safe_decision(
        &self,
        inputs: EngineInputs<'_>,
        reason: FallbackReason,
        budget: &DecisionBudget,
    ) -> DecisionTrace {
        let synthesis = self.start(inputs);
        self.fallback(synthesis, reason, budget)
    }

    /// Run the state machine once; always yields a legal decision
    #[instrument(skip_all, fields(hand_id = %inputs.state.hand_id, street = %inputs.state.street))]
    pub fn decide(
        &self,
        inputs: EngineInputs<'_>,
        risk: &RiskGuard,
        budget: &DecisionBudget,
    ) -> DecisionTrace {
        budget.begin(Component::Strategy);
        let mut run = self.start(inputs);
        let state = inputs.state;
        let legal = state.legal_kinds();

        // Blending
        run.enter(EngineStage::Blending);
        let gto = match inputs.gto {
            Some(solution) => solution.clone(),
            None => {
                run.note("no GTO solution in budget, using default policy");
                default_policy(state)
            }
        };
        run.gto_distribution = gto.distribution().restricted_to(&legal);

        let usable = inputs.agents.filter(|a| !a.no_agent && !a.is_empty());
        run.alpha = effective_alpha(self.config.alpha, inputs.agents);
        match usable {
            Some(agents) => {
                let (value, trace) =
                    detect_divergence(state, run.seed, &gto, agents, self.config.divergence_threshold);
                run.divergence = Some(value);
                run.divergence_trace = trace;
                run.note(format!(
                    "blended GTO ({:?}) with {} agents at alpha {:.2}, consensus {:.2}, divergence {:.3}",
                    gto.source,
                    agents.outputs.len(),
                    run.alpha,
                    agents.consensus,
                    value
                ));
            }
            None => run.note(format!("no usable agent output, GTO-only ({:?})", gto.source)),
        }
        run.blended = blend(
            &run.gto_distribution,
            usable.map(|a| &a.distribution),
            run.alpha,
            &legal,
        );
        run.gto = Some(gto);
        if run.blended.is_empty() {
            return self.fallback(run, FallbackReason::NoDistribution, budget);
        }

        if budget.should_preempt(Component::Strategy) {
            return self.fallback(run, FallbackReason::Preempted, budget);
        }

        // Selecting
        run.enter(EngineStage::Selecting);
        let Some(kind) = select_action(&run.blended, &legal, run.seed, self.config.selection) else {
            return self.fallback(run, FallbackReason::NoDistribution, budget);
        };
        let implied = self.implied_size(kind, run.gto.as_ref(), usable, run.alpha);
        let deep = state.effective_stack_bb() > self.deep_stack_bb;
        let sized = match size_action(kind, implied, state, &self.sizing, deep) {
            Some(sized) => sized,
            None if state.is_legal(ActionKind::AllIn) && kind != ActionKind::AllIn => {
                run.note(format!("no legal {} size, moving all-in", kind));
                match size_action(ActionKind::AllIn, None, state, &self.sizing, deep) {
                    Some(sized) => sized,
                    None => return self.fallback(run, FallbackReason::Unsizable, budget),
                }
            }
            None => return self.fallback(run, FallbackReason::Unsizable, budget),
        };
        run.note(format!(
            "selected {} (p={:.3}) with seed {}",
            sized.kind,
            run.blended.get(kind),
            run.seed
        ));

        // RiskChecking
        run.enter(EngineStage::RiskChecking);
        if let RiskCheck::Violation { reason } = risk.check() {
            return self.fallback(run, FallbackReason::RiskViolation { detail: reason }, budget);
        }

        run.enter(EngineStage::Finalized);
        self.finish(run, sized, None, budget)
    }

    /// Size suggested by the inputs for `kind`, alpha-weighted when both have one
    fn implied_size(
        &self,
        kind: ActionKind,
        gto: Option<&GtoSolution>,
        agents: Option<&AggregatedAgentOutput>,
        alpha: f64,
    ) -> Option<f64> {
        let gto_hint = gto.and_then(|g| g.size_hint(kind));
        let agent_hint = agents.and_then(|agg| {
            let (sum, weight) = agg
                .outputs
                .iter()
                .filter(|o| o.recommendation == kind)
                .filter_map(|o| {
                    let w = agg.weights.get(&o.agent).copied().unwrap_or_default();
                    o.sizing.map(|s| (s * w, w))
                })
                .fold((0.0, 0.0), |acc, (s, w)| (acc.0 + s, acc.1 + w));
            (weight > 0.0).then(|| sum / weight)
        });
        match (gto_hint, agent_hint) {
            (Some(g), Some(a)) => Some(alpha * g + (1.0 - alpha) * a),
            (g, a) => g.or(a),
        }
    }

    fn fallback(
        &self,
        mut run: Synthesis<'_>,
        reason: FallbackReason,
        budget: &DecisionBudget,
    ) -> DecisionTrace {
        warn!(?reason, action = %run.safe.kind, "Strategy fallback to safe action");
        run.enter(EngineStage::Fallback);
        run.note(format!("fallback to safe action {}", run.safe.kind));
        let safe = run.safe;
        self.finish(run, safe, Some(reason), budget)
    }

    fn finish(
        &self,
        run: Synthesis<'_>,
        action: SizedAction,
        fallback: Option<FallbackReason>,
        budget: &DecisionBudget,
    ) -> DecisionTrace {
        budget.finish(Component::Strategy);
        let state = run.inputs.state;
        let stage = if fallback.is_some() {
            EngineStage::Fallback
        } else {
            EngineStage::Finalized
        };

        let decision = StrategyDecision {
            hand_id: state.hand_id.clone(),
            session_id: state.session_id.clone(),
            street: state.street,
            action: action.kind,
            amount: action.amount,
            size: action.size,
            alpha: run.alpha,
            divergence: run.divergence,
            seed: run.seed,
            seed_version: SEED_VERSION,
            stage,
            fallback,
            timings: budget.timings(),
            total_ms: budget.total_elapsed().as_millis() as u64,
            reasoning: run.reasoning,
        };
        info!(
            action = %decision.action,
            amount = ?decision.amount,
            alpha = decision.alpha,
            stage = ?decision.stage,
            total_ms = decision.total_ms,
            "Decision ready"
        );

        DecisionTrace {
            decision,
            state: state.clone(),
            fingerprint: run.gto.as_ref().map(|g| g.fingerprint.clone()),
            gto: run.gto,
            agents: run.inputs.agents.cloned(),
            gto_distribution: run.gto_distribution,
            blended: run.blended,
            stages: run.stages,
            divergence: run.divergence_trace,
        }
    }
}
