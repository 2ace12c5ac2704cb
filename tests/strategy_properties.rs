//! Invariants of the strategy engine over a spread of spots and inputs

mod common;

use common::*;
use holdem_decision_core::agents::AgentOutput;
use holdem_decision_core::config::types::SelectionMode;
use holdem_decision_core::solver::ActionStat;
use holdem_decision_core::strategy::sizing::bounds;
use holdem_decision_core::strategy::{derive_seed, EngineInputs};
use holdem_decision_core::{
    ActionDistribution, ActionKind, AggregatedAgentOutput, EngineConfig, EngineStage, GameState,
    GtoSolution, LegalAction, RiskGuard, SolutionSource, StrategyEngine, Street,
    TimeBudgetTracker,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn flop_facing_bet() -> GameState {
    let mut state = river_state();
    state.hand_id = "hand-0100".to_string();
    state.street = Street::Flop;
    state.board.truncate(3);
    state.pot = 12.0;
    state.to_call = 4.0;
    state.legal_actions = vec![
        LegalAction::new(ActionKind::Fold),
        LegalAction::new(ActionKind::Call),
        LegalAction::sized(ActionKind::Raise, 8.0, 80.0),
        LegalAction::sized(ActionKind::AllIn, 80.0, 80.0),
    ];
    state
}

fn spots() -> Vec<GameState> {
    let mut short = btn_ako_state();
    short.hand_id = "hand-0200".to_string();
    for seat in &mut short.seats {
        seat.stack = 12.0;
    }
    short.legal_actions = vec![
        LegalAction::new(ActionKind::Fold),
        LegalAction::new(ActionKind::Call),
        LegalAction::sized(ActionKind::AllIn, 12.0, 12.0),
    ];
    vec![btn_ako_state(), river_state(), flop_facing_bet(), short]
}

/// Mixed GTO solution over every legal kind of the spot, plus an illegal one
fn mixed_solution(state: &GameState, skew: usize) -> GtoSolution {
    let legal = state.legal_kinds();
    let mut actions = BTreeMap::new();
    for (i, kind) in legal.iter().enumerate() {
        let weight = ((i + skew) % legal.len() + 1) as f64;
        let mut stat = ActionStat::new(weight, 0.0);
        if kind.needs_sizing() {
            stat = stat.with_size(0.6);
        }
        actions.insert(*kind, stat);
    }
    if !state.is_legal(ActionKind::Check) {
        actions.insert(ActionKind::Check, ActionStat::new(5.0, 0.0));
    }
    let total: f64 = actions.values().map(|s| s.frequency).sum();
    for stat in actions.values_mut() {
        stat.frequency /= total;
    }
    GtoSolution::new(actions, SolutionSource::Heuristic)
}

fn agents_for(state: &GameState) -> AggregatedAgentOutput {
    let kind = *state.legal_kinds().last().unwrap();
    let mut agg = AggregatedAgentOutput::empty(Vec::new());
    agg.distribution = ActionDistribution::one_hot(kind);
    agg.consensus = 1.0;
    agg.no_agent = false;
    agg.outputs = vec![AgentOutput {
        agent: "alpha".to_string(),
        model: "alpha-v1".to_string(),
        recommendation: kind,
        sizing: Some(0.75),
        confidence: 0.8,
        rationale: None,
    }];
    agg.weights.insert("alpha".to_string(), 1.0);
    agg
}

fn run(
    engine: &StrategyEngine,
    state: &GameState,
    gto: &GtoSolution,
    agents: Option<&AggregatedAgentOutput>,
) -> holdem_decision_core::DecisionTrace {
    let config = EngineConfig::default();
    let budget = TimeBudgetTracker::new(config.budget.clone()).allocate(config.budget.total_ms);
    let risk = RiskGuard::new(&config.risk);
    engine.decide(
        EngineInputs {
            state,
            gto: Some(gto),
            agents,
        },
        &risk,
        &budget,
    )
}

#[test]
fn test_action_is_always_legal() {
    let config = EngineConfig::default();
    let engine = StrategyEngine::from_config(&config);
    for state in spots() {
        for skew in 0..4 {
            let gto = mixed_solution(&state, skew);
            let agents = agents_for(&state);
            for input in [None, Some(&agents)] {
                let trace = run(&engine, &state, &gto, input);
                assert!(
                    state.is_legal(trace.decision.action),
                    "{} chose illegal {}",
                    state.hand_id,
                    trace.decision.action
                );
                assert_eq!(trace.blended.get(ActionKind::Check) > 0.0, state.is_legal(ActionKind::Check));
            }
        }
    }
}

#[test]
fn test_sizes_come_from_street_set_and_fit_bounds() {
    let config = EngineConfig::default();
    let engine = StrategyEngine::from_config(&config);
    for state in spots() {
        let deep = state.effective_stack_bb() > config.solver.deep_stack_bb;
        let sizes = config.sizing.sizes_for(state.street, deep);
        for skew in 0..4 {
            let decision = run(&engine, &state, &mixed_solution(&state, skew), None).decision;
            match decision.action {
                ActionKind::Bet | ActionKind::Raise => {
                    let size = decision.size.unwrap();
                    assert!(sizes.contains(&size), "{} not in {:?}", size, sizes);
                    let (min, max) = bounds(decision.action, &state, &config.sizing).unwrap();
                    let amount = decision.amount.unwrap();
                    assert!(amount >= min - 1e-9 && amount <= max + 1e-9);
                }
                _ => assert_eq!(decision.size, None),
            }
        }
    }
}

#[test]
fn test_same_inputs_same_decision() {
    let engine = StrategyEngine::from_config(&EngineConfig::default());
    for state in spots() {
        let gto = mixed_solution(&state, 1);
        let agents = agents_for(&state);
        let first = run(&engine, &state, &gto, Some(&agents)).decision;
        let second = run(&engine, &state, &gto, Some(&agents)).decision;
        assert_eq!(first.action, second.action);
        assert_eq!(first.amount, second.amount);
        assert_eq!(first.seed, second.seed);
        assert_eq!(
            first.seed,
            derive_seed(&state.session_id, &state.hand_id, state.street, state.action_index())
        );
    }
}

#[test]
fn test_argmax_mode_picks_most_likely() {
    let mut config = EngineConfig::default();
    config.strategy.selection = SelectionMode::Argmax;
    let engine = StrategyEngine::from_config(&config);
    let state = flop_facing_bet();
    let gto = mixed_solution(&state, 0);
    let trace = run(&engine, &state, &gto, None);

    let best = state
        .legal_kinds()
        .into_iter()
        .max_by(|a, b| trace.blended.get(*a).total_cmp(&trace.blended.get(*b)))
        .unwrap();
    assert_eq!(trace.decision.stage, EngineStage::Finalized);
    assert_eq!(trace.decision.action, best);
}

#[test]
fn test_seeds_differ_per_action() {
    let mut seeds: Vec<u64> = (0..32)
        .map(|i| derive_seed("session-a", "hand-0001", Street::Flop, i))
        .collect();
    seeds.sort_unstable();
    seeds.dedup();
    assert_eq!(seeds.len(), 32);
}
