//! Rule-based postflop policy
//!
//! Equity comes from the made-hand/draw classification; frequencies are
//! shaped by value and check thresholds, texture-keyed continuation bets,
//! pot-odds-gated draws and a position multiplier on every aggressive
//! frequency. EVs are rough chip estimates in big blinds.

use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use super::evaluator::{classify, equity_estimate, texture, BoardTexture, HandClass};
use super::types::{ActionStat, GtoSolution, SolutionSource};
use crate::common::types::{ActionKind, GameState, Street};
use crate::config::types::{SizingConfig, SolverConfig};

/// Inputs the rules are keyed on
#[derive(Debug, Clone, Copy)]
pub struct SpotReading {
    pub class: HandClass,
    pub texture: BoardTexture,
    pub equity: f64,
    pub in_position: bool,
    pub is_aggressor: bool,
    pub deep: bool,
}

impl SpotReading {
    pub fn read(state: &GameState, config: &SolverConfig) -> Self {
        let class = classify(&state.hole_cards, &state.board);
        let opponents = state.opponents().count().max(1);
        Self {
            class,
            texture: texture(&state.board),
            equity: equity_estimate(&class, state.street, opponents),
            in_position: state.hero_in_position(),
            is_aggressor: state.preflop_aggressor() == Some(state.hero),
            deep: state.effective_stack_bb() > config.deep_stack_bb,
        }
    }
}

/// Postflop policy over the legal-action set
///
/// Returns None when `deadline` passes before the rules finish.
pub fn solve(
    state: &GameState,
    config: &SolverConfig,
    sizing: &SizingConfig,
    deadline: Instant,
) -> Option<GtoSolution> {
    let reading = SpotReading::read(state, config);
    if Instant::now() >= deadline {
        debug!("Heuristic preempted after classification");
        return None;
    }

    let sizes = sizing.sizes_for(state.street, reading.deep);
    let multiplier = if reading.in_position {
        config.ip_aggression
    } else {
        config.oop_aggression
    };

    let actions = if state.to_call > 0.0 {
        facing_bet(state, config, &reading, &sizes, multiplier)
    } else {
        first_to_act(state, config, &reading, &sizes, multiplier)
    };
    if Instant::now() >= deadline {
        debug!("Heuristic preempted before legal adaptation");
        return None;
    }

    debug!(
        equity = reading.equity,
        texture = reading.texture.as_str(),
        in_position = reading.in_position,
        "Heuristic frequencies computed"
    );
    GtoSolution::new(actions, SolutionSource::Heuristic).adapted_to(state)
}

/// Size nearest `target` in the street's size set
pub fn nearest_size(sizes: &[f64], target: f64) -> f64 {
    sizes
        .iter()
        .copied()
        .fold(None, |best: Option<f64>, s| match best {
            Some(b) if (b - target).abs() <= (s - target).abs() => Some(b),
            _ => Some(s),
        })
        .unwrap_or(target)
}

fn first_to_act(
    state: &GameState,
    config: &SolverConfig,
    reading: &SpotReading,
    sizes: &[f64],
    multiplier: f64,
) -> BTreeMap<ActionKind, ActionStat> {
    let equity = reading.equity;
    let (base, target_size) = if equity >= config.value_threshold {
        // Stronger hands bet more often and bigger
        let edge = (equity - config.value_threshold) / (1.0 - config.value_threshold).max(1e-9);
        (0.65 + 0.3 * edge, if edge > 0.5 { 1.0 } else { 0.75 })
    } else if reading.is_aggressor && state.street == Street::Flop {
        let cbet = config
            .cbet_frequency
            .get(reading.texture.as_str())
            .copied()
            .unwrap_or(0.5);
        let cbet = if equity < config.check_threshold && !reading.class.draws.any() {
            cbet * 0.7
        } else {
            cbet
        };
        let size = match reading.texture {
            BoardTexture::Dry | BoardTexture::Paired => 0.33,
            BoardTexture::Wet | BoardTexture::Monotone => 0.66,
        };
        (cbet, size)
    } else if reading.class.draws.any() {
        (0.35, 0.66)
    } else if equity < config.check_threshold {
        (0.10, 0.75)
    } else {
        (0.20, 0.5)
    };

    let bet = (base * multiplier).clamp(0.0, 1.0);
    let size = nearest_size(sizes, target_size);
    let pot_bb = state.pot_bb();
    let bet_bb = pot_bb * size;

    let ev_check = equity * pot_bb;
    let ev_bet = equity * (pot_bb + 2.0 * bet_bb) - bet_bb;

    let mut actions = BTreeMap::new();
    actions.insert(ActionKind::Bet, ActionStat::new(bet, ev_bet).with_size(size));
    actions.insert(ActionKind::Check, ActionStat::new(1.0 - bet, ev_check));
    actions
}

fn facing_bet(
    state: &GameState,
    config: &SolverConfig,
    reading: &SpotReading,
    sizes: &[f64],
    multiplier: f64,
) -> BTreeMap<ActionKind, ActionStat> {
    let equity = reading.equity;
    let pot_bb = state.pot_bb();
    let to_call_bb = state.to_call / state.big_blind;
    let pot_odds = to_call_bb / (pot_bb + to_call_bb).max(1e-9);

    let draws_only = reading.class.draws.any() && equity < config.check_threshold;
    let (raise, call) = if equity >= (config.value_threshold + 0.1).min(1.0) {
        let raise = (0.45 * multiplier).clamp(0.0, 1.0);
        (raise, 1.0 - raise)
    } else if equity >= pot_odds {
        // Continue; draws may semi-bluff raise in position
        let raise = if draws_only && reading.in_position {
            (0.15 * multiplier).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (raise, 1.0 - raise)
    } else if equity >= pot_odds - 0.05 {
        // Mix close calls
        (0.0, ((equity - (pot_odds - 0.05)) / 0.05).clamp(0.0, 1.0))
    } else {
        (0.0, 0.0)
    };
    let fold = (1.0 - raise - call).clamp(0.0, 1.0);

    let size = nearest_size(sizes, 0.75);
    let raise_bb = (pot_bb + to_call_bb) * size;
    let ev_call = equity * (pot_bb + to_call_bb) - to_call_bb;
    let ev_raise = equity * (pot_bb + to_call_bb + 2.0 * raise_bb) - (to_call_bb + raise_bb);

    let mut actions = BTreeMap::new();
    actions.insert(ActionKind::Raise, ActionStat::new(raise, ev_raise).with_size(size));
    actions.insert(ActionKind::Call, ActionStat::new(call, ev_call));
    actions.insert(ActionKind::Fold, ActionStat::new(fold, 0.0));
    actions
}
