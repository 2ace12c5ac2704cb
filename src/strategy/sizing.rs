//! Bet-size quantization
//!
//! Continuous implied sizes are mapped onto the street's discrete size set,
//! converted to chips and snapped to the venue increment. A size whose chip
//! amount falls outside the legal bounds is rejected and the next-nearest
//! size tried; rounding alone never pushes an amount out of bounds.

use serde::Serialize;

use crate::common::types::{ActionKind, GameState, Street};
use crate::config::types::SizingConfig;

const BOUND_EPSILON: f64 = 1e-9;

/// A selected action with its size resolved
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizedAction {
    pub kind: ActionKind,
    /// Member of the street's size set (bet and raise only)
    pub size: Option<f64>,
    /// Street total in chips after the action
    pub amount: Option<f64>,
}

impl SizedAction {
    fn plain(kind: ActionKind, amount: Option<f64>) -> Self {
        Self {
            kind,
            size: None,
            amount,
        }
    }
}

/// Chip amount of a discrete size: bb raise-to preflop, pot fraction postflop
pub fn size_to_chips(kind: ActionKind, size: f64, state: &GameState) -> f64 {
    if state.street == Street::Preflop {
        return size * state.big_blind;
    }
    match kind {
        ActionKind::Raise => {
            state.hero_committed + state.to_call + size * (state.pot + state.to_call)
        }
        _ => state.hero_committed + size * state.pot,
    }
}

/// Legal chip bounds for a sized action, after the optional pot cap
pub fn bounds(kind: ActionKind, state: &GameState, sizing: &SizingConfig) -> Option<(f64, f64)> {
    let legal = state.legal(kind)?;
    let min = legal
        .min_amount
        .unwrap_or(state.hero_committed + state.to_call + state.big_blind);
    let mut max = legal
        .max_amount
        .unwrap_or(state.hero_committed + state.hero_stack());
    if let Some(multiple) = sizing.pot_cap_multiple {
        max = max.min(state.hero_committed + state.to_call + multiple * (state.pot + state.to_call));
    }
    (min <= max + BOUND_EPSILON).then_some((min, max))
}

/// Snap to the increment without leaving `[min, max]`
fn snap(raw: f64, min: f64, max: f64, increment: f64) -> f64 {
    let rounded = (raw / increment).round() * increment;
    let snapped = if rounded < min {
        (min / increment).ceil() * increment
    } else if rounded > max {
        (max / increment).floor() * increment
    } else {
        rounded
    };
    if snapped < min - BOUND_EPSILON || snapped > max + BOUND_EPSILON {
        raw.clamp(min, max)
    } else {
        snapped
    }
}

/// Resolve the amount of `kind`
///
/// `implied` is the continuous size suggested by the inputs, in the street's
/// size units. Returns `None` when no configured size is legal.
pub fn size_action(
    kind: ActionKind,
    implied: Option<f64>,
    state: &GameState,
    sizing: &SizingConfig,
    deep: bool,
) -> Option<SizedAction> {
    match kind {
        ActionKind::Fold | ActionKind::Check => Some(SizedAction::plain(kind, None)),
        ActionKind::Call => Some(SizedAction::plain(
            kind,
            Some(state.hero_committed + state.to_call.min(state.hero_stack())),
        )),
        ActionKind::AllIn => {
            let max = state
                .legal(kind)
                .and_then(|l| l.max_amount)
                .unwrap_or(state.hero_committed + state.hero_stack());
            Some(SizedAction::plain(kind, Some(max)))
        }
        ActionKind::Bet | ActionKind::Raise => {
            let (min, max) = bounds(kind, state, sizing)?;
            let sizes = sizing.sizes_for(state.street, deep);
            let target = implied
                .filter(|t| t.is_finite() && *t > 0.0)
                .or_else(|| sizes.get(sizes.len() / 2).copied())?;

            let mut candidates = sizes.clone();
            candidates.sort_by(|a, b| {
                (a - target)
                    .abs()
                    .total_cmp(&(b - target).abs())
                    .then(a.total_cmp(b))
            });

            candidates.into_iter().find_map(|size| {
                let raw = size_to_chips(kind, size, state);
                if raw < min - BOUND_EPSILON || raw > max + BOUND_EPSILON {
                    return None;
                }
                Some(SizedAction {
                    kind,
                    size: Some(size),
                    amount: Some(snap(raw, min, max, sizing.min_increment)),
                })
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{LegalAction, Position, Seat};

    fn preflop() -> GameState {
        GameState {
            hand_id: "h".into(),
            session_id: "s".into(),
            street: Street::Preflop,
            hero: Position::Btn,
            hole_cards: vec!["Ah".parse().unwrap(), "Kd".parse().unwrap()],
            seats: vec![
                Seat { position: Position::Btn, stack: 100.0, in_hand: true },
                Seat { position: Position::Bb, stack: 100.0, in_hand: true },
            ],
            pot: 1.5,
            small_blind: 0.5,
            big_blind: 1.0,
            board: vec![],
            history: vec![],
            legal_actions: vec![
                LegalAction::new(ActionKind::Fold),
                LegalAction::new(ActionKind::Call),
                LegalAction::sized(ActionKind::Raise, 2.0, 100.0),
            ],
            to_call: 1.0,
            hero_committed: 0.0,
        }
    }

    fn flop_facing_bet() -> GameState {
        let mut state = preflop();
        state.street = Street::Flop;
        state.board = vec!["Kh".parse().unwrap(), "7c".parse().unwrap(), "2d".parse().unwrap()];
        state.pot = 10.0;
        state.to_call = 4.0;
        state.legal_actions = vec![
            LegalAction::new(ActionKind::Fold),
            LegalAction::new(ActionKind::Call),
            LegalAction::sized(ActionKind::Raise, 8.0, 94.0),
        ];
        state
    }

    #[test]
    fn test_preflop_open_nearest_size() {
        let sized = size_action(ActionKind::Raise, Some(2.6), &preflop(), &SizingConfig::default(), false).unwrap();
        assert_eq!(sized.size, Some(2.5));
        assert!((sized.amount.unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_illegal_size_rejected_for_next_nearest() {
        // 0.33 pot raise-to is 4 + 0.33 × 14 = 8.62, which is legal; tighten the min
        let mut state = flop_facing_bet();
        state.legal_actions[2] = LegalAction::sized(ActionKind::Raise, 11.5, 94.0);
        let sized = size_action(ActionKind::Raise, Some(0.33), &state, &SizingConfig::default(), false).unwrap();
        // 0.5 → 4 + 7 = 11 is still below 11.5; 0.75 → 14.5 fits
        assert_eq!(sized.size, Some(0.75));
        assert!((sized.amount.unwrap() - 14.5).abs() < 1e-9);
    }

    #[test]
    fn test_size_is_member_of_street_set() {
        let sizing = SizingConfig::default();
        let state = flop_facing_bet();
        for implied in [0.1, 0.4, 0.6, 3.0] {
            let sized = size_action(ActionKind::Raise, Some(implied), &state, &sizing, false).unwrap();
            assert!(sizing.sizes_for(Street::Flop, false).contains(&sized.size.unwrap()));
            let amount = sized.amount.unwrap();
            assert!((8.0..=94.0).contains(&amount));
        }
    }

    #[test]
    fn test_no_legal_size() {
        let mut state = flop_facing_bet();
        state.legal_actions[2] = LegalAction::sized(ActionKind::Raise, 60.0, 94.0);
        assert_eq!(
            size_action(ActionKind::Raise, Some(0.5), &state, &SizingConfig::default(), false),
            None
        );
    }

    #[test]
    fn test_pot_cap() {
        let sizing = SizingConfig {
            pot_cap_multiple: Some(0.5),
            ..SizingConfig::default()
        };
        let state = flop_facing_bet();
        let (_, max) = bounds(ActionKind::Raise, &state, &sizing).unwrap();
        assert!((max - 11.0).abs() < 1e-9);
        let sized = size_action(ActionKind::Raise, Some(0.75), &state, &sizing, false).unwrap();
        assert_eq!(sized.size, Some(0.5));
    }

    #[test]
    fn test_snap_never_leaves_bounds() {
        assert!((snap(2.004, 2.004, 3.0, 0.01) - 2.01).abs() < 1e-9);
        assert!((snap(2.996, 2.0, 2.996, 0.01) - 2.99).abs() < 1e-9);
        let inside = snap(2.004, 2.001, 2.009, 0.01);
        assert!((2.001..=2.009).contains(&inside));
    }

    #[test]
    fn test_unsized_actions() {
        let state = preflop();
        let call = size_action(ActionKind::Call, None, &state, &SizingConfig::default(), false).unwrap();
        assert_eq!(call.amount, Some(1.0));
        let fold = size_action(ActionKind::Fold, Some(3.0), &state, &SizingConfig::default(), false).unwrap();
        assert_eq!(fold.amount, None);
        assert_eq!(fold.size, None);
    }
}
