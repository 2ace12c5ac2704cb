//! Deterministic game-state fingerprints used as cache keys

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::common::types::{ActionKind, Card, GameState, HistoryEntry, Position, Street};

/// Bumped whenever the fingerprint layout changes
pub const FINGERPRINT_VERSION: u8 = 1;

/// Effective-stack bucket lower bounds, in big blinds
pub const STACK_BUCKETS: [f64; 15] = [
    0.0, 10.0, 15.0, 20.0, 25.0, 30.0, 40.0, 50.0, 60.0, 75.0, 100.0, 125.0, 150.0, 200.0, 300.0,
];

/// Pot bucket lower bounds, in big blinds
pub const POT_BUCKETS: [f64; 14] = [
    0.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0, 24.0, 32.0, 48.0, 64.0, 96.0, 128.0,
];

/// Index of the last lower bound not above `value`
pub fn bucket(value: f64, bounds: &[f64]) -> u16 {
    bounds
        .iter()
        .rposition(|b| value >= *b)
        .unwrap_or_default() as u16
}

/// Midpoint of a bucket, used as its representative value
pub fn bucket_midpoint(index: u16, bounds: &[f64]) -> f64 {
    let i = index as usize;
    match (bounds.get(i), bounds.get(i + 1)) {
        (Some(lo), Some(hi)) => (lo + hi) / 2.0,
        (Some(lo), None) => lo * 1.25,
        _ => 0.0,
    }
}

/// 169-class notation: "AA", "AKs", "T9o"
pub fn hand_class(cards: &[Card]) -> String {
    match cards {
        [a, b] => {
            let (hi, lo) = if a.rank >= b.rank { (a, b) } else { (b, a) };
            let mut s = String::with_capacity(3);
            s.push(Card::rank_char(hi.rank));
            s.push(Card::rank_char(lo.rank));
            if hi.rank != lo.rank {
                s.push(if hi.suit == lo.suit { 's' } else { 'o' });
            }
            s
        }
        _ => String::new(),
    }
}

/// Cards sorted by rank (descending) then suit, concatenated
pub fn canonical_cards(cards: &[Card]) -> String {
    let mut sorted = cards.to_vec();
    sorted.sort_by(|a, b| b.rank.cmp(&a.rank).then(a.suit.cmp(&b.suit)));
    sorted.iter().map(|c| c.to_string()).collect()
}

/// Drop folds, map the rest to single letters, separate streets with '/'
pub fn discretize_history(history: &[HistoryEntry]) -> String {
    let mut out = String::new();
    let mut street = Street::Preflop;
    for entry in history {
        while street < entry.street {
            out.push('/');
            street = match street {
                Street::Preflop => Street::Flop,
                Street::Flop => Street::Turn,
                _ => Street::River,
            };
        }
        if entry.action != ActionKind::Fold {
            out.push(entry.action.token());
        }
    }
    out
}

/// Everything in a fingerprint except the stack and pot buckets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CoarseKey {
    pub street: Street,
    pub position: Position,
    pub hand: String,
    pub board: String,
    pub history: String,
}

/// Deterministic digest of a GameState
///
/// Stacks and pot enter only through their buckets, so two states that
/// differ by sub-bucket chip amounts share a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StateFingerprint {
    pub version: u8,
    pub street: Street,
    pub position: Position,
    /// Preflop: hand class. Postflop: canonical hole cards.
    pub hand: String,
    pub stack_bucket: u16,
    pub pot_bucket: u16,
    pub board: String,
    pub history: String,
}

impl StateFingerprint {
    pub fn of(state: &GameState) -> Self {
        let hand = if state.street == Street::Preflop {
            hand_class(&state.hole_cards)
        } else {
            canonical_cards(&state.hole_cards)
        };
        Self {
            version: FINGERPRINT_VERSION,
            street: state.street,
            position: state.hero,
            hand,
            stack_bucket: bucket(state.effective_stack_bb(), &STACK_BUCKETS),
            pot_bucket: bucket(state.pot_bb(), &POT_BUCKETS),
            board: canonical_cards(&state.board),
            history: discretize_history(&state.history),
        }
    }

    pub fn coarse(&self) -> CoarseKey {
        CoarseKey {
            street: self.street,
            position: self.position,
            hand: self.hand.clone(),
            board: self.board.clone(),
            history: self.history.clone(),
        }
    }

    /// Hex SHA-256 over a length-prefixed encoding of every field
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update([self.version]);
        for field in [
            self.street.to_string().as_bytes(),
            self.position.as_str().as_bytes(),
            self.hand.as_bytes(),
            self.board.as_bytes(),
            self.history.as_bytes(),
        ] {
            hasher.update((field.len() as u32).to_le_bytes());
            hasher.update(field);
        }
        hasher.update(self.stack_bucket.to_le_bytes());
        hasher.update(self.pot_bucket.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Bucket distance used by the fuzzy lookup
    pub fn distance(&self, stack_bucket: u16, pot_bucket: u16) -> u16 {
        self.stack_bucket.abs_diff(stack_bucket) + self.pot_bucket.abs_diff(pot_bucket)
    }
}

/// Fingerprint of a state
pub fn fingerprint(state: &GameState) -> StateFingerprint {
    StateFingerprint::of(state)
}
