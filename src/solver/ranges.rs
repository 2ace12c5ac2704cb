//! Preflop range table
//!
//! The built-in table is generated from Chen scores with per-position
//! thresholds and a one-point mixing band below each threshold. A JSON file
//! can override any (context, position, hand class) entry:
//!
//! ```json
//! { "unopened": { "BTN": { "AKo": { "raise": 1.0 } } } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::cache::SolutionCache;
use super::evaluator::chen_score;
use super::fingerprint::{
    bucket, bucket_midpoint, StateFingerprint, FINGERPRINT_VERSION, POT_BUCKETS, STACK_BUCKETS,
};
use super::types::{ActionStat, GtoSolution, SolutionSource};
use crate::common::errors::{DecisionError, Result};
use crate::common::types::{ActionKind, Card, GameState, Position, Street};

/// Effective stack (bb) at or below which aggression means all-in
pub const SHOVE_STACK_BB: f64 = 20.0;

/// Raise already faced before hero acts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflopContext {
    Unopened,
    FacingRaise,
    FacingReraise,
}

impl PreflopContext {
    pub fn of(state: &GameState) -> Self {
        match state.aggression_on_street() {
            0 => PreflopContext::Unopened,
            1 => PreflopContext::FacingRaise,
            _ => PreflopContext::FacingReraise,
        }
    }

    /// Canonical discretized history for a preloaded entry
    fn history(&self) -> &'static str {
        match self {
            PreflopContext::Unopened => "",
            PreflopContext::FacingRaise => "r",
            PreflopContext::FacingReraise => "rr",
        }
    }

    /// Typical pot in bb when hero acts
    fn typical_pot_bb(&self) -> f64 {
        match self {
            PreflopContext::Unopened => 1.5,
            PreflopContext::FacingRaise => 4.0,
            PreflopContext::FacingReraise => 12.5,
        }
    }
}

/// One of the 169 preflop hand classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandKey {
    pub high: u8,
    pub low: u8,
    pub suited: bool,
}

impl HandKey {
    pub fn from_cards(cards: &[Card]) -> Option<Self> {
        match cards {
            [a, b] => Some(Self {
                high: a.rank.max(b.rank),
                low: a.rank.min(b.rank),
                suited: a.rank != b.rank && a.suit == b.suit,
            }),
            _ => None,
        }
    }

    pub fn parse(notation: &str) -> Option<Self> {
        let rank = |c: char| -> Option<u8> {
            match c.to_ascii_uppercase() {
                'A' => Some(14),
                'K' => Some(13),
                'Q' => Some(12),
                'J' => Some(11),
                'T' => Some(10),
                d @ '2'..='9' => Some(d as u8 - b'0'),
                _ => None,
            }
        };
        let chars: Vec<char> = notation.trim().chars().collect();
        let (a, b) = (rank(*chars.first()?)?, rank(*chars.get(1)?)?);
        let suited = match (chars.get(2).copied(), a == b) {
            (None, true) => false,
            (Some('s'), false) => true,
            (Some('o'), false) => false,
            _ => return None,
        };
        Some(Self {
            high: a.max(b),
            low: a.min(b),
            suited,
        })
    }

    pub fn notation(&self) -> String {
        let mut s = String::with_capacity(3);
        s.push(Card::rank_char(self.high));
        s.push(Card::rank_char(self.low));
        if self.high != self.low {
            s.push(if self.suited { 's' } else { 'o' });
        }
        s
    }

    pub fn chen(&self) -> f64 {
        chen_score(self.high, self.low, self.suited)
    }
}

/// All 169 hand classes, strongest ranks first
pub fn all_hand_classes() -> Vec<HandKey> {
    let mut classes = Vec::with_capacity(169);
    for high in (2..=14u8).rev() {
        for low in (2..=high).rev() {
            if high == low {
                classes.push(HandKey { high, low, suited: false });
            } else {
                classes.push(HandKey { high, low, suited: true });
                classes.push(HandKey { high, low, suited: false });
            }
        }
    }
    classes
}

fn open_threshold(position: Position) -> f64 {
    match position {
        Position::Utg => 9.0,
        Position::Hj => 8.0,
        Position::Co => 7.0,
        Position::Btn => 5.0,
        Position::Sb | Position::Bb => 6.0,
    }
}

/// Minimum score to continue against a single raise
fn defend_threshold(position: Position) -> f64 {
    match position {
        Position::Bb => 5.0,
        Position::Btn => 7.0,
        _ => 8.0,
    }
}

type Frequencies = BTreeMap<ActionKind, f64>;

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RangeFile(HashMap<PreflopContext, HashMap<Position, HashMap<String, Frequencies>>>);

/// Preflop frequencies by context, position, and hand class
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    overrides: HashMap<(PreflopContext, Position, HandKey), Frequencies>,
}

impl RangeTable {
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Parse a JSON override file
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RangeFile = serde_json::from_str(json)?;
        let mut overrides = HashMap::new();
        for (context, positions) in file.0 {
            for (position, hands) in positions {
                for (notation, mut freqs) in hands {
                    let key = HandKey::parse(&notation).ok_or_else(|| {
                        DecisionError::Configuration(format!("Invalid hand class: {}", notation))
                    })?;
                    let total: f64 = freqs.values().sum();
                    if freqs.values().any(|f| !f.is_finite() || *f < 0.0) || total <= 0.0 {
                        return Err(DecisionError::Configuration(format!(
                            "Invalid frequencies for {} {} {:?}",
                            position, notation, context
                        )));
                    }
                    freqs.values_mut().for_each(|f| *f /= total);
                    overrides.insert((context, position, key), freqs);
                }
            }
        }
        info!("Loaded {} range table overrides", overrides.len());
        Ok(Self { overrides })
    }

    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DecisionError::Configuration(format!("Cannot read range table {}: {}", path, e))
        })?;
        Self::from_json(&json)
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Frequencies for one spot; imported entries win over the built-in table
    pub fn frequencies(
        &self,
        context: PreflopContext,
        position: Position,
        hand: HandKey,
        stack_bb: f64,
    ) -> Frequencies {
        if let Some(freqs) = self.overrides.get(&(context, position, hand)) {
            return freqs.clone();
        }
        let mut freqs = builtin_frequencies(context, position, hand.chen());
        if stack_bb <= SHOVE_STACK_BB {
            if let Some(raise) = freqs.remove(&ActionKind::Raise) {
                *freqs.entry(ActionKind::AllIn).or_default() += raise;
            }
        }
        freqs
    }

    /// Full solution for a spot, with size hints in bb raise-to
    pub fn solution(
        &self,
        context: PreflopContext,
        position: Position,
        hand: HandKey,
        stack_bb: f64,
        deep: bool,
    ) -> GtoSolution {
        let freqs = self.frequencies(context, position, hand, stack_bb);
        let edge = (hand.chen() - open_threshold(position)) / 10.0;
        let size = raise_size(context, position, deep);

        let actions = freqs
            .into_iter()
            .map(|(kind, frequency)| {
                let stat = match kind {
                    ActionKind::Raise | ActionKind::Bet => {
                        ActionStat::new(frequency, edge).with_size(size)
                    }
                    ActionKind::AllIn => ActionStat::new(frequency, edge),
                    ActionKind::Call => ActionStat::new(frequency, edge / 2.0),
                    _ => ActionStat::new(frequency, 0.0),
                };
                (kind, stat)
            })
            .collect();
        GtoSolution::new(actions, SolutionSource::Cache)
    }

    /// Solution for a live preflop state
    pub fn solution_for_state(&self, state: &GameState, deep_stack_bb: f64) -> Option<GtoSolution> {
        let hand = HandKey::from_cards(&state.hole_cards)?;
        let stack_bb = state.effective_stack_bb();
        Some(self.solution(
            PreflopContext::of(state),
            state.hero,
            hand,
            stack_bb,
            stack_bb > deep_stack_bb,
        ))
    }

    /// Raise-to size (bb) for a live preflop state
    ///
    /// Preloaded entries are built at their bucket's midpoint, so the deep
    /// flag is re-read from the live effective stack.
    pub fn raise_size_for_state(&self, state: &GameState, deep_stack_bb: f64) -> f64 {
        raise_size(
            PreflopContext::of(state),
            state.hero,
            state.effective_stack_bb() > deep_stack_bb,
        )
    }

    /// Insert every position × class × stack bucket × context into the cache
    pub fn preload(&self, cache: &SolutionCache, deep_stack_bb: f64) -> usize {
        let mut count = 0;
        for context in [PreflopContext::Unopened, PreflopContext::FacingRaise] {
            let pot_bucket = bucket(context.typical_pot_bb(), &POT_BUCKETS);
            for position in Position::ALL {
                for hand in all_hand_classes() {
                    for stack_bucket in 0..STACK_BUCKETS.len() as u16 {
                        let stack_bb = bucket_midpoint(stack_bucket, &STACK_BUCKETS);
                        let fingerprint = StateFingerprint {
                            version: FINGERPRINT_VERSION,
                            street: Street::Preflop,
                            position,
                            hand: hand.notation(),
                            stack_bucket,
                            pot_bucket,
                            board: String::new(),
                            history: context.history().to_string(),
                        };
                        let mut solution =
                            self.solution(context, position, hand, stack_bb, stack_bb > deep_stack_bb);
                        solution.fingerprint = fingerprint.digest();
                        cache.insert(&fingerprint, solution);
                        count += 1;
                    }
                }
            }
        }
        debug!(entries = count, "Preloaded preflop cache");
        count
    }
}

fn raise_size(context: PreflopContext, position: Position, deep: bool) -> f64 {
    match (context, deep) {
        (PreflopContext::Unopened, _) if position == Position::Sb => 3.0,
        (PreflopContext::Unopened, _) => 2.5,
        (PreflopContext::FacingRaise, false) => 9.0,
        (PreflopContext::FacingRaise, true) => 12.0,
        (PreflopContext::FacingReraise, false) => 22.0,
        (PreflopContext::FacingReraise, true) => 30.0,
    }
}

fn builtin_frequencies(context: PreflopContext, position: Position, score: f64) -> Frequencies {
    let mut freqs = Frequencies::new();
    match context {
        PreflopContext::Unopened => {
            let threshold = open_threshold(position);
            let raise = if score >= threshold {
                1.0
            } else if score >= threshold - 1.0 {
                0.5
            } else {
                0.0
            };
            freqs.insert(ActionKind::Raise, raise);
            freqs.insert(ActionKind::Fold, 1.0 - raise);
        }
        PreflopContext::FacingRaise => {
            let (raise, call) = if score >= 11.0 {
                (1.0, 0.0)
            } else if score >= 10.0 {
                (0.5, 0.5)
            } else if score >= defend_threshold(position) {
                (0.0, 1.0)
            } else if score >= defend_threshold(position) - 1.0 {
                (0.0, 0.5)
            } else {
                (0.0, 0.0)
            };
            freqs.insert(ActionKind::Raise, raise);
            freqs.insert(ActionKind::Call, call);
            freqs.insert(ActionKind::Fold, 1.0 - raise - call);
        }
        PreflopContext::FacingReraise => {
            let (raise, call) = if score >= 12.0 {
                (1.0, 0.0)
            } else if score >= 10.0 {
                (0.0, 1.0)
            } else {
                (0.0, 0.0)
            };
            freqs.insert(ActionKind::Raise, raise);
            freqs.insert(ActionKind::Call, call);
            freqs.insert(ActionKind::Fold, 1.0 - raise - call);
        }
    }
    freqs.retain(|_, f| *f > 0.0);
    freqs
}
