//! Game-state types shared by every decision-core component

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::errors::{DecisionError, Result};

/// Tolerance for a distribution summing to one
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-3;

/// Betting round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    /// Number of board cards dealt on this street
    pub fn board_cards(&self) -> usize {
        match self {
            Street::Preflop => 0,
            Street::Flop => 3,
            Street::Turn => 4,
            Street::River => 5,
        }
    }
}

impl fmt::Display for Street {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Street::Preflop => write!(f, "preflop"),
            Street::Flop => write!(f, "flop"),
            Street::Turn => write!(f, "turn"),
            Street::River => write!(f, "river"),
        }
    }
}

/// Seat-relative position label (6-max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    Utg,
    Hj,
    Co,
    Btn,
    Sb,
    Bb,
}

impl Position {
    pub const ALL: [Position; 6] = [
        Position::Utg,
        Position::Hj,
        Position::Co,
        Position::Btn,
        Position::Sb,
        Position::Bb,
    ];

    /// Acting order after the flop; higher acts later
    pub fn postflop_order(&self) -> u8 {
        match self {
            Position::Sb => 0,
            Position::Bb => 1,
            Position::Utg => 2,
            Position::Hj => 3,
            Position::Co => 4,
            Position::Btn => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Utg => "UTG",
            Position::Hj => "HJ",
            Position::Co => "CO",
            Position::Btn => "BTN",
            Position::Sb => "SB",
            Position::Bb => "BB",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self> {
        Position::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DecisionError::Validation(format!("Unknown position: {}", s)))
    }
}

/// Card suit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    fn symbol(&self) -> char {
        match self {
            Suit::Clubs => 'c',
            Suit::Diamonds => 'd',
            Suit::Hearts => 'h',
            Suit::Spades => 's',
        }
    }
}

/// A playing card; rank runs 2..=14 (ace high)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl Card {
    pub fn rank_char(rank: u8) -> char {
        match rank {
            14 => 'A',
            13 => 'K',
            12 => 'Q',
            11 => 'J',
            10 => 'T',
            r => char::from(b'0' + r),
        }
    }
}

impl FromStr for Card {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.trim().chars();
        let (Some(r), Some(su), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(DecisionError::Validation(format!("Invalid card: {}", s)));
        };
        let rank = match r.to_ascii_uppercase() {
            'A' => 14,
            'K' => 13,
            'Q' => 12,
            'J' => 11,
            'T' => 10,
            d @ '2'..='9' => d as u8 - b'0',
            _ => return Err(DecisionError::Validation(format!("Invalid rank in {}", s))),
        };
        let suit = match su.to_ascii_lowercase() {
            'c' => Suit::Clubs,
            'd' => Suit::Diamonds,
            'h' => Suit::Hearts,
            's' => Suit::Spades,
            _ => return Err(DecisionError::Validation(format!("Invalid suit in {}", s))),
        };
        Ok(Card { rank, suit })
    }
}

impl TryFrom<String> for Card {
    type Error = DecisionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Card> for String {
    fn from(card: Card) -> Self {
        card.to_string()
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Card::rank_char(self.rank), self.suit.symbol())
    }
}

/// Kind of action; declaration order is the canonical enumeration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    #[serde(alias = "all_in", alias = "all-in")]
    AllIn,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Fold,
        ActionKind::Check,
        ActionKind::Call,
        ActionKind::Bet,
        ActionKind::Raise,
        ActionKind::AllIn,
    ];

    /// Bet and raise carry a size drawn from the discrete size set
    pub fn needs_sizing(&self) -> bool {
        matches!(self, ActionKind::Bet | ActionKind::Raise)
    }

    pub fn is_aggressive(&self) -> bool {
        matches!(self, ActionKind::Bet | ActionKind::Raise | ActionKind::AllIn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Fold => "fold",
            ActionKind::Check => "check",
            ActionKind::Call => "call",
            ActionKind::Bet => "bet",
            ActionKind::Raise => "raise",
            ActionKind::AllIn => "allin",
        }
    }

    /// Single-letter token used in discretized histories
    pub fn token(&self) -> char {
        match self {
            ActionKind::Fold => 'f',
            ActionKind::Check => 'x',
            ActionKind::Call => 'c',
            ActionKind::Bet => 'b',
            ActionKind::Raise => 'r',
            ActionKind::AllIn => 'a',
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match normalized.as_str() {
            "fold" => Ok(ActionKind::Fold),
            "check" => Ok(ActionKind::Check),
            "call" => Ok(ActionKind::Call),
            "bet" => Ok(ActionKind::Bet),
            "raise" => Ok(ActionKind::Raise),
            "allin" | "shove" | "jam" => Ok(ActionKind::AllIn),
            _ => Err(DecisionError::Validation(format!("Unknown action: {}", s))),
        }
    }
}

/// One entry of the legal-action set, with chip bounds for sized actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalAction {
    pub kind: ActionKind,
    /// Minimum total amount (bet size or raise-to) in chips
    #[serde(default)]
    pub min_amount: Option<f64>,
    /// Maximum total amount in chips
    #[serde(default)]
    pub max_amount: Option<f64>,
}

impl LegalAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            min_amount: None,
            max_amount: None,
        }
    }

    pub fn sized(kind: ActionKind, min_amount: f64, max_amount: f64) -> Self {
        Self {
            kind,
            min_amount: Some(min_amount),
            max_amount: Some(max_amount),
        }
    }
}

/// A discretized action from the hand history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub street: Street,
    pub position: Position,
    pub action: ActionKind,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// A seat at the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub position: Position,
    /// Remaining stack in chips
    pub stack: f64,
    #[serde(default = "default_in_hand")]
    pub in_hand: bool,
}

fn default_in_hand() -> bool {
    true
}

/// Immutable snapshot of the table, produced by the external parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub hand_id: String,
    pub session_id: String,
    pub street: Street,
    pub hero: Position,
    pub hole_cards: Vec<Card>,
    pub seats: Vec<Seat>,
    /// Pot in chips, including bets made on the current street
    pub pot: f64,
    pub small_blind: f64,
    pub big_blind: f64,
    #[serde(default)]
    pub board: Vec<Card>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub legal_actions: Vec<LegalAction>,
    /// Chips hero must add to call
    #[serde(default)]
    pub to_call: f64,
    /// Chips hero already committed on this street
    #[serde(default)]
    pub hero_committed: f64,
}

impl GameState {
    /// Structural sanity check on parser output
    pub fn validate(&self) -> Result<()> {
        if self.legal_actions.is_empty() {
            return Err(DecisionError::Validation("empty legal-action set".into()));
        }
        if self.big_blind <= 0.0 {
            return Err(DecisionError::Validation("big blind must be positive".into()));
        }
        if self.hole_cards.len() != 2 {
            return Err(DecisionError::Validation(format!(
                "expected 2 hole cards, got {}",
                self.hole_cards.len()
            )));
        }
        if self.board.len() != self.street.board_cards() {
            return Err(DecisionError::Validation(format!(
                "{} board must have {} cards, got {}",
                self.street,
                self.street.board_cards(),
                self.board.len()
            )));
        }
        if self.hero_seat().is_none() {
            return Err(DecisionError::Validation(format!("no seat for hero {}", self.hero)));
        }
        Ok(())
    }

    pub fn hero_seat(&self) -> Option<&Seat> {
        self.seats.iter().find(|s| s.position == self.hero)
    }

    pub fn hero_stack(&self) -> f64 {
        self.hero_seat().map(|s| s.stack).unwrap_or_default()
    }

    /// Opponents still contesting the pot
    pub fn opponents(&self) -> impl Iterator<Item = &Seat> {
        self.seats
            .iter()
            .filter(move |s| s.in_hand && s.position != self.hero)
    }

    /// Min of hero's stack and the deepest contesting opponent's stack
    pub fn effective_stack(&self) -> f64 {
        let deepest = self
            .opponents()
            .map(|s| s.stack)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));
        match deepest {
            Some(opp) => self.hero_stack().min(opp),
            None => self.hero_stack(),
        }
    }

    pub fn effective_stack_bb(&self) -> f64 {
        self.effective_stack() / self.big_blind
    }

    pub fn pot_bb(&self) -> f64 {
        self.pot / self.big_blind
    }

    pub fn is_legal(&self, kind: ActionKind) -> bool {
        self.legal(kind).is_some()
    }

    pub fn legal(&self, kind: ActionKind) -> Option<&LegalAction> {
        self.legal_actions.iter().find(|a| a.kind == kind)
    }

    /// Legal kinds in the parser's enumeration order
    pub fn legal_kinds(&self) -> Vec<ActionKind> {
        self.legal_actions.iter().map(|a| a.kind).collect()
    }

    /// Hero acts last postflop among players still in the hand
    pub fn hero_in_position(&self) -> bool {
        let hero = self.hero.postflop_order();
        self.opponents().all(|s| s.position.postflop_order() < hero)
    }

    /// Last player to bet or raise preflop
    pub fn preflop_aggressor(&self) -> Option<Position> {
        self.history
            .iter()
            .filter(|h| h.street == Street::Preflop && h.action.is_aggressive())
            .last()
            .map(|h| h.position)
    }

    /// Number of bets/raises made so far on the current street
    pub fn aggression_on_street(&self) -> usize {
        self.history
            .iter()
            .filter(|h| h.street == self.street && h.action.is_aggressive())
            .count()
    }

    /// Index of this decision within the hand
    pub fn action_index(&self) -> usize {
        self.history.len()
    }

    /// Check if legal, otherwise fold, otherwise the first legal action
    pub fn safe_action(&self) -> ActionKind {
        [ActionKind::Check, ActionKind::Fold]
            .into_iter()
            .find(|k| self.is_legal(*k))
            .or_else(|| self.legal_actions.first().map(|a| a.kind))
            .unwrap_or(ActionKind::Fold)
    }
}

/// Action → probability map; iteration follows ActionKind enumeration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionDistribution(BTreeMap<ActionKind, f64>);

impl ActionDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one_hot(kind: ActionKind) -> Self {
        let mut dist = Self::new();
        dist.set(kind, 1.0);
        dist
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (ActionKind, f64)>) -> Self {
        let mut dist = Self::new();
        for (kind, p) in pairs {
            dist.add(kind, p);
        }
        dist
    }

    pub fn get(&self, kind: ActionKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or_default()
    }

    pub fn set(&mut self, kind: ActionKind, p: f64) {
        self.0.insert(kind, p);
    }

    pub fn add(&mut self, kind: ActionKind, p: f64) {
        *self.0.entry(kind).or_default() += p;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, f64)> + '_ {
        self.0.iter().map(|(k, p)| (*k, *p))
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Clamp negatives and NaN to zero, then scale to sum 1.
    /// Returns false when there is no positive mass to normalize.
    pub fn normalize(&mut self) -> bool {
        for p in self.0.values_mut() {
            if !p.is_finite() || *p < 0.0 {
                *p = 0.0;
            }
        }
        let total = self.total();
        if total <= 0.0 {
            return false;
        }
        for p in self.0.values_mut() {
            *p /= total;
        }
        true
    }

    /// Keep only the given kinds, dropping zero entries, and renormalize
    pub fn restricted_to(&self, kinds: &[ActionKind]) -> Self {
        let mut dist = Self::from_pairs(
            self.iter()
                .filter(|(k, p)| kinds.contains(k) && *p > 0.0),
        );
        if !dist.normalize() {
            return Self::new();
        }
        dist
    }

    /// Every probability in [0,1] and the total within tolerance of one
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
            && self.0.values().all(|p| (0.0..=1.0).contains(p))
            && (self.total() - 1.0).abs() <= DISTRIBUTION_TOLERANCE
    }

    /// `alpha × self + (1 − alpha) × other`, per action
    pub fn mix(&self, alpha: f64, other: &ActionDistribution) -> Self {
        let mut out = Self::new();
        for kind in ActionKind::ALL {
            let p = alpha * self.get(kind) + (1.0 - alpha) * other.get(kind);
            if p > 0.0 {
                out.set(kind, p);
            }
        }
        out
    }

    /// Half the L1 distance; 0 for identical, 1 for disjoint support
    pub fn total_variation(&self, other: &ActionDistribution) -> f64 {
        0.5 * ActionKind::ALL
            .iter()
            .map(|k| (self.get(*k) - other.get(*k)).abs())
            .sum::<f64>()
    }

    /// Shannon entropy divided by ln(support_size); 0 when support_size ≤ 1
    pub fn normalized_entropy(&self, support_size: usize) -> f64 {
        if support_size <= 1 {
            return 0.0;
        }
        let h: f64 = self
            .0
            .values()
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        (h / (support_size as f64).ln()).clamp(0.0, 1.0)
    }

    /// Highest-probability action; ties go to the earliest kind in `order`
    pub fn argmax(&self, order: &[ActionKind]) -> Option<ActionKind> {
        let mut best: Option<(ActionKind, f64)> = None;
        for kind in order {
            let p = self.get(*kind);
            match best {
                Some((_, bp)) if p <= bp => {}
                _ if p > 0.0 => best = Some((*kind, p)),
                _ => {}
            }
        }
        best.map(|(k, _)| k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_round_trip_notation() {
        let card: Card = "Td".parse().unwrap();
        assert_eq!(card.rank, 10);
        assert_eq!(card.suit, Suit::Diamonds);
        assert_eq!(card.to_string(), "Td");
        assert!("1x".parse::<Card>().is_err());
        assert!("Asd".parse::<Card>().is_err());
    }

    #[test]
    fn test_action_kind_parsing_is_lenient() {
        assert_eq!("RAISE".parse::<ActionKind>().unwrap(), ActionKind::Raise);
        assert_eq!("all-in".parse::<ActionKind>().unwrap(), ActionKind::AllIn);
        assert!("limp".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_distribution_normalize_and_restrict() {
        let dist = ActionDistribution::from_pairs([
            (ActionKind::Fold, 0.2),
            (ActionKind::Bet, 0.3),
            (ActionKind::Raise, 0.5),
        ]);
        let restricted = dist.restricted_to(&[ActionKind::Fold, ActionKind::Raise]);
        assert!((restricted.get(ActionKind::Raise) - 0.5 / 0.7).abs() < 1e-12);
        assert_eq!(restricted.get(ActionKind::Bet), 0.0);
        assert!(restricted.is_valid());
    }

    #[test]
    fn test_total_variation_bounds() {
        let fold = ActionDistribution::one_hot(ActionKind::Fold);
        let raise = ActionDistribution::one_hot(ActionKind::Raise);
        assert!((fold.total_variation(&raise) - 1.0).abs() < 1e-12);
        assert_eq!(fold.total_variation(&fold), 0.0);
    }

    #[test]
    fn test_argmax_tie_break_follows_order() {
        let dist = ActionDistribution::from_pairs([(ActionKind::Call, 0.5), (ActionKind::Raise, 0.5)]);
        assert_eq!(
            dist.argmax(&[ActionKind::Raise, ActionKind::Call]),
            Some(ActionKind::Raise)
        );
        assert_eq!(
            dist.argmax(&[ActionKind::Call, ActionKind::Raise]),
            Some(ActionKind::Call)
        );
    }

    #[test]
    fn test_normalized_entropy() {
        let uniform = ActionDistribution::from_pairs([(ActionKind::Fold, 0.5), (ActionKind::Call, 0.5)]);
        assert!((uniform.normalized_entropy(2) - 1.0).abs() < 1e-12);
        assert_eq!(ActionDistribution::one_hot(ActionKind::Call).normalized_entropy(3), 0.0);
    }
}
