//! Made-hand and draw classification for the heuristic path
//!
//! Hands are evaluated lazily from rank/suit bitmasks. The evaluator only
//! needs hand categories, draws and board texture, never exact showdown
//! order, so kickers are ignored.

use serde::Serialize;

use crate::common::types::{Card, Street, Suit};

/// Pair strength relative to the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStrength {
    /// Pocket pair below every board card
    Under,
    Weak,
    Middle,
    Top,
    /// Pocket pair above every board card
    Over,
}

/// Made-hand category using at least one hole card
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MadeHand {
    HighCard { ace_high: bool },
    Pair(PairStrength),
    TwoPair,
    Trips,
    Straight,
    Flush,
    FullHouse,
    Quads,
    StraightFlush,
}

/// Drawing potential on flop or turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Draws {
    pub flush_draw: bool,
    pub open_ended: bool,
    pub gutshot: bool,
}

impl Draws {
    pub fn any(&self) -> bool {
        self.flush_draw || self.open_ended || self.gutshot
    }

    /// Clean outs to improve to a strong made hand
    pub fn outs(&self) -> u32 {
        let straight = if self.open_ended {
            8
        } else if self.gutshot {
            4
        } else {
            0
        };
        let flush = if self.flush_draw { 9 } else { 0 };
        // Combo draws share roughly two outs
        if flush > 0 && straight > 0 {
            flush + straight - 2
        } else {
            flush + straight
        }
    }

    /// Rule-of-2-and-4 equity from outs alone
    pub fn draw_equity(&self, street: Street) -> f64 {
        let per_out = match street {
            Street::Flop => 0.04,
            Street::Turn => 0.02,
            _ => 0.0,
        };
        (self.outs() as f64 * per_out).min(0.6)
    }
}

/// Coarse board texture class keying c-bet frequencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardTexture {
    Dry,
    Wet,
    Monotone,
    Paired,
}

impl BoardTexture {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardTexture::Dry => "dry",
            BoardTexture::Wet => "wet",
            BoardTexture::Monotone => "monotone",
            BoardTexture::Paired => "paired",
        }
    }
}

/// Classification of hero's holding on a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandClass {
    pub made: MadeHand,
    pub draws: Draws,
}

struct Counts {
    ranks: [u8; 15],
    suits: [u8; 4],
    rank_mask: u16,
}

fn suit_index(suit: Suit) -> usize {
    match suit {
        Suit::Clubs => 0,
        Suit::Diamonds => 1,
        Suit::Hearts => 2,
        Suit::Spades => 3,
    }
}

fn counts(cards: &[Card]) -> Counts {
    let mut c = Counts {
        ranks: [0; 15],
        suits: [0; 4],
        rank_mask: 0,
    };
    for card in cards {
        c.ranks[card.rank as usize] += 1;
        c.suits[suit_index(card.suit)] += 1;
        c.rank_mask |= 1 << card.rank;
    }
    if c.rank_mask & (1 << 14) != 0 {
        c.rank_mask |= 1 << 1;
    }
    c
}

fn has_straight(mask: u16) -> bool {
    (5..=14).any(|high| {
        let window = 0b11111u16 << (high - 4);
        mask & window == window
    })
}

fn category(cards: &[Card]) -> MadeHand {
    let c = counts(cards);

    let flush_suit = (0..4).find(|s| c.suits[*s] >= 5);
    if let Some(s) = flush_suit {
        let suited: Vec<Card> = cards
            .iter()
            .copied()
            .filter(|card| suit_index(card.suit) == s)
            .collect();
        if has_straight(counts(&suited).rank_mask) {
            return MadeHand::StraightFlush;
        }
    }

    let quads = c.ranks.iter().any(|n| *n >= 4);
    let trips = c.ranks.iter().filter(|n| **n == 3).count();
    let pairs = c.ranks.iter().filter(|n| **n == 2).count();

    if quads {
        MadeHand::Quads
    } else if trips >= 2 || (trips == 1 && pairs >= 1) {
        MadeHand::FullHouse
    } else if flush_suit.is_some() {
        MadeHand::Flush
    } else if has_straight(c.rank_mask) {
        MadeHand::Straight
    } else if trips == 1 {
        MadeHand::Trips
    } else if pairs >= 2 {
        MadeHand::TwoPair
    } else if pairs == 1 {
        MadeHand::Pair(PairStrength::Weak)
    } else {
        MadeHand::HighCard {
            ace_high: c.ranks[14] > 0,
        }
    }
}

fn same_kind(a: MadeHand, b: MadeHand) -> bool {
    std::mem::discriminant(&a) == std::mem::discriminant(&b)
}

fn pair_strength(hole: &[Card], board: &[Card]) -> PairStrength {
    let mut board_ranks: Vec<u8> = board.iter().map(|c| c.rank).collect();
    board_ranks.sort_unstable_by(|a, b| b.cmp(a));
    board_ranks.dedup();
    let top = board_ranks.first().copied().unwrap_or_default();
    let second = board_ranks.get(1).copied().unwrap_or_default();
    let bottom = board_ranks.last().copied().unwrap_or_default();

    if hole.len() == 2 && hole[0].rank == hole[1].rank {
        let r = hole[0].rank;
        return if r > top {
            PairStrength::Over
        } else if r < bottom {
            PairStrength::Under
        } else if r > second {
            PairStrength::Middle
        } else {
            PairStrength::Weak
        };
    }

    let paired = hole
        .iter()
        .map(|c| c.rank)
        .filter(|r| board_ranks.contains(r))
        .max()
        .unwrap_or_default();
    if paired == top {
        PairStrength::Top
    } else if paired >= second && paired > 0 {
        PairStrength::Middle
    } else {
        PairStrength::Weak
    }
}

fn draws(hole: &[Card], board: &[Card], made: MadeHand) -> Draws {
    if board.len() >= 5 || board.len() < 3 {
        return Draws::default();
    }
    let all: Vec<Card> = hole.iter().chain(board.iter()).copied().collect();
    let c = counts(&all);
    let b = counts(board);

    let flush_draw = made < MadeHand::Flush
        && (0..4).any(|s| {
            c.suits[s] == 4 && hole.iter().any(|card| suit_index(card.suit) == s)
        });

    let mut out_ranks = 0;
    if made < MadeHand::Straight {
        for r in 2..=14u16 {
            let with = |mask: u16| {
                let mut m = mask | (1 << r);
                if r == 14 {
                    m |= 1 << 1;
                }
                m
            };
            if has_straight(with(c.rank_mask)) && !has_straight(with(b.rank_mask)) {
                out_ranks += 1;
            }
        }
    }

    Draws {
        flush_draw,
        open_ended: out_ranks >= 2,
        gutshot: out_ranks == 1,
    }
}

/// Classify hero's hole cards on a (possibly empty) board
pub fn classify(hole: &[Card], board: &[Card]) -> HandClass {
    let all: Vec<Card> = hole.iter().chain(board.iter()).copied().collect();
    let mut made = category(&all);

    if board.len() >= 3 {
        let board_only = category(board);
        if same_kind(made, board_only) {
            // Playing the board
            made = MadeHand::HighCard {
                ace_high: hole.iter().any(|c| c.rank == 14),
            };
        } else if let MadeHand::Pair(_) = made {
            made = MadeHand::Pair(pair_strength(hole, board));
        }
    }

    HandClass {
        made,
        draws: draws(hole, board, made),
    }
}

/// Classify the board texture
pub fn texture(board: &[Card]) -> BoardTexture {
    let c = counts(board);
    let max_suit = c.suits.iter().copied().max().unwrap_or_default() as usize;
    if board.len() >= 3 && max_suit >= 3 {
        return BoardTexture::Monotone;
    }
    if c.ranks.iter().any(|n| *n >= 2) {
        return BoardTexture::Paired;
    }
    // Connected if any 5-rank window holds three board cards
    let connected = (5..=14).any(|high| {
        let window = 0b11111u16 << (high - 4);
        (c.rank_mask & window).count_ones() >= 3
    });
    if connected || max_suit == 2 {
        BoardTexture::Wet
    } else {
        BoardTexture::Dry
    }
}

/// Rough heads-up equity of a made hand plus draws
fn base_equity(class: &HandClass, street: Street) -> f64 {
    let made = match class.made {
        MadeHand::HighCard { ace_high: false } => 0.15,
        MadeHand::HighCard { ace_high: true } => 0.25,
        MadeHand::Pair(PairStrength::Under) => 0.30,
        MadeHand::Pair(PairStrength::Weak) => 0.36,
        MadeHand::Pair(PairStrength::Middle) => 0.46,
        MadeHand::Pair(PairStrength::Top) => 0.62,
        MadeHand::Pair(PairStrength::Over) => 0.70,
        MadeHand::TwoPair => 0.78,
        MadeHand::Trips => 0.84,
        MadeHand::Straight => 0.88,
        MadeHand::Flush => 0.91,
        MadeHand::FullHouse => 0.96,
        MadeHand::Quads => 0.99,
        MadeHand::StraightFlush => 1.0,
    };
    let draw = class.draws.draw_equity(street);
    // Draw equity only counts on the share of the time we are behind
    made + (1.0 - made) * draw
}

/// Equity estimate against `opponents` contesting players
pub fn equity_estimate(class: &HandClass, street: Street, opponents: usize) -> f64 {
    let heads_up = base_equity(class, street);
    let extra = opponents.saturating_sub(1) as f64;
    heads_up.powf(1.0 + 0.6 * extra).clamp(0.0, 1.0)
}

/// Chen formula score for a preflop hand, in [-1, 20]
pub fn chen_score(high: u8, low: u8, suited: bool) -> f64 {
    let points = |rank: u8| match rank {
        14 => 10.0,
        13 => 8.0,
        12 => 7.0,
        11 => 6.0,
        r => r as f64 / 2.0,
    };
    let (high, low) = if high >= low { (high, low) } else { (low, high) };
    let mut score = points(high);

    if high == low {
        return (score * 2.0).max(5.0);
    }
    if suited {
        score += 2.0;
    }
    let gap = high - low - 1;
    score -= match gap {
        0 => 0.0,
        1 => 1.0,
        2 => 2.0,
        3 => 4.0,
        _ => 5.0,
    };
    if gap <= 1 && high < 12 {
        score += 1.0;
    }
    score.ceil()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(s: &str) -> Vec<Card> {
        s.split_whitespace().map(|c| c.parse().unwrap()).collect()
    }

    #[test]
    fn test_top_pair_and_overpair() {
        let tp = classify(&cards("Ah Kd"), &cards("Kc 7s 2d"));
        assert_eq!(tp.made, MadeHand::Pair(PairStrength::Top));
        let op = classify(&cards("Qh Qd"), &cards("Jc 7s 2d"));
        assert_eq!(op.made, MadeHand::Pair(PairStrength::Over));
    }

    #[test]
    fn test_playing_the_board_is_not_a_pair() {
        let class = classify(&cards("4h 3d"), &cards("Kc Ks 9d"));
        assert!(matches!(class.made, MadeHand::HighCard { .. }));
    }

    #[test]
    fn test_flush_and_straight_draws() {
        let class = classify(&cards("9h 8h"), &cards("7h 6c 2h"));
        assert!(class.draws.flush_draw);
        assert!(class.draws.open_ended);
        assert_eq!(class.draws.outs(), 15);

        let gutter = classify(&cards("9c 8d"), &cards("Jh 7c 2s"));
        assert!(gutter.draws.gutshot);
        assert!(!gutter.draws.open_ended);
    }

    #[test]
    fn test_made_categories() {
        assert_eq!(classify(&cards("Ah 5h"), &cards("Kh 9h 2h")).made, MadeHand::Flush);
        assert_eq!(classify(&cards("Ad 2c"), &cards("3h 4s 5d")).made, MadeHand::Straight);
        assert_eq!(classify(&cards("7d 7c"), &cards("7h Ks Kd")).made, MadeHand::FullHouse);
    }

    #[test]
    fn test_texture_classes() {
        assert_eq!(texture(&cards("Kh 7h 2h")), BoardTexture::Monotone);
        assert_eq!(texture(&cards("Kh Kd 2c")), BoardTexture::Paired);
        assert_eq!(texture(&cards("9h 8d 7c")), BoardTexture::Wet);
        assert_eq!(texture(&cards("Kh 7d 2c")), BoardTexture::Dry);
    }

    #[test]
    fn test_equity_monotone_in_strength() {
        let weak = classify(&cards("4h 3d"), &cards("Kc 9s 8d"));
        let strong = classify(&cards("Kh Kd"), &cards("Kc 9s 2d"));
        assert!(equity_estimate(&strong, Street::Flop, 1) > equity_estimate(&weak, Street::Flop, 1));
        assert!(
            equity_estimate(&strong, Street::Flop, 3) < equity_estimate(&strong, Street::Flop, 1)
        );
    }

    #[test]
    fn test_chen_scores() {
        assert_eq!(chen_score(14, 14, false), 20.0);
        assert_eq!(chen_score(14, 13, false), 10.0);
        assert_eq!(chen_score(14, 13, true), 12.0);
        assert_eq!(chen_score(2, 2, false), 5.0);
        assert_eq!(chen_score(7, 2, false), -1.0);
    }
}
