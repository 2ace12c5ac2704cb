//! River bet/check refinement by regret matching
//!
//! Abstraction: both players hold one of ten strength buckets drawn
//! uniformly; the higher bucket wins at showdown. Hero checks or bets a
//! fixed fraction of the pot, villain calls or folds. Regrets are floored
//! at zero after every update (CFR+ style) and average strategies are
//! reported. Payoffs are in pot units.

use std::time::Instant;
use tracing::debug;

/// Strength buckets per player
pub const EQUITY_BUCKETS: usize = 10;

const CHECK: usize = 0;
const BET: usize = 1;
const FOLD: usize = 0;
const CALL: usize = 1;

/// Averaged result for hero's actual bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubgameResult {
    pub bet_frequency: f64,
    /// Villain's overall calling frequency against a bet
    pub villain_call_frequency: f64,
    pub ev_check: f64,
    pub ev_bet: f64,
    pub iterations: u32,
}

fn regret_matching(regrets: &[f64; 2]) -> [f64; 2] {
    let positive = regrets[0].max(0.0) + regrets[1].max(0.0);
    if positive > 0.0 {
        [regrets[0].max(0.0) / positive, regrets[1].max(0.0) / positive]
    } else {
        [0.5, 0.5]
    }
}

/// Hero's showdown share: 1 win, 0.5 tie, 0 loss
fn showdown(hero: usize, villain: usize) -> f64 {
    match hero.cmp(&villain) {
        std::cmp::Ordering::Greater => 1.0,
        std::cmp::Ordering::Equal => 0.5,
        std::cmp::Ordering::Less => 0.0,
    }
}

fn called(share: f64, bet: f64) -> f64 {
    share * (1.0 + 2.0 * bet) - bet
}

/// Hero values of (check, bet) in one bucket against a villain strategy
fn hero_values(hero: usize, bet: f64, villain: &[[f64; 2]; EQUITY_BUCKETS]) -> (f64, f64) {
    let n = EQUITY_BUCKETS as f64;
    let mut check = 0.0;
    let mut bet_value = 0.0;
    for (j, strategy) in villain.iter().enumerate() {
        let share = showdown(hero, j);
        check += share / n;
        bet_value += (strategy[FOLD] + strategy[CALL] * called(share, bet)) / n;
    }
    (check, bet_value)
}

fn normalize(sums: &[f64; 2]) -> [f64; 2] {
    let total = sums[0] + sums[1];
    if total > 0.0 {
        [sums[0] / total, sums[1] / total]
    } else {
        [0.5, 0.5]
    }
}

/// Solve the abstract game and read off the strategy for `hero_equity`
///
/// Polls `deadline` before every iteration; returns None if not a single
/// iteration completed.
pub fn refine_river(
    hero_equity: f64,
    bet_fraction: f64,
    iterations: u32,
    deadline: Instant,
) -> Option<SubgameResult> {
    let mut hero_regrets = [[0.0f64; 2]; EQUITY_BUCKETS];
    let mut hero_sum = [[0.0f64; 2]; EQUITY_BUCKETS];
    let mut villain_regrets = [[0.0f64; 2]; EQUITY_BUCKETS];
    let mut villain_sum = [[0.0f64; 2]; EQUITY_BUCKETS];
    let mut done = 0u32;

    for _ in 0..iterations {
        if Instant::now() >= deadline {
            break;
        }
        let hero: Vec<[f64; 2]> = hero_regrets.iter().map(regret_matching).collect();
        let mut villain = [[0.0f64; 2]; EQUITY_BUCKETS];
        for (j, regrets) in villain_regrets.iter().enumerate() {
            villain[j] = regret_matching(regrets);
        }

        for i in 0..EQUITY_BUCKETS {
            let (check, bet) = hero_values(i, bet_fraction, &villain);
            let node = hero[i][CHECK] * check + hero[i][BET] * bet;
            hero_regrets[i][CHECK] = (hero_regrets[i][CHECK] + check - node).max(0.0);
            hero_regrets[i][BET] = (hero_regrets[i][BET] + bet - node).max(0.0);
            hero_sum[i][CHECK] += hero[i][CHECK];
            hero_sum[i][BET] += hero[i][BET];
        }

        // Villain values are weighted by how often each hero bucket bets
        for j in 0..EQUITY_BUCKETS {
            // Folding forfeits the pot: villain's share is zero
            let fold = 0.0;
            let call: f64 = hero
                .iter()
                .enumerate()
                .map(|(i, strategy)| strategy[BET] * called(1.0 - showdown(i, j), bet_fraction))
                .sum();
            let node = villain[j][FOLD] * fold + villain[j][CALL] * call;
            villain_regrets[j][FOLD] = (villain_regrets[j][FOLD] + fold - node).max(0.0);
            villain_regrets[j][CALL] = (villain_regrets[j][CALL] + call - node).max(0.0);
            villain_sum[j][FOLD] += villain[j][FOLD];
            villain_sum[j][CALL] += villain[j][CALL];
        }
        done += 1;
    }

    if done == 0 {
        debug!("River refinement preempted before first iteration");
        return None;
    }

    let bucket = ((hero_equity.clamp(0.0, 1.0) * EQUITY_BUCKETS as f64) as usize)
        .min(EQUITY_BUCKETS - 1);
    let hero_avg = normalize(&hero_sum[bucket]);
    let mut villain_avg = [[0.0f64; 2]; EQUITY_BUCKETS];
    for (j, sums) in villain_sum.iter().enumerate() {
        villain_avg[j] = normalize(sums);
    }
    let call_frequency =
        villain_avg.iter().map(|s| s[CALL]).sum::<f64>() / EQUITY_BUCKETS as f64;
    let (ev_check, ev_bet) = hero_values(bucket, bet_fraction, &villain_avg);

    debug!(
        iterations = done,
        bet_frequency = hero_avg[BET],
        call_frequency,
        "River refinement finished"
    );
    Some(SubgameResult {
        bet_frequency: hero_avg[BET].clamp(0.0, 1.0),
        villain_call_frequency: call_frequency,
        ev_check,
        ev_bet,
        iterations: done,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_nuts_bet_more_than_medium() {
        let nuts = refine_river(0.97, 0.75, 2000, far()).unwrap();
        let medium = refine_river(0.55, 0.75, 2000, far()).unwrap();
        assert_eq!(nuts.iterations, 2000);
        assert!(nuts.bet_frequency > 0.9);
        assert!(nuts.bet_frequency > medium.bet_frequency);
        assert!(nuts.ev_bet >= nuts.ev_check);
    }

    #[test]
    fn test_villain_mixes() {
        let result = refine_river(0.5, 1.0, 2000, far()).unwrap();
        assert!(result.villain_call_frequency > 0.0);
        assert!(result.villain_call_frequency < 1.0);
    }

    #[test]
    fn test_expired_deadline() {
        let past = Instant::now();
        std::thread::sleep(Duration::from_millis(1));
        assert!(refine_river(0.9, 0.75, 100, past).is_none());
    }
}
