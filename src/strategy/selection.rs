//! Deterministic action selection
//!
//! Seed, version 1: the first 8 bytes (little endian) of
//! `SHA-256("hdc-seed-v1" 0x00 session 0x00 hand 0x00 street 0x00 action_index)`.
//! The action index makes every decision of a hand draw from its own seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::common::types::{ActionDistribution, ActionKind, Street};
use crate::config::types::SelectionMode;

pub const SEED_VERSION: u8 = 1;
const SEED_DOMAIN: &[u8] = b"hdc-seed-v1";

pub fn derive_seed(session_id: &str, hand_id: &str, street: Street, action_index: usize) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(SEED_DOMAIN);
    for part in [
        session_id.as_bytes(),
        hand_id.as_bytes(),
        street.to_string().as_bytes(),
        action_index.to_string().as_bytes(),
    ] {
        hasher.update([0u8]);
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Inverse-CDF draw over `order`; the same seed and distribution always
/// yield the same action
pub fn sample(dist: &ActionDistribution, order: &[ActionKind], seed: u64) -> Option<ActionKind> {
    let mut rng = StdRng::seed_from_u64(seed);
    let u: f64 = rng.random::<f64>() * dist.total();

    let mut cumulative = 0.0;
    let mut last = None;
    for kind in order {
        let p = dist.get(*kind);
        if p <= 0.0 {
            continue;
        }
        cumulative += p;
        last = Some(*kind);
        if u < cumulative {
            return last;
        }
    }
    // Rounding left u at the top of the range
    last
}

pub fn select_action(
    dist: &ActionDistribution,
    order: &[ActionKind],
    seed: u64,
    mode: SelectionMode,
) -> Option<ActionKind> {
    match mode {
        SelectionMode::Sample => sample(dist, order, seed),
        SelectionMode::Argmax => dist.argmax(order),
    }
}
