//! Fingerprint-keyed solution cache
//!
//! Populated once at startup and read-mostly afterwards. Lookups take a
//! read lock only; inserts made between decisions take the write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::fingerprint::{CoarseKey, StateFingerprint};
use super::types::GtoSolution;

/// How a cached entry was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMatch {
    Exact,
    /// Nearest stack/pot bucket at the given distance
    Fuzzy(u16),
}

#[derive(Debug, Default)]
struct CacheInner {
    exact: HashMap<String, GtoSolution>,
    /// Entries grouped by everything but the stack/pot buckets, in insertion order
    coarse: HashMap<CoarseKey, Vec<(u16, u16, String)>>,
}

/// Solution cache with exact and nearest-bucket lookups
#[derive(Debug)]
pub struct SolutionCache {
    inner: RwLock<CacheInner>,
    fuzzy_radius: u16,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SolutionCache {
    pub fn new(fuzzy_radius: u16) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            fuzzy_radius,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, fingerprint: &StateFingerprint, solution: GtoSolution) {
        let digest = fingerprint.digest();
        let mut inner = self.write();
        if inner.exact.insert(digest.clone(), solution).is_none() {
            inner.coarse.entry(fingerprint.coarse()).or_default().push((
                fingerprint.stack_bucket,
                fingerprint.pot_bucket,
                digest,
            ));
        }
    }

    /// Exact match, then the nearest bucket within the fuzzy radius
    ///
    /// Among equally near entries the earliest inserted wins.
    pub fn lookup(&self, fingerprint: &StateFingerprint) -> Option<(GtoSolution, CacheMatch)> {
        let inner = self.read();
        let digest = fingerprint.digest();

        if let Some(solution) = inner.exact.get(&digest) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some((solution.clone(), CacheMatch::Exact));
        }

        let nearest = inner.coarse.get(&fingerprint.coarse()).and_then(|candidates| {
            candidates
                .iter()
                .map(|(stack, pot, digest)| (fingerprint.distance(*stack, *pot), digest))
                .filter(|(d, _)| *d <= self.fuzzy_radius)
                .fold(None, |best: Option<(u16, &String)>, cand| match best {
                    Some(b) if b.0 <= cand.0 => Some(b),
                    _ => Some(cand),
                })
        });

        match nearest.and_then(|(d, key)| inner.exact.get(key).map(|s| (s.clone(), d))) {
            Some((solution, distance)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(distance, "Fuzzy cache hit");
                Some((solution, CacheMatch::Fuzzy(distance)))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ActionKind, Position, Street};
    use crate::solver::types::{ActionStat, SolutionSource};
    use std::collections::BTreeMap;

    fn fp(stack_bucket: u16, pot_bucket: u16) -> StateFingerprint {
        StateFingerprint {
            version: 1,
            street: Street::Preflop,
            position: Position::Btn,
            hand: "AKo".into(),
            stack_bucket,
            pot_bucket,
            board: String::new(),
            history: String::new(),
        }
    }

    fn solution(raise: f64) -> GtoSolution {
        GtoSolution::new(
            BTreeMap::from([
                (ActionKind::Raise, ActionStat::new(raise, 1.0)),
                (ActionKind::Fold, ActionStat::new(1.0 - raise, 0.0)),
            ]),
            SolutionSource::Cache,
        )
    }

    #[test]
    fn test_exact_hit() {
        let cache = SolutionCache::new(2);
        cache.insert(&fp(10, 1), solution(1.0));
        let (found, matched) = cache.lookup(&fp(10, 1)).unwrap();
        assert_eq!(matched, CacheMatch::Exact);
        assert_eq!(found.frequency(ActionKind::Raise), 1.0);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_fuzzy_prefers_nearest_then_earliest() {
        let cache = SolutionCache::new(2);
        cache.insert(&fp(8, 1), solution(0.2));
        cache.insert(&fp(11, 1), solution(0.6));
        cache.insert(&fp(9, 1), solution(0.4));

        // 10 is one away from both 9 and 11; 11 was inserted first
        let (found, matched) = cache.lookup(&fp(10, 1)).unwrap();
        assert_eq!(matched, CacheMatch::Fuzzy(1));
        assert_eq!(found.frequency(ActionKind::Raise), 0.6);
    }

    #[test]
    fn test_outside_radius_is_miss() {
        let cache = SolutionCache::new(1);
        cache.insert(&fp(5, 1), solution(1.0));
        assert!(cache.lookup(&fp(10, 1)).is_none());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hit_rate(), 0.0);
    }
}
