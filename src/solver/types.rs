//! Solver output types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::types::{ActionDistribution, ActionKind, GameState};

/// Where a solution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolutionSource {
    Cache,
    Heuristic,
    Subgame,
}

/// Frequency and value of one action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionStat {
    pub frequency: f64,
    /// Expected value in big blinds
    pub ev: f64,
    /// Preferred size from the discrete set (bb raise-to preflop, pot fraction postflop)
    #[serde(default)]
    pub size_hint: Option<f64>,
}

impl ActionStat {
    pub fn new(frequency: f64, ev: f64) -> Self {
        Self {
            frequency,
            ev,
            size_hint: None,
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size_hint = Some(size);
        self
    }
}

/// Baseline equilibrium-oriented policy for one state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GtoSolution {
    pub actions: BTreeMap<ActionKind, ActionStat>,
    pub source: SolutionSource,
    pub compute_time_ms: u64,
    /// Hex digest of the state fingerprint
    pub fingerprint: String,
}

impl GtoSolution {
    pub fn new(actions: BTreeMap<ActionKind, ActionStat>, source: SolutionSource) -> Self {
        Self {
            actions,
            source,
            compute_time_ms: 0,
            fingerprint: String::new(),
        }
    }

    pub fn distribution(&self) -> ActionDistribution {
        ActionDistribution::from_pairs(self.actions.iter().map(|(k, s)| (*k, s.frequency)))
    }

    pub fn frequency(&self, kind: ActionKind) -> f64 {
        self.actions.get(&kind).map(|s| s.frequency).unwrap_or_default()
    }

    pub fn size_hint(&self, kind: ActionKind) -> Option<f64> {
        self.actions.get(&kind).and_then(|s| s.size_hint)
    }

    pub fn is_valid(&self) -> bool {
        self.distribution().is_valid()
    }

    /// Re-express the policy over the state's legal-action set
    ///
    /// Illegal actions hand their weight to the closest legal counterpart
    /// (fold↔check, check↔call, bet↔raise, raise→all-in); anything without
    /// a counterpart is dropped and the rest renormalized. Returns None when
    /// no legal mass remains.
    pub fn adapted_to(&self, state: &GameState) -> Option<GtoSolution> {
        let mut actions: BTreeMap<ActionKind, ActionStat> = BTreeMap::new();
        for (kind, stat) in &self.actions {
            if stat.frequency <= 0.0 {
                continue;
            }
            let Some(target) = legal_counterpart(*kind, state) else {
                continue;
            };
            let entry = actions.entry(target).or_insert(ActionStat {
                frequency: 0.0,
                ev: stat.ev,
                size_hint: stat.size_hint,
            });
            // Keep the EV and size of the heaviest contributor
            if stat.frequency > entry.frequency {
                entry.ev = stat.ev;
                entry.size_hint = stat.size_hint.or(entry.size_hint);
            }
            entry.frequency += stat.frequency;
        }

        let total: f64 = actions.values().map(|s| s.frequency.max(0.0)).sum();
        if total <= 0.0 {
            return None;
        }
        for stat in actions.values_mut() {
            stat.frequency = (stat.frequency.max(0.0) / total).clamp(0.0, 1.0);
        }

        Some(GtoSolution {
            actions,
            source: self.source,
            compute_time_ms: self.compute_time_ms,
            fingerprint: self.fingerprint.clone(),
        })
    }
}

fn legal_counterpart(kind: ActionKind, state: &GameState) -> Option<ActionKind> {
    let candidates: &[ActionKind] = match kind {
        ActionKind::Fold => &[ActionKind::Fold, ActionKind::Check],
        ActionKind::Check => &[ActionKind::Check, ActionKind::Fold],
        ActionKind::Call => &[ActionKind::Call, ActionKind::Check, ActionKind::AllIn],
        ActionKind::Bet => &[ActionKind::Bet, ActionKind::Raise, ActionKind::AllIn],
        ActionKind::Raise => &[ActionKind::Raise, ActionKind::Bet, ActionKind::AllIn],
        ActionKind::AllIn => &[ActionKind::AllIn, ActionKind::Raise, ActionKind::Bet],
    };
    candidates.iter().copied().find(|k| state.is_legal(*k))
}

/// Conservative policy served when nothing better is available in time
pub fn default_policy(state: &GameState) -> GtoSolution {
    let mut actions = BTreeMap::new();
    if state.is_legal(ActionKind::Check) {
        actions.insert(ActionKind::Check, ActionStat::new(1.0, 0.0));
    } else {
        actions.insert(ActionKind::Fold, ActionStat::new(0.8, 0.0));
        actions.insert(ActionKind::Call, ActionStat::new(0.2, 0.0));
    }
    let solution = GtoSolution::new(actions, SolutionSource::Cache);
    solution.adapted_to(state).unwrap_or_else(|| {
        // Only reachable with an exotic legal set: uniform over it
        let share = 1.0 / state.legal_actions.len().max(1) as f64;
        GtoSolution::new(
            state
                .legal_actions
                .iter()
                .map(|a| (a.kind, ActionStat::new(share, 0.0)))
                .collect(),
            SolutionSource::Cache,
        )
    })
}
