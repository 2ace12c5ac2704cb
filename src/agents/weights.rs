//! Agent weights and Brier-score calibration

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::common::errors::{DecisionError, Result};
use crate::common::types::{ActionDistribution, ActionKind};

/// Minimum labeled decisions accepted by [`AgentWeights::calibrate`]
pub const MIN_CALIBRATION_SAMPLES: usize = 1000;

/// Non-negative per-agent weights that always sum to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentWeights(BTreeMap<String, f64>);

/// One labeled decision: each agent's forecast and the reference action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledDecision {
    pub predictions: BTreeMap<String, ActionDistribution>,
    pub label: ActionKind,
}

impl AgentWeights {
    /// Names missing from `initial` get an equal share before renormalizing
    pub fn new(names: &[String], initial: &HashMap<String, f64>) -> Self {
        let equal = 1.0 / names.len().max(1) as f64;
        let mut weights = Self(
            names
                .iter()
                .map(|n| (n.clone(), initial.get(n).copied().unwrap_or(equal)))
                .collect(),
        );
        weights.renormalize();
        weights
    }

    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Clamp to non-negative and scale to sum one; uniform if nothing is left
    pub fn renormalize(&mut self) {
        for w in self.0.values_mut() {
            if !w.is_finite() || *w < 0.0 {
                *w = 0.0;
            }
        }
        let total: f64 = self.0.values().sum();
        let n = self.0.len().max(1) as f64;
        for w in self.0.values_mut() {
            *w = if total > 0.0 { *w / total } else { 1.0 / n };
        }
    }

    pub fn set(&mut self, name: &str, weight: f64) {
        self.0.insert(name.to_string(), weight);
        self.renormalize();
    }

    /// Weights restricted to `names`, renormalized over them
    pub fn over(&self, names: &[&str]) -> BTreeMap<String, f64> {
        let mut subset: BTreeMap<String, f64> =
            names.iter().map(|n| (n.to_string(), self.get(n))).collect();
        let total: f64 = subset.values().sum();
        let n = subset.len().max(1) as f64;
        for w in subset.values_mut() {
            *w = if total > 0.0 { *w / total } else { 1.0 / n };
        }
        subset
    }

    /// Recompute weights from mean Brier scores
    ///
    /// Each scored agent's weight is proportional to `2 − B̄`. Agents with no
    /// forecast in the set keep their current share.
    pub fn calibrate(&mut self, samples: &[LabeledDecision]) -> Result<()> {
        if samples.len() < MIN_CALIBRATION_SAMPLES {
            return Err(DecisionError::InsufficientCalibrationData {
                required: MIN_CALIBRATION_SAMPLES,
                actual: samples.len(),
            });
        }

        let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for sample in samples {
            for (agent, forecast) in &sample.predictions {
                if self.0.contains_key(agent) {
                    let entry = totals.entry(agent.as_str()).or_default();
                    entry.0 += brier_score(forecast, sample.label);
                    entry.1 += 1;
                }
            }
        }

        let unscored_mass: f64 = self
            .0
            .iter()
            .filter(|(name, _)| !totals.contains_key(name.as_str()))
            .map(|(_, w)| *w)
            .sum();
        let raw: BTreeMap<String, f64> = totals
            .iter()
            .map(|(name, (sum, n))| (name.to_string(), (2.0 - sum / *n as f64).max(0.0)))
            .collect();
        let raw_total: f64 = raw.values().sum();
        let scored_mass = 1.0 - unscored_mass;

        for (name, r) in &raw {
            let share = if raw_total > 0.0 {
                r / raw_total
            } else {
                1.0 / raw.len() as f64
            };
            self.0.insert(name.clone(), scored_mass * share);
        }
        self.renormalize();
        info!("Calibrated agent weights from {} decisions: {:?}", samples.len(), self.0);
        Ok(())
    }
}

/// Multi-class Brier score in [0, 2]
pub fn brier_score(forecast: &ActionDistribution, label: ActionKind) -> f64 {
    ActionKind::ALL
        .iter()
        .map(|k| {
            let outcome = if *k == label { 1.0 } else { 0.0 };
            (forecast.get(*k) - outcome).powi(2)
        })
        .sum()
}
