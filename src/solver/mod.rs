//! Baseline equilibrium-oriented policy
//!
//! Lookup order: exact cache hit, nearest-bucket cache hit, preflop range
//! table, postflop heuristic (refined by the river subgame when time
//! allows). Anything that misses its deadline degrades to the best cached
//! or default policy, tagged `cache`.

pub mod cache;
pub mod evaluator;
pub mod fingerprint;
pub mod heuristic;
pub mod ranges;
pub mod subgame;
pub mod types;

use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::budget::{Component, DecisionBudget};
use crate::common::errors::Result;
use crate::common::types::{ActionKind, GameState, Street};
use crate::config::types::{SizingConfig, SolverConfig};

pub use cache::{CacheMatch, SolutionCache};
pub use fingerprint::{fingerprint, StateFingerprint};
pub use ranges::RangeTable;
pub use types::{default_policy, ActionStat, GtoSolution, SolutionSource};

/// GTO solver with a preloaded preflop cache
#[derive(Debug)]
pub struct GtoSolver {
    config: SolverConfig,
    sizing: SizingConfig,
    cache: SolutionCache,
    ranges: RangeTable,
}

impl GtoSolver {
    /// Build the range table (importing overrides if configured) and preload the cache
    pub fn new(config: SolverConfig, sizing: SizingConfig) -> Result<Self> {
        let ranges = match &config.range_table_path {
            Some(path) => RangeTable::load(path)?,
            None => RangeTable::builtin(),
        };
        let cache = SolutionCache::new(config.fuzzy_radius);
        let preloaded = ranges.preload(&cache, config.deep_stack_bb);
        info!("GTO solver ready with {} preloaded entries", preloaded);

        Ok(Self {
            config,
            sizing,
            cache,
            ranges,
        })
    }

    pub fn cache(&self) -> &SolutionCache {
        &self.cache
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Sizing the solver was built with
    pub fn sizing(&self) -> &SizingConfig {
        &self.sizing
    }

    /// Solve within `budget` measured from now
    pub fn solve(&self, state: &GameState, budget: Duration) -> GtoSolution {
        self.solve_until(state, Instant::now() + budget, &self.sizing)
    }

    /// Solve against the decision's GTO slice
    pub fn solve_with_budget(&self, state: &GameState, budget: &DecisionBudget) -> GtoSolution {
        budget.begin(Component::Gto);
        let solution = self.solve_until(state, budget.deadline(Component::Gto), &self.sizing);
        budget.finish(Component::Gto);
        solution
    }

    /// Solve by `deadline` with the size sets of the current configuration snapshot
    #[instrument(skip(self, state, sizing), fields(hand_id = %state.hand_id, street = %state.street))]
    pub fn solve_until(
        &self,
        state: &GameState,
        deadline: Instant,
        sizing: &SizingConfig,
    ) -> GtoSolution {
        let started = Instant::now();
        let fingerprint = fingerprint(state);
        let digest = fingerprint.digest();

        let mut solution = self
            .from_cache(state, &fingerprint)
            .or_else(|| self.compute(state, &fingerprint, deadline, sizing))
            .unwrap_or_else(|| {
                warn!("No solution before deadline, serving default policy");
                default_policy(state)
            });

        solution.compute_time_ms = started.elapsed().as_millis() as u64;
        solution.fingerprint = digest;
        debug!(
            source = ?solution.source,
            compute_time_ms = solution.compute_time_ms,
            "GTO solution ready"
        );
        solution
    }

    fn from_cache(&self, state: &GameState, fingerprint: &StateFingerprint) -> Option<GtoSolution> {
        let (cached, matched) = self.cache.lookup(fingerprint)?;
        debug!(?matched, "Cache hit");
        let mut adapted = cached.adapted_to(state)?;
        adapted.source = SolutionSource::Cache;
        if state.street == Street::Preflop {
            let size = self.ranges.raise_size_for_state(state, self.config.deep_stack_bb);
            for (kind, stat) in adapted.actions.iter_mut() {
                if matches!(kind, ActionKind::Raise | ActionKind::Bet) && stat.size_hint.is_some() {
                    stat.size_hint = Some(size);
                }
            }
        }
        Some(adapted)
    }

    fn compute(
        &self,
        state: &GameState,
        fingerprint: &StateFingerprint,
        deadline: Instant,
        sizing: &SizingConfig,
    ) -> Option<GtoSolution> {
        if state.street == Street::Preflop {
            let entry = self.ranges.solution_for_state(state, self.config.deep_stack_bb)?;
            self.cache.insert(fingerprint, entry.clone());
            return entry.adapted_to(state);
        }

        if Instant::now() >= deadline {
            return None;
        }
        let solution = heuristic::solve(state, &self.config, sizing, deadline)?;
        Some(self.refine(state, solution, deadline, sizing))
    }

    /// River refinement when no bet is faced and enough time remains
    fn refine(
        &self,
        state: &GameState,
        solution: GtoSolution,
        deadline: Instant,
        sizing: &SizingConfig,
    ) -> GtoSolution {
        if state.street != Street::River || state.to_call > 0.0 {
            return solution;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining < Duration::from_millis(self.config.subgame_min_budget_ms) {
            debug!(?remaining, "Skipping river refinement");
            return solution;
        }
        let Some(aggressive) = [ActionKind::Bet, ActionKind::Raise]
            .into_iter()
            .find(|k| solution.actions.contains_key(k))
        else {
            return solution;
        };
        let passive = if solution.actions.contains_key(&ActionKind::Check) {
            ActionKind::Check
        } else {
            return solution;
        };

        let bet_fraction = solution
            .size_hint(aggressive)
            .unwrap_or_else(|| heuristic::nearest_size(&sizing.river, 0.75));
        let reading = heuristic::SpotReading::read(state, &self.config);
        let Some(result) = subgame::refine_river(
            reading.equity,
            bet_fraction,
            self.config.subgame_iterations,
            deadline,
        ) else {
            return solution;
        };

        let pot_bb = state.pot_bb();
        let mut refined = solution;
        if let Some(stat) = refined.actions.get_mut(&aggressive) {
            stat.frequency = result.bet_frequency;
            stat.ev = result.ev_bet * pot_bb;
        }
        if let Some(stat) = refined.actions.get_mut(&passive) {
            stat.frequency = 1.0 - result.bet_frequency;
            stat.ev = result.ev_check * pot_bb;
        }
        refined.source = SolutionSource::Subgame;
        refined
    }
}
