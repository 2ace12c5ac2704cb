//! Per-decision deadline accounting
//!
//! All arithmetic runs on [`Instant`]; wall-clock time never enters deadline
//! math. A [`DecisionBudget`] is shared between the concurrently running
//! components of one decision, which poll [`DecisionBudget::should_preempt`]
//! instead of being interrupted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::types::BudgetConfig;

/// Named budget slices of one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Perception,
    Gto,
    Agents,
    Strategy,
    Risk,
    Executor,
    Buffer,
}

impl Component {
    pub const ALL: [Component; 7] = [
        Component::Perception,
        Component::Gto,
        Component::Agents,
        Component::Strategy,
        Component::Risk,
        Component::Executor,
        Component::Buffer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Perception => "perception",
            Component::Gto => "gto",
            Component::Agents => "agents",
            Component::Strategy => "strategy",
            Component::Risk => "risk",
            Component::Executor => "executor",
            Component::Buffer => "buffer",
        }
    }
}

/// Millisecond slices for one decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetAllocation {
    pub total_ms: u64,
    pub slices: BTreeMap<Component, u64>,
}

impl BudgetAllocation {
    pub fn get(&self, component: Component) -> u64 {
        self.slices.get(&component).copied().unwrap_or_default()
    }
}

/// Outcome of shifting an overrun onto the donor slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reallocation {
    pub granted_ms: u64,
    pub shortfall_ms: u64,
}

impl Reallocation {
    pub fn is_complete(&self) -> bool {
        self.shortfall_ms == 0
    }
}

/// Process-wide budget issuer
#[derive(Debug, Clone)]
pub struct TimeBudgetTracker {
    config: BudgetConfig,
}

impl TimeBudgetTracker {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    pub fn default_total_ms(&self) -> u64 {
        self.config.total_ms
    }

    /// Split `total_ms` by the ratio table, starting the clock now
    pub fn allocate(&self, total_ms: u64) -> DecisionBudget {
        self.allocate_after_perception(total_ms, Duration::ZERO)
    }

    /// Split `total_ms` when perception has already consumed `perception`
    ///
    /// The clock is backdated by the perception time, and any perception
    /// overrun is immediately charged to the donor slice.
    pub fn allocate_after_perception(&self, total_ms: u64, perception: Duration) -> DecisionBudget {
        let now = Instant::now();
        let allocated_at = now.checked_sub(perception).unwrap_or(now);

        let mut slices = BTreeMap::new();
        let mut assigned = 0u64;
        for component in Component::ALL {
            let ratio = self.config.ratios.get(&component).copied().unwrap_or_default();
            let ms = (total_ms as f64 * ratio).floor() as u64;
            assigned += ms;
            slices.insert(component, ms);
        }
        // Rounding remainder goes to the buffer
        if let Some(buffer) = slices.get_mut(&Component::Buffer) {
            *buffer += total_ms.saturating_sub(assigned);
        }

        let mut finished = HashMap::new();
        finished.insert(Component::Perception, perception);

        let budget = DecisionBudget {
            allocated_at,
            donor: self.config.donor,
            strategy_reserve_ms: self.config.strategy_min_reserve_ms,
            state: Mutex::new(BudgetState {
                allocation: BudgetAllocation { total_ms, slices },
                started: HashMap::new(),
                finished,
            }),
        };

        let perception_ms = perception.as_millis() as u64;
        let perception_slice = budget.allocation().get(Component::Perception);
        if perception_ms > perception_slice {
            let overrun = perception_ms - perception_slice;
            let outcome = budget.reallocate(Component::Perception, overrun);
            if !outcome.is_complete() {
                warn!(
                    overrun_ms = overrun,
                    shortfall_ms = outcome.shortfall_ms,
                    "Perception overrun exceeds donor slice"
                );
            }
        }

        budget
    }
}

#[derive(Debug)]
struct BudgetState {
    allocation: BudgetAllocation,
    started: HashMap<Component, Instant>,
    finished: HashMap<Component, Duration>,
}

/// Live budget of one decision
#[derive(Debug)]
pub struct DecisionBudget {
    allocated_at: Instant,
    donor: Component,
    strategy_reserve_ms: u64,
    state: Mutex<BudgetState>,
}

impl DecisionBudget {
    fn lock(&self) -> MutexGuard<'_, BudgetState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Snapshot of the current slices
    pub fn allocation(&self) -> BudgetAllocation {
        self.lock().allocation.clone()
    }

    pub fn slice(&self, component: Component) -> Duration {
        Duration::from_millis(self.lock().allocation.get(component))
    }

    /// Restart a component's clock at dispatch time
    pub fn begin(&self, component: Component) {
        let mut state = self.lock();
        state.started.insert(component, Instant::now());
        state.finished.remove(&component);
    }

    /// Freeze a component's elapsed time
    pub fn finish(&self, component: Component) {
        let elapsed = self.elapsed(component);
        self.lock().finished.insert(component, elapsed);
    }

    /// Time spent by a component; counted from allocation unless begun later
    pub fn elapsed(&self, component: Component) -> Duration {
        let state = self.lock();
        if let Some(done) = state.finished.get(&component) {
            return *done;
        }
        let start = state.started.get(&component).copied().unwrap_or(self.allocated_at);
        start.elapsed()
    }

    pub fn remaining(&self, component: Component) -> Duration {
        self.slice(component).saturating_sub(self.elapsed(component))
    }

    /// True once the component's remaining time reaches zero
    pub fn should_preempt(&self, component: Component) -> bool {
        self.remaining(component).is_zero()
    }

    /// Instant at which the component's slice runs out
    pub fn deadline(&self, component: Component) -> Instant {
        let state = self.lock();
        let start = state.started.get(&component).copied().unwrap_or(self.allocated_at);
        start + Duration::from_millis(state.allocation.get(component))
    }

    pub fn total_elapsed(&self) -> Duration {
        self.allocated_at.elapsed()
    }

    pub fn total_remaining(&self) -> Duration {
        Duration::from_millis(self.lock().allocation.total_ms).saturating_sub(self.total_elapsed())
    }

    /// Shift `overrun_ms` from the donor slice onto `component`
    ///
    /// The risk slice is never touched and the strategy slice keeps its
    /// minimum reserve. Whatever the donor cannot cover is reported as
    /// shortfall.
    pub fn reallocate(&self, component: Component, overrun_ms: u64) -> Reallocation {
        let donor = self.donor;
        if donor == component || donor == Component::Risk {
            return Reallocation {
                granted_ms: 0,
                shortfall_ms: overrun_ms,
            };
        }

        let mut state = self.lock();
        let donor_slice = state.allocation.get(donor);
        let protected = if donor == Component::Strategy {
            self.strategy_reserve_ms
        } else {
            0
        };
        let available = donor_slice.saturating_sub(protected);
        let granted = overrun_ms.min(available);

        state.allocation.slices.insert(donor, donor_slice - granted);
        *state.allocation.slices.entry(component).or_default() += granted;

        debug!(
            component = component.as_str(),
            donor = donor.as_str(),
            granted_ms = granted,
            "Reallocated budget"
        );

        Reallocation {
            granted_ms: granted,
            shortfall_ms: overrun_ms - granted,
        }
    }

    /// Elapsed milliseconds of every component that has begun or finished
    pub fn timings(&self) -> BTreeMap<Component, u64> {
        let (started, finished): (Vec<Component>, Vec<Component>) = {
            let state = self.lock();
            (
                state.started.keys().copied().collect(),
                state.finished.keys().copied().collect(),
            )
        };
        started
            .into_iter()
            .chain(finished)
            .map(|c| (c, self.elapsed(c).as_millis() as u64))
            .collect()
    }
}
