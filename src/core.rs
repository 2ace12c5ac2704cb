//! One decision end to end
//!
//! Budget → concurrent GTO solve and agent fan-out → strategy engine →
//! risk gate → sinks. Decisions of one core are serialized so risk and
//! weight state only ever see one writer.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::agents::{AgentCoordinator, AggregatedAgentOutput};
use crate::budget::{Component, DecisionBudget, TimeBudgetTracker};
use crate::common::channels::HealthSender;
use crate::common::errors::{DecisionError, Result};
use crate::common::traits::DecisionSink;
use crate::common::types::GameState;
use crate::config::{EngineConfig, SharedConfig};
use crate::risk::RiskGuard;
use crate::solver::{GtoSolution, GtoSolver};
use crate::strategy::{DecisionTrace, EngineInputs, FallbackReason, StrategyDecision, StrategyEngine};

/// Slack granted to the blocking solver task past its own deadline
const GTO_JOIN_GRACE: Duration = Duration::from_millis(5);

/// Logs every decision trace at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DecisionSink for TracingSink {
    fn record(&self, trace: &DecisionTrace) {
        match serde_json::to_string(trace) {
            Ok(json) => debug!(target: "holdem_decision_core::trace", "{}", json),
            Err(e) => warn!("Decision trace not serializable: {}", e),
        }
    }
}

/// Forwards traces to a bounded channel; drops them when the consumer lags
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DecisionTrace>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<DecisionTrace>) -> Self {
        Self { tx }
    }
}

impl DecisionSink for ChannelSink {
    fn record(&self, trace: &DecisionTrace) {
        if let Err(e) = self.tx.try_send(trace.clone()) {
            warn!("Dropping decision trace: {}", e);
        }
    }
}

/// The decision core: owns the solver, the agents and the risk guard
pub struct DecisionCore {
    config: SharedConfig,
    solver: Arc<GtoSolver>,
    agents: AgentCoordinator,
    risk: RiskGuard,
    sinks: Vec<Arc<dyn DecisionSink>>,
    applied: Mutex<Option<Arc<EngineConfig>>>,
    session: tokio::sync::Mutex<()>,
}

impl DecisionCore {
    /// Solver settings and the preflop cache are built once here; sizing
    /// and every other section follow each new snapshot.
    pub fn new(config: SharedConfig, agents: AgentCoordinator, risk: RiskGuard) -> Result<Self> {
        let snapshot = config.snapshot();
        let solver = GtoSolver::new(snapshot.solver.clone(), snapshot.sizing.clone())?;
        info!(
            cached = solver.cache().len(),
            agents = agents.agent_names().len(),
            "Decision core ready"
        );
        Ok(Self {
            config,
            solver: Arc::new(solver),
            agents,
            risk,
            sinks: vec![Arc::new(TracingSink)],
            applied: Mutex::new(None),
            session: tokio::sync::Mutex::new(()),
        })
    }

    /// HTTP reasoners for every configured endpoint
    pub fn from_config(config: SharedConfig, health: Option<HealthSender>) -> Result<Self> {
        let snapshot = config.snapshot();
        let mut agents = AgentCoordinator::from_config(&snapshot.agents)?;
        let mut risk = RiskGuard::new(&snapshot.risk);
        if let Some(tx) = health {
            agents = agents.with_health(tx.clone());
            risk = risk.with_health(tx);
        }
        Self::new(config, agents, risk)
    }

    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn solver(&self) -> &GtoSolver {
        &self.solver
    }

    pub fn agents(&self) -> &AgentCoordinator {
        &self.agents
    }

    pub fn risk(&self) -> &RiskGuard {
        &self.risk
    }

    /// Record a finished hand's result with the risk guard
    pub fn record_outcome(&self, hand_id: &str, net: rust_decimal::Decimal) -> Result<()> {
        self.risk.record_outcome(hand_id, net)
    }

    /// Session boundary: clears risk totals and agent cost accounting
    pub async fn reset_session(&self) {
        let _session = self.session.lock().await;
        self.risk.reset_session();
        self.agents.reset_session();
    }

    /// Push a new snapshot into the stateful components, once per snapshot
    fn apply_snapshot(&self, snapshot: &Arc<EngineConfig>) {
        let mut applied = match self.applied.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if applied.as_ref().is_some_and(|a| Arc::ptr_eq(a, snapshot)) {
            return;
        }
        self.agents.apply_config(&snapshot.agents);
        self.risk.apply_config(&snapshot.risk);
        *applied = Some(snapshot.clone());
        debug!("Applied configuration snapshot");
    }

    pub async fn decide(&self, state: &GameState) -> StrategyDecision {
        self.decide_traced(state, Duration::ZERO).await.decision
    }

    /// Run one decision; `perception` is time already spent upstream
    ///
    /// Never fails: every error resolves to a fallback decision.
    #[instrument(skip_all, fields(hand_id = %state.hand_id, street = %state.street))]
    pub async fn decide_traced(&self, state: &GameState, perception: Duration) -> DecisionTrace {
        let _session = self.session.lock().await;
        let snapshot = self.config.snapshot();
        self.apply_snapshot(&snapshot);

        let tracker = TimeBudgetTracker::new(snapshot.budget.clone());
        let budget = tracker.allocate_after_perception(snapshot.budget.total_ms, perception);
        let engine = StrategyEngine::from_config(&snapshot);
        let bare = EngineInputs {
            state,
            gto: None,
            agents: None,
        };

        if let Err(e) = state.validate() {
            warn!("Rejecting game state: {}", e);
            let trace = engine.safe_decision(
                bare,
                FallbackReason::InvalidState {
                    detail: e.to_string(),
                },
                &budget,
            );
            return self.emit(trace);
        }
        if let Some(reason) = self.risk.halt_reason() {
            let trace = engine.safe_decision(bare, FallbackReason::Halted { detail: reason }, &budget);
            return self.emit(trace);
        }

        let (gto, agents) = tokio::join!(
            self.run_gto(state, &snapshot, &budget),
            self.run_agents(state, &budget)
        );

        if budget.total_remaining().is_zero() {
            let trace = engine.safe_decision(
                EngineInputs {
                    state,
                    gto: gto.as_ref(),
                    agents: agents.as_ref(),
                },
                FallbackReason::BudgetExceeded,
                &budget,
            );
            return self.emit(trace);
        }

        let inputs = EngineInputs {
            state,
            gto: gto.as_ref(),
            agents: agents.as_ref(),
        };
        let trace = engine.decide(inputs, &self.risk, &budget);
        self.emit(trace)
    }

    async fn run_gto(
        &self,
        state: &GameState,
        snapshot: &EngineConfig,
        budget: &DecisionBudget,
    ) -> Option<GtoSolution> {
        budget.begin(Component::Gto);
        let deadline = budget.deadline(Component::Gto);
        let solver = self.solver.clone();
        let owned = state.clone();
        let sizing = snapshot.sizing.clone();
        let handle =
            tokio::task::spawn_blocking(move || solver.solve_until(&owned, deadline, &sizing));

        let wait_until = tokio::time::Instant::from_std(deadline) + GTO_JOIN_GRACE;
        let result = tokio::time::timeout_at(wait_until, handle).await;
        budget.finish(Component::Gto);
        settle_overrun(budget, Component::Gto);

        match result {
            Ok(Ok(solution)) => Some(solution),
            Ok(Err(e)) => {
                error!("GTO task failed: {}", e);
                None
            }
            Err(_) => {
                warn!("{}", DecisionError::Timeout("GTO solver missed its slice".into()));
                None
            }
        }
    }

    async fn run_agents(&self, state: &GameState, budget: &DecisionBudget) -> Option<AggregatedAgentOutput> {
        budget.begin(Component::Agents);
        let slice = budget.slice(Component::Agents);
        let aggregated = self.agents.query(state, slice).await;
        budget.finish(Component::Agents);
        settle_overrun(budget, Component::Agents);
        if aggregated.all_tripped {
            warn!("{}", DecisionError::AllAgentsUnavailable);
        }
        Some(aggregated)
    }

    fn emit(&self, trace: DecisionTrace) -> DecisionTrace {
        for sink in &self.sinks {
            sink.record(&trace);
        }
        trace
    }
}

/// Charge a component's overrun to the donor slice
fn settle_overrun(budget: &DecisionBudget, component: Component) {
    let elapsed = budget.elapsed(component).as_millis() as u64;
    let slice = budget.slice(component).as_millis() as u64;
    if elapsed <= slice {
        return;
    }
    let realloc = budget.reallocate(component, elapsed - slice);
    if !realloc.is_complete() {
        warn!(
            "{}",
            DecisionError::BudgetExceeded {
                component: component.as_str().to_string(),
                overrun_ms: realloc.shortfall_ms,
            }
        );
    }
}
