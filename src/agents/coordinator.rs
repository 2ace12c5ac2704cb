//! Parallel reasoner fan-out
//!
//! Every admitted reasoner runs in its own task with its own timeout,
//! started at its own dispatch. A collector bounded by the coordinator's
//! deadline gathers whatever finished; anything still running is aborted
//! and its late reply never merged.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::breaker::{BreakerState, CircuitBreaker, Transition};
use super::client::HttpReasoner;
use super::cost::{CostLedger, CostRefusal};
use super::messages::{AgentOutput, ReasonerReply, ReasonerRequest, TokenUsage};
use super::validation::validate_output;
use super::weights::{AgentWeights, LabeledDecision};
use crate::common::channels::{publish, HealthEvent, HealthSender};
use crate::common::errors::{DecisionError, Result};
use crate::common::traits::Reasoner;
use crate::common::types::{ActionDistribution, GameState};
use crate::config::types::{AgentsConfig, ReasonerConfig};

/// Why an agent contributed nothing to a decision
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    CircuitOpen,
    SessionCostCeiling,
    PerHandCostCap,
    Timeout,
    HttpStatus { status: u16 },
    Transport { message: String },
    MalformedOutput { message: String },
    InvalidOutput { message: String },
    Failed { message: String },
}

impl ExclusionReason {
    fn from_error(error: &DecisionError) -> Self {
        match error {
            DecisionError::Timeout(_) => ExclusionReason::Timeout,
            DecisionError::AgentStatus { status, .. } => ExclusionReason::HttpStatus { status: *status },
            DecisionError::HttpRequest(e) if e.is_timeout() => ExclusionReason::Timeout,
            DecisionError::HttpRequest(e) => ExclusionReason::Transport { message: e.to_string() },
            DecisionError::JsonParse(e) => ExclusionReason::MalformedOutput { message: e.to_string() },
            DecisionError::Validation(m) => ExclusionReason::InvalidOutput { message: m.clone() },
            other => ExclusionReason::Failed { message: other.to_string() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentExclusion {
    pub agent: String,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

/// Weighted combination of the valid agent outputs of one decision
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedAgentOutput {
    pub distribution: ActionDistribution,
    /// 1 − normalized entropy: 1 when unanimous
    pub consensus: f64,
    /// Normalized entropy: 0 when unanimous, 1 when maximally split
    pub dispersion: f64,
    pub outputs: Vec<AgentOutput>,
    /// Effective weights applied, by agent
    pub weights: BTreeMap<String, f64>,
    pub excluded: Vec<AgentExclusion>,
    /// No usable output; blending must run GTO-only
    pub no_agent: bool,
    /// Every breaker is open
    pub all_tripped: bool,
    pub cost: Decimal,
    pub elapsed_ms: u64,
}

impl AggregatedAgentOutput {
    pub fn empty(excluded: Vec<AgentExclusion>) -> Self {
        Self {
            distribution: ActionDistribution::new(),
            consensus: 0.0,
            dispersion: 0.0,
            outputs: Vec::new(),
            weights: BTreeMap::new(),
            excluded,
            no_agent: true,
            all_tripped: false,
            cost: Decimal::ZERO,
            elapsed_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.distribution.is_empty()
    }

    /// `agent:model` identifiers of the contributing outputs
    pub fn models(&self) -> Vec<String> {
        self.outputs
            .iter()
            .map(|o| format!("{}:{}", o.agent, o.model))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Settings {
    failure_threshold: u32,
    cooldown: Option<Duration>,
    backoff_base: Duration,
    backoff_cap: Duration,
    min_retry_window: Duration,
}

impl From<&AgentsConfig> for Settings {
    fn from(config: &AgentsConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            cooldown: config.breaker_cooldown_ms.map(Duration::from_millis),
            backoff_base: Duration::from_millis(config.retry_backoff_base_ms),
            backoff_cap: Duration::from_millis(config.retry_backoff_cap_ms),
            min_retry_window: Duration::from_millis(config.min_retry_window_ms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    enabled: bool,
    base: Duration,
    cap: Duration,
    min_window: Duration,
    deadline: Instant,
}

impl RetryPolicy {
    /// Capped exponential backoff before retry number `retry` (0-based)
    fn backoff(&self, retry: u32) -> Duration {
        self.base.saturating_mul(1u32 << retry.min(16)).min(self.cap)
    }
}

struct AgentRun {
    agent: String,
    result: Result<ReasonerReply>,
    /// Usage reported by each dispatched attempt
    attempts: Vec<Option<TokenUsage>>,
}

struct AgentSlot {
    reasoner: Arc<dyn Reasoner>,
    config: ReasonerConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Queries the configured reasoners and aggregates their outputs
///
/// The reasoner list is fixed at construction; hot reload only touches
/// thresholds, backoff and cost limits.
pub struct AgentCoordinator {
    agents: Vec<AgentSlot>,
    settings: RwLock<Settings>,
    breakers: Mutex<BTreeMap<String, CircuitBreaker>>,
    ledger: Mutex<CostLedger>,
    weights: RwLock<AgentWeights>,
    health: Option<HealthSender>,
    all_down_reported: AtomicBool,
}

impl AgentCoordinator {
    /// Pair each reasoner with its configuration entry by name
    pub fn new(config: &AgentsConfig, reasoners: Vec<Arc<dyn Reasoner>>) -> Result<Self> {
        let mut agents = Vec::with_capacity(reasoners.len());
        for reasoner in reasoners {
            let entry = config
                .reasoners
                .iter()
                .find(|r| r.name == reasoner.name())
                .cloned()
                .ok_or_else(|| {
                    DecisionError::Configuration(format!(
                        "No configuration for reasoner {}",
                        reasoner.name()
                    ))
                })?;
            agents.push(AgentSlot {
                reasoner,
                config: entry,
            });
        }

        let settings = Settings::from(config);
        let names: Vec<String> = agents.iter().map(|a| a.config.name.clone()).collect();
        let breakers = names
            .iter()
            .map(|n| {
                (
                    n.clone(),
                    CircuitBreaker::new(settings.failure_threshold, settings.cooldown),
                )
            })
            .collect();

        info!("Agent coordinator ready with {} reasoners", agents.len());
        Ok(Self {
            agents,
            breakers: Mutex::new(breakers),
            ledger: Mutex::new(CostLedger::new(
                config.session_cost_ceiling,
                config.per_hand_cost_cap,
            )),
            weights: RwLock::new(AgentWeights::new(&names, &config.initial_weights)),
            settings: RwLock::new(settings),
            health: None,
            all_down_reported: AtomicBool::new(false),
        })
    }

    /// HTTP reasoners for every configured endpoint
    pub fn from_config(config: &AgentsConfig) -> Result<Self> {
        let reasoners = config
            .reasoners
            .iter()
            .map(|r| HttpReasoner::new(r).map(|h| Arc::new(h) as Arc<dyn Reasoner>))
            .collect::<Result<Vec<_>>>()?;
        Self::new(config, reasoners)
    }

    pub fn with_health(mut self, sender: HealthSender) -> Self {
        self.health = Some(sender);
        self
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.config.name.clone()).collect()
    }

    /// Apply a new configuration snapshot between decisions
    pub fn apply_config(&self, config: &AgentsConfig) {
        let settings = Settings::from(config);
        for breaker in lock(&self.breakers).values_mut() {
            breaker.configure(settings.failure_threshold, settings.cooldown);
        }
        lock(&self.ledger).set_limits(config.session_cost_ceiling, config.per_hand_cost_cap);
        match self.settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    fn settings(&self) -> Settings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn weights(&self) -> AgentWeights {
        match self.weights.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_weights(&self, weights: AgentWeights) {
        match self.weights.write() {
            Ok(mut guard) => *guard = weights,
            Err(poisoned) => *poisoned.into_inner() = weights,
        }
    }

    /// Restore weights persisted from an earlier session
    pub fn restore_weights(&self, mut weights: AgentWeights) {
        weights.renormalize();
        self.replace_weights(weights);
    }

    /// Recalibrate weights from labeled decisions; never called mid-decision
    pub fn calibrate(&self, samples: &[LabeledDecision]) -> Result<()> {
        let mut weights = self.weights();
        weights.calibrate(samples)?;
        self.replace_weights(weights);
        Ok(())
    }

    pub fn breaker_state(&self, agent: &str) -> Option<BreakerState> {
        lock(&self.breakers).get(agent).map(|b| b.state())
    }

    pub fn breaker_states(&self) -> BTreeMap<String, BreakerState> {
        lock(&self.breakers)
            .iter()
            .map(|(name, b)| (name.clone(), b.state()))
            .collect()
    }

    /// Manually move an open breaker to half-open
    pub fn reset_breaker(&self, agent: &str) -> Result<bool> {
        let reset = lock(&self.breakers)
            .get_mut(agent)
            .map(|b| b.reset())
            .ok_or_else(|| DecisionError::Configuration(format!("Unknown agent {}", agent)))?;
        if reset {
            info!("Breaker for {} reset to half-open", agent);
            self.all_down_reported.store(false, Ordering::SeqCst);
            publish(
                self.health.as_ref(),
                HealthEvent::CircuitReset {
                    agent: agent.to_string(),
                },
            );
        }
        Ok(reset)
    }

    pub fn session_cost(&self) -> Decimal {
        lock(&self.ledger).session_total()
    }

    pub fn agent_cost(&self, agent: &str) -> Decimal {
        lock(&self.ledger).agent_total(agent)
    }

    /// Clear cost accounting at a session boundary; breakers stay as they are
    pub fn reset_session(&self) {
        lock(&self.ledger).reset_session();
    }

    /// Query with the coordinator's current weights
    pub async fn query(&self, state: &GameState, budget: Duration) -> AggregatedAgentOutput {
        let weights = self.weights();
        self.query_agents(state, budget, &weights).await
    }

    /// Fan out to every admitted reasoner and aggregate within `budget`
    #[instrument(skip(self, state, weights), fields(hand_id = %state.hand_id))]
    pub async fn query_agents(
        &self,
        state: &GameState,
        budget: Duration,
        weights: &AgentWeights,
    ) -> AggregatedAgentOutput {
        let started = Instant::now();
        let deadline = started + budget;
        let settings = self.settings();
        let request = Arc::new(ReasonerRequest::from_state(state));

        let mut excluded = Vec::new();
        let mut dispatched: Vec<usize> = Vec::new();
        let mut set = JoinSet::new();

        {
            let mut ledger = lock(&self.ledger);
            ledger.enter_hand(&state.hand_id);
            let mut breakers = lock(&self.breakers);
            let now = std::time::Instant::now();
            let mut reserved = Decimal::ZERO;

            for (index, slot) in self.agents.iter().enumerate() {
                let name = &slot.config.name;
                let open = breakers
                    .get_mut(name)
                    .map(|b| !b.allows_request(now))
                    .unwrap_or(false);
                if open {
                    excluded.push(AgentExclusion {
                        agent: name.clone(),
                        reason: ExclusionReason::CircuitOpen,
                    });
                    continue;
                }

                let estimate = slot.config.estimated_cost();
                if let Err(refusal) = ledger.admit(estimate, reserved) {
                    debug!(agent = %name, ?refusal, "Excluded by cost control");
                    excluded.push(AgentExclusion {
                        agent: name.clone(),
                        reason: match refusal {
                            CostRefusal::SessionCeiling => ExclusionReason::SessionCostCeiling,
                            CostRefusal::PerHandCap => ExclusionReason::PerHandCostCap,
                        },
                    });
                    continue;
                }
                reserved += estimate;

                let retry = RetryPolicy {
                    enabled: ledger.admit(estimate, reserved).is_ok(),
                    base: settings.backoff_base,
                    cap: settings.backoff_cap,
                    min_window: settings.min_retry_window,
                    deadline,
                };
                let timeout = Duration::from_millis(slot.config.timeout_ms).min(budget);
                set.spawn(run_agent(
                    slot.reasoner.clone(),
                    request.clone(),
                    timeout,
                    retry,
                ));
                dispatched.push(index);
            }
        }

        if dispatched.is_empty() {
            let all_tripped = self.check_all_tripped();
            warn!(all_tripped, "No agent dispatched");
            let mut empty = AggregatedAgentOutput::empty(excluded);
            empty.all_tripped = all_tripped;
            empty.elapsed_ms = started.elapsed().as_millis() as u64;
            return empty;
        }

        let mut runs: HashMap<String, AgentRun> = HashMap::new();
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(run))) => {
                    runs.insert(run.agent.clone(), run);
                }
                Ok(Some(Err(e))) => warn!("Agent task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    debug!(pending = set.len(), "Agent budget expired, aborting stragglers");
                    set.abort_all();
                    break;
                }
            }
        }

        let (outputs, cost) = self.settle(state, &dispatched, runs, &mut excluded);
        let all_tripped = self.check_all_tripped();

        let mut aggregated = aggregate(outputs, weights, state.legal_actions.len());
        aggregated.excluded = excluded;
        aggregated.all_tripped = all_tripped;
        aggregated.cost = cost;
        aggregated.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            contributing = aggregated.outputs.len(),
            excluded = aggregated.excluded.len(),
            consensus = aggregated.consensus,
            elapsed_ms = aggregated.elapsed_ms,
            "Agents aggregated"
        );
        aggregated
    }

    /// Charge costs, validate replies and drive the breakers, in configuration order
    fn settle(
        &self,
        state: &GameState,
        dispatched: &[usize],
        mut runs: HashMap<String, AgentRun>,
        excluded: &mut Vec<AgentExclusion>,
    ) -> (Vec<AgentOutput>, Decimal) {
        let mut outputs = Vec::new();
        let mut cost = Decimal::ZERO;
        let mut ledger = lock(&self.ledger);
        let mut breakers = lock(&self.breakers);
        let now = std::time::Instant::now();

        for slot in dispatched.iter().filter_map(|i| self.agents.get(*i)) {
            let name = slot.config.name.as_str();
            let estimate = slot.config.estimated_cost();

            let outcome = match runs.remove(name) {
                Some(run) => {
                    for usage in &run.attempts {
                        let charged = usage
                            .map(|u| slot.config.cost_for_tokens(u.total()))
                            .unwrap_or(estimate);
                        ledger.charge(name, charged);
                        cost += charged;
                    }
                    run.result.and_then(|reply| {
                        validate_output(name, slot.reasoner.model(), &reply.output, state)
                    })
                }
                None => {
                    ledger.charge(name, estimate);
                    cost += estimate;
                    Err(DecisionError::Timeout(format!("{} gave no reply in budget", name)))
                }
            };

            let Some(breaker) = breakers.get_mut(name) else {
                continue;
            };
            match outcome {
                Ok(output) => {
                    if breaker.record_success() == Transition::Closed {
                        info!("Breaker for {} closed", name);
                    }
                    outputs.push(output);
                }
                Err(e) => {
                    debug!(agent = name, error = %e, "Agent output discarded");
                    if breaker.record_failure(now) == Transition::Tripped {
                        warn!(
                            "Breaker for {} tripped after {} consecutive failures",
                            name,
                            breaker.consecutive_failures()
                        );
                        publish(
                            self.health.as_ref(),
                            HealthEvent::CircuitTripped {
                                agent: name.to_string(),
                                consecutive_failures: breaker.consecutive_failures(),
                            },
                        );
                    }
                    excluded.push(AgentExclusion {
                        agent: name.to_string(),
                        reason: ExclusionReason::from_error(&e),
                    });
                }
            }
        }
        (outputs, cost)
    }

    /// True when every breaker is open; reports the condition once
    fn check_all_tripped(&self) -> bool {
        let breakers = lock(&self.breakers);
        let all = !breakers.is_empty() && breakers.values().all(|b| b.state() == BreakerState::Open);
        drop(breakers);
        if all && !self.all_down_reported.swap(true, Ordering::SeqCst) {
            warn!("All agent breakers are open");
            publish(self.health.as_ref(), HealthEvent::AllAgentsUnavailable);
        }
        all
    }
}

/// Confidence-weighted one-hot vote over the surviving outputs
fn aggregate(
    outputs: Vec<AgentOutput>,
    weights: &AgentWeights,
    legal_count: usize,
) -> AggregatedAgentOutput {
    if outputs.is_empty() {
        return AggregatedAgentOutput::empty(Vec::new());
    }

    let names: Vec<&str> = outputs.iter().map(|o| o.agent.as_str()).collect();
    let base = weights.over(&names);
    let mut effective: BTreeMap<String, f64> = outputs
        .iter()
        .map(|o| {
            let w = base.get(&o.agent).copied().unwrap_or_default();
            (o.agent.clone(), w * o.confidence)
        })
        .collect();
    if effective.values().sum::<f64>() <= 0.0 {
        effective = base;
    }
    let total: f64 = effective.values().sum();
    for w in effective.values_mut() {
        *w /= total;
    }

    let mut distribution = ActionDistribution::new();
    for output in &outputs {
        let w = effective.get(&output.agent).copied().unwrap_or_default();
        distribution.add(output.recommendation, w);
    }
    distribution.normalize();

    let dispersion = distribution.normalized_entropy(legal_count);
    AggregatedAgentOutput {
        distribution,
        consensus: 1.0 - dispersion,
        dispersion,
        outputs,
        weights: effective,
        excluded: Vec::new(),
        no_agent: false,
        all_tripped: false,
        cost: Decimal::ZERO,
        elapsed_ms: 0,
    }
}

async fn attempt(
    reasoner: &dyn Reasoner,
    request: &ReasonerRequest,
    timeout: Duration,
) -> Result<ReasonerReply> {
    match tokio::time::timeout(timeout, reasoner.query(request, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(DecisionError::Timeout(format!(
            "{} exceeded {}ms",
            reasoner.name(),
            timeout.as_millis()
        ))),
    }
}

fn usage_of(result: &Result<ReasonerReply>) -> Option<TokenUsage> {
    result.as_ref().ok().and_then(|r| r.usage)
}

/// One agent's attempts: the first, plus at most one retry on a transient failure
async fn run_agent(
    reasoner: Arc<dyn Reasoner>,
    request: Arc<ReasonerRequest>,
    timeout: Duration,
    retry: RetryPolicy,
) -> AgentRun {
    let agent = reasoner.name().to_string();
    let mut attempts = Vec::with_capacity(2);

    let mut result = attempt(reasoner.as_ref(), &request, timeout).await;
    attempts.push(usage_of(&result));

    let transient = matches!(&result, Err(e) if e.is_transient());
    if retry.enabled && transient {
        let backoff = retry.backoff(0);
        let window = retry
            .deadline
            .saturating_duration_since(Instant::now())
            .saturating_sub(backoff);
        if window >= retry.min_window {
            debug!(agent = %agent, backoff_ms = backoff.as_millis() as u64, "Retrying transient failure");
            tokio::time::sleep(backoff).await;
            result = attempt(reasoner.as_ref(), &request, timeout.min(window)).await;
            attempts.push(usage_of(&result));
        }
    }

    AgentRun {
        agent,
        result,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::channels::create_health_channel;
    use crate::common::types::{ActionKind, LegalAction, Position, Seat, Street};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    enum Script {
        Reply(serde_json::Value),
        Status(u16),
        Sleep(Duration),
        /// Fail with the status once, then reply
        FlakyThenReply(u16, serde_json::Value),
    }

    struct ScriptedReasoner {
        name: String,
        script: Script,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Reasoner for ScriptedReasoner {
        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            "scripted-v1"
        }

        async fn query(&self, _request: &ReasonerRequest, _timeout: Duration) -> Result<ReasonerReply> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = |output: &serde_json::Value| ReasonerReply {
                output: output.clone(),
                usage: None,
            };
            match &self.script {
                Script::Reply(output) => Ok(reply(output)),
                Script::Status(status) => Err(DecisionError::AgentStatus {
                    agent: self.name.clone(),
                    status: *status,
                }),
                Script::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(reply(&json!({"recommendation": "call", "confidence": 1.0})))
                }
                Script::FlakyThenReply(status, output) => {
                    if call == 0 {
                        Err(DecisionError::AgentStatus {
                            agent: self.name.clone(),
                            status: *status,
                        })
                    } else {
                        Ok(reply(output))
                    }
                }
            }
        }
    }

    fn reasoner_config(name: &str) -> ReasonerConfig {
        ReasonerConfig {
            name: name.into(),
            endpoint: format!("http://localhost/{}", name),
            model: "scripted-v1".into(),
            api_key_env: None,
            timeout_ms: 300,
            cost_per_1k_tokens: dec!(0.01),
            estimated_tokens: 1000,
        }
    }

    fn coordinator(scripts: Vec<(&str, Script)>) -> (AgentCoordinator, Vec<Arc<AtomicUsize>>) {
        let config = AgentsConfig {
            reasoners: scripts.iter().map(|(n, _)| reasoner_config(n)).collect(),
            ..AgentsConfig::default()
        };
        let mut counters = Vec::new();
        let reasoners = scripts
            .into_iter()
            .map(|(name, script)| {
                let calls = Arc::new(AtomicUsize::new(0));
                counters.push(calls.clone());
                Arc::new(ScriptedReasoner {
                    name: name.into(),
                    script,
                    calls,
                }) as Arc<dyn Reasoner>
            })
            .collect();
        (AgentCoordinator::new(&config, reasoners).unwrap(), counters)
    }

    fn state() -> GameState {
        GameState {
            hand_id: "hand-1".into(),
            session_id: "session-1".into(),
            street: Street::Preflop,
            hero: Position::Btn,
            hole_cards: vec!["Ah".parse().unwrap(), "Kd".parse().unwrap()],
            seats: vec![
                Seat { position: Position::Btn, stack: 100.0, in_hand: true },
                Seat { position: Position::Bb, stack: 100.0, in_hand: true },
            ],
            pot: 1.5,
            small_blind: 0.5,
            big_blind: 1.0,
            board: vec![],
            history: vec![],
            legal_actions: vec![
                LegalAction::new(ActionKind::Fold),
                LegalAction::new(ActionKind::Call),
                LegalAction::sized(ActionKind::Raise, 2.0, 100.0),
            ],
            to_call: 1.0,
            hero_committed: 0.0,
        }
    }

    fn raise(confidence: f64) -> Script {
        Script::Reply(json!({"recommendation": "raise", "sizing": 2.5, "confidence": confidence}))
    }

    #[tokio::test]
    async fn test_unanimous_agents() {
        let (coordinator, _) = coordinator(vec![("a", raise(0.9)), ("b", raise(0.8)), ("c", raise(0.7))]);
        let out = coordinator.query(&state(), Duration::from_millis(500)).await;
        assert!(!out.no_agent);
        assert_eq!(out.outputs.len(), 3);
        assert!((out.distribution.get(ActionKind::Raise) - 1.0).abs() < 1e-12);
        assert!((out.consensus - 1.0).abs() < 1e-12);
        assert_eq!(out.dispersion, 0.0);
        assert_eq!(out.cost, dec!(0.03));
    }

    #[tokio::test]
    async fn test_confidence_weighting() {
        let (coordinator, _) = coordinator(vec![
            ("a", raise(0.9)),
            ("b", Script::Reply(json!({"recommendation": "fold", "confidence": 0.3}))),
        ]);
        let out = coordinator.query(&state(), Duration::from_millis(500)).await;
        assert!((out.distribution.get(ActionKind::Raise) - 0.75).abs() < 1e-12);
        assert!((out.distribution.get(ActionKind::Fold) - 0.25).abs() < 1e-12);
        assert!(out.distribution.is_valid());
        assert!(out.consensus > 0.0 && out.consensus < 1.0);
    }

    #[tokio::test]
    async fn test_slow_agent_excluded_as_timeout() {
        let (coordinator, _) = coordinator(vec![
            ("a", raise(1.0)),
            ("slow", Script::Sleep(Duration::from_secs(2))),
        ]);
        let out = coordinator.query(&state(), Duration::from_millis(200)).await;
        assert_eq!(out.outputs.len(), 1);
        assert_eq!(
            out.excluded,
            vec![AgentExclusion {
                agent: "slow".into(),
                reason: ExclusionReason::Timeout,
            }]
        );
        assert!(out.elapsed_ms < 1000);
    }

    #[tokio::test]
    async fn test_all_timeouts_signal_no_agent() {
        let slow = || Script::Sleep(Duration::from_secs(2));
        let (coordinator, _) = coordinator(vec![("a", slow()), ("b", slow()), ("c", slow())]);
        let out = coordinator.query(&state(), Duration::from_millis(100)).await;
        assert!(out.no_agent);
        assert!(out.is_empty());
        assert_eq!(out.excluded.len(), 3);
        assert!(!out.all_tripped);
    }

    #[tokio::test]
    async fn test_breaker_trips_after_five_failures() {
        let (tx, mut rx) = create_health_channel();
        let (coordinator, counters) = coordinator(vec![("a", Script::Status(400)), ("b", raise(1.0))]);
        let coordinator = coordinator.with_health(tx);

        for _ in 0..5 {
            coordinator.query(&state(), Duration::from_millis(300)).await;
        }
        assert_eq!(coordinator.breaker_state("a"), Some(BreakerState::Open));
        assert_eq!(
            rx.recv().await,
            Some(HealthEvent::CircuitTripped {
                agent: "a".into(),
                consecutive_failures: 5,
            })
        );

        let out = coordinator.query(&state(), Duration::from_millis(300)).await;
        assert_eq!(counters[0].load(Ordering::SeqCst), 5);
        assert!(out
            .excluded
            .iter()
            .any(|e| e.agent == "a" && e.reason == ExclusionReason::CircuitOpen));

        assert!(coordinator.reset_breaker("a").unwrap());
        assert_eq!(coordinator.breaker_state("a"), Some(BreakerState::HalfOpen));
        assert!(coordinator.reset_breaker("nobody").is_err());
    }

    #[tokio::test]
    async fn test_all_tripped_reports_once() {
        let (tx, mut rx) = create_health_channel();
        let (coordinator, _) = coordinator(vec![("a", Script::Status(400))]);
        let coordinator = coordinator.with_health(tx);
        for _ in 0..5 {
            coordinator.query(&state(), Duration::from_millis(300)).await;
        }
        let out = coordinator.query(&state(), Duration::from_millis(300)).await;
        assert!(out.all_tripped);
        assert!(out.no_agent);

        assert!(matches!(rx.recv().await, Some(HealthEvent::CircuitTripped { .. })));
        assert_eq!(rx.recv().await, Some(HealthEvent::AllAgentsUnavailable));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let (coordinator, counters) = coordinator(vec![(
            "a",
            Script::FlakyThenReply(503, json!({"recommendation": "call", "confidence": 0.5})),
        )]);
        let out = coordinator.query(&state(), Duration::from_millis(500)).await;
        assert_eq!(counters[0].load(Ordering::SeqCst), 2);
        assert_eq!(out.outputs.len(), 1);
        // Both dispatched attempts are charged at the estimate
        assert_eq!(out.cost, dec!(0.02));
        assert_eq!(coordinator.breaker_state("a"), Some(BreakerState::Closed));
    }

    #[tokio::test]
    async fn test_timed_out_agent_dispatched_once_per_decision() {
        let (coordinator, counters) =
            coordinator(vec![("slow", Script::Sleep(Duration::from_secs(2)))]);
        for round in 1..=3 {
            let out = coordinator.query(&state(), Duration::from_millis(800)).await;
            assert_eq!(counters[0].load(Ordering::SeqCst), round);
            assert_eq!(out.excluded[0].reason, ExclusionReason::Timeout);
            // One attempt, one estimate
            assert_eq!(out.cost, dec!(0.01));
        }
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let (coordinator, counters) = coordinator(vec![("a", Script::Status(400))]);
        let out = coordinator.query(&state(), Duration::from_millis(500)).await;
        assert_eq!(counters[0].load(Ordering::SeqCst), 1);
        assert_eq!(
            out.excluded[0].reason,
            ExclusionReason::HttpStatus { status: 400 }
        );
    }

    #[tokio::test]
    async fn test_cost_ceiling_excludes_before_dispatch() {
        let config = AgentsConfig {
            reasoners: vec![reasoner_config("a"), reasoner_config("b")],
            session_cost_ceiling: dec!(0.015),
            ..AgentsConfig::default()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let make = |name: &str| {
            Arc::new(ScriptedReasoner {
                name: name.into(),
                script: raise(1.0),
                calls: calls.clone(),
            }) as Arc<dyn Reasoner>
        };
        let coordinator = AgentCoordinator::new(&config, vec![make("a"), make("b")]).unwrap();
        let out = coordinator.query(&state(), Duration::from_millis(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.excluded[0].reason, ExclusionReason::SessionCostCeiling);
        assert_eq!(coordinator.session_cost(), dec!(0.01));
    }

    #[tokio::test]
    async fn test_invalid_recommendation_discarded() {
        let (coordinator, _) = coordinator(vec![
            ("a", Script::Reply(json!({"recommendation": "check", "confidence": 0.9}))),
            ("b", raise(0.5)),
        ]);
        let out = coordinator.query(&state(), Duration::from_millis(300)).await;
        assert_eq!(out.outputs.len(), 1);
        assert!(matches!(
            out.excluded[0].reason,
            ExclusionReason::InvalidOutput { .. }
        ));
    }
}
