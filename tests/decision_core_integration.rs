//! End-to-end decisions against mocked reasoning services

mod common;

use common::*;
use holdem_decision_core::agents::{BreakerState, ExclusionReason};
use holdem_decision_core::config::types::SelectionMode;
use holdem_decision_core::strategy::select_action;
use holdem_decision_core::{
    create_health_channel, ActionKind, DecisionCore, EngineStage, FallbackReason, HealthEvent,
    SharedConfig, SolutionSource,
};
use rust_decimal_macros::dec;
use serde_json::json;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn raise_output() -> serde_json::Value {
    json!({"recommendation": "raise", "sizing": 2.5, "confidence": 0.9, "rationale": "value"})
}

#[tokio::test]
async fn test_healthy_agents_blend_with_cached_gto() {
    let server = MockServer::start().await;
    let mut reasoners = Vec::new();
    for name in ["alpha", "beta", "gamma"] {
        mount_reasoner(&server, name, reply(raise_output())).await;
        reasoners.push(reasoner(name, format!("{}/{}", server.uri(), name), 400));
    }
    let shared = SharedConfig::new(engine_config(reasoners)).unwrap();
    let core = DecisionCore::from_config(shared, None).unwrap();

    let trace = core.decide_traced(&btn_ako_state(), Duration::ZERO).await;

    let gto = trace.gto.as_ref().unwrap();
    assert_eq!(gto.source, SolutionSource::Cache);
    assert!(trace.gto_distribution.get(ActionKind::Raise) > 0.0);

    let agents = trace.agents.as_ref().unwrap();
    assert_eq!(agents.outputs.len(), 3);
    assert!(agents.excluded.is_empty());
    assert!((agents.consensus - 1.0).abs() < 1e-9);

    let expected = 0.7 * trace.gto_distribution.get(ActionKind::Raise) + 0.3;
    assert!((trace.blended.get(ActionKind::Raise) - expected).abs() < 1e-9);

    let decision = &trace.decision;
    assert_eq!(decision.stage, EngineStage::Finalized);
    assert_eq!(decision.alpha, 0.7);
    assert!(btn_ako_state().is_legal(decision.action));
    assert!(trace.stages.contains(&EngineStage::Blending));
}

#[tokio::test]
async fn test_all_agents_late_runs_gto_only() {
    let server = MockServer::start().await;
    let mut reasoners = Vec::new();
    for name in ["alpha", "beta", "gamma"] {
        mount_reasoner(
            &server,
            name,
            slow_reply(raise_output(), Duration::from_secs(2)),
        )
        .await;
        reasoners.push(reasoner(name, format!("{}/{}", server.uri(), name), 150));
    }
    let shared = SharedConfig::new(engine_config(reasoners)).unwrap();
    let core = DecisionCore::from_config(shared, None).unwrap();

    let state = btn_ako_state();
    let trace = core.decide_traced(&state, Duration::ZERO).await;

    let agents = trace.agents.as_ref().unwrap();
    assert!(agents.no_agent);
    assert_eq!(agents.excluded.len(), 3);
    assert!(agents
        .excluded
        .iter()
        .all(|e| e.reason == ExclusionReason::Timeout));

    // Timed-out agents are not retried
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    let decision = &trace.decision;
    assert_eq!(decision.alpha, 1.0);
    assert_eq!(decision.divergence, None);
    assert_eq!(trace.blended, trace.gto_distribution);

    let expected = select_action(
        &trace.gto_distribution,
        &state.legal_kinds(),
        decision.seed,
        SelectionMode::Sample,
    );
    assert_eq!(Some(decision.action), expected);
}

#[tokio::test]
async fn test_stop_loss_forces_safe_action() {
    let server = MockServer::start().await;
    mount_reasoner(&server, "alpha", reply(raise_output())).await;
    let shared = SharedConfig::new(engine_config(vec![reasoner(
        "alpha",
        format!("{}/alpha", server.uri()),
        400,
    )]))
    .unwrap();
    let (tx, mut rx) = create_health_channel();
    let core = DecisionCore::from_config(shared, Some(tx)).unwrap();

    assert_ok!(core.record_outcome("hand-0000", dec!(-600)));
    assert_err!(core.record_outcome("hand-0000", dec!(-600)));
    let decision = core.decide(&btn_ako_state()).await;

    assert_eq!(decision.action, ActionKind::Fold);
    assert_eq!(decision.stage, EngineStage::Fallback);
    assert!(matches!(
        decision.fallback,
        Some(FallbackReason::RiskViolation { .. })
    ));
    assert!(core.risk().is_halted());

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, HealthEvent::PanicStop { .. }));
}

#[test_log::test(tokio::test)]
async fn test_failing_agent_trips_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alpha"))
        .respond_with(ResponseTemplate::new(400))
        .expect(5)
        .mount(&server)
        .await;
    let shared = SharedConfig::new(engine_config(vec![reasoner(
        "alpha",
        format!("{}/alpha", server.uri()),
        400,
    )]))
    .unwrap();
    let (tx, mut rx) = create_health_channel();
    let core = DecisionCore::from_config(shared, Some(tx)).unwrap();

    for i in 0..5 {
        let mut state = btn_ako_state();
        state.hand_id = format!("hand-{:04}", i);
        let trace = core.decide_traced(&state, Duration::ZERO).await;
        let agents = trace.agents.unwrap();
        assert_eq!(agents.excluded[0].reason, ExclusionReason::HttpStatus { status: 400 });
    }
    assert_eq!(core.agents().breaker_state("alpha"), Some(BreakerState::Open));

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        HealthEvent::CircuitTripped {
            agent: "alpha".to_string(),
            consecutive_failures: 5
        }
    );
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, HealthEvent::AllAgentsUnavailable);

    // Open breaker: no dispatch, decision still produced
    let mut state = btn_ako_state();
    state.hand_id = "hand-0005".to_string();
    let trace = core.decide_traced(&state, Duration::ZERO).await;
    let agents = trace.agents.unwrap();
    assert_eq!(agents.excluded[0].reason, ExclusionReason::CircuitOpen);
    assert!(agents.all_tripped);
    assert!(state.is_legal(trace.decision.action));
}

#[tokio::test]
async fn test_malformed_reply_excludes_only_that_agent() {
    let server = MockServer::start().await;
    mount_reasoner(&server, "alpha", reply(raise_output())).await;
    mount_reasoner(
        &server,
        "beta",
        ResponseTemplate::new(200).set_body_string(samples::MALFORMED_BODY),
    )
    .await;
    let shared = SharedConfig::new(engine_config(vec![
        reasoner("alpha", format!("{}/alpha", server.uri()), 400),
        reasoner("beta", format!("{}/beta", server.uri()), 400),
    ]))
    .unwrap();
    let core = DecisionCore::from_config(shared, None).unwrap();

    let trace = core.decide_traced(&btn_ako_state(), Duration::ZERO).await;
    let agents = trace.agents.unwrap();

    assert_eq!(agents.outputs.len(), 1);
    assert_eq!(agents.outputs[0].agent, "alpha");
    assert_eq!(agents.excluded.len(), 1);
    assert_eq!(agents.excluded[0].agent, "beta");
    assert!(matches!(
        agents.excluded[0].reason,
        ExclusionReason::MalformedOutput { .. }
    ));
    assert_eq!(agents.weights.get("alpha").copied(), Some(1.0));
}

#[tokio::test]
async fn test_malformed_sizing_keeps_recommendation() {
    let server = MockServer::start().await;
    mount_reasoner(
        &server,
        "alpha",
        reply(json!({"recommendation": "raise", "sizing": "huge", "confidence": 0.8})),
    )
    .await;
    let shared = SharedConfig::new(engine_config(vec![reasoner(
        "alpha",
        format!("{}/alpha", server.uri()),
        400,
    )]))
    .unwrap();
    let core = DecisionCore::from_config(shared, None).unwrap();

    let trace = core.decide_traced(&btn_ako_state(), Duration::ZERO).await;
    let agents = trace.agents.unwrap();

    assert_eq!(agents.outputs.len(), 1);
    assert_eq!(agents.outputs[0].recommendation, ActionKind::Raise);
    assert_eq!(agents.outputs[0].sizing, None);
    assert!(agents.excluded.is_empty());
}

#[tokio::test]
async fn test_river_decision_is_legal_and_reuses_seed() {
    let server = MockServer::start().await;
    mount_reasoner(
        &server,
        "alpha",
        reply(json!({"recommendation": "bet", "sizing": 0.75, "confidence": 0.7})),
    )
    .await;
    let shared = SharedConfig::new(engine_config(vec![reasoner(
        "alpha",
        format!("{}/alpha", server.uri()),
        400,
    )]))
    .unwrap();
    let core = DecisionCore::from_config(shared, None).unwrap();

    let state = river_state();
    let first = core.decide(&state).await;
    let second = core.decide(&state).await;

    assert!(state.is_legal(first.action));
    assert!(state.is_legal(second.action));
    assert_eq!(first.seed, second.seed);
    if let Some(amount) = first.amount {
        assert!((1.0..=80.0).contains(&amount));
    }
}
