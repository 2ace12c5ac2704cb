//! Common test utilities and fixtures

#![allow(dead_code)]

use holdem_decision_core::config::types::{AgentsConfig, ReasonerConfig};
use holdem_decision_core::{
    ActionKind, EngineConfig, GameState, LegalAction, Position, Seat, Street,
};
use rust_decimal_macros::dec;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// BTN, 100bb effective, unopened preflop pot, holding AKo
pub fn btn_ako_state() -> GameState {
    GameState {
        hand_id: "hand-0001".to_string(),
        session_id: "session-a".to_string(),
        street: Street::Preflop,
        hero: Position::Btn,
        hole_cards: vec!["As".parse().unwrap(), "Kd".parse().unwrap()],
        seats: vec![
            Seat { position: Position::Co, stack: 100.0, in_hand: false },
            Seat { position: Position::Btn, stack: 100.0, in_hand: true },
            Seat { position: Position::Sb, stack: 100.0, in_hand: true },
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
            LegalAction::sized(ActionKind::AllIn, 100.0, 100.0),
        ],
        to_call: 1.0,
        hero_committed: 0.0,
    }
}

/// River spot, checked to hero in position
pub fn river_state() -> GameState {
    serde_json::from_str(samples::RIVER_STATE).unwrap()
}

pub fn reasoner(name: &str, endpoint: String, timeout_ms: u64) -> ReasonerConfig {
    ReasonerConfig {
        name: name.to_string(),
        endpoint,
        model: format!("{}-v1", name),
        api_key_env: None,
        timeout_ms,
        cost_per_1k_tokens: dec!(0.002),
        estimated_tokens: 1000,
    }
}

/// Default engine config with the given reasoners
pub fn engine_config(reasoners: Vec<ReasonerConfig>) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.agents = AgentsConfig {
        reasoners,
        ..AgentsConfig::default()
    };
    config
}

/// Mount a reasoner endpoint at `/{name}` replying with `template`
pub async fn mount_reasoner(server: &MockServer, name: &str, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(format!("/{}", name)))
        .respond_with(template)
        .mount(server)
        .await;
}

pub fn reply(output: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "output": output }))
}

pub fn slow_reply(output: serde_json::Value, delay: Duration) -> ResponseTemplate {
    reply(output).set_delay(delay)
}

/// Sample payloads
pub mod samples {
    pub const RIVER_STATE: &str = r#"{
        "hand_id": "hand-0042",
        "session_id": "session-a",
        "street": "river",
        "hero": "BTN",
        "hole_cards": ["Ah", "Qh"],
        "seats": [
            {"position": "BTN", "stack": 80.0},
            {"position": "BB", "stack": 80.0}
        ],
        "pot": 40.0,
        "small_blind": 0.5,
        "big_blind": 1.0,
        "board": ["Kh", "7h", "2c", "9d", "3h"],
        "history": [
            {"street": "preflop", "position": "BTN", "action": "raise", "amount": 2.5},
            {"street": "preflop", "position": "BB", "action": "call"},
            {"street": "flop", "position": "BB", "action": "check"},
            {"street": "flop", "position": "BTN", "action": "bet", "amount": 2.0},
            {"street": "flop", "position": "BB", "action": "call"},
            {"street": "river", "position": "BB", "action": "check"}
        ],
        "legal_actions": [
            {"kind": "check"},
            {"kind": "bet", "min_amount": 1.0, "max_amount": 80.0},
            {"kind": "allin", "min_amount": 80.0, "max_amount": 80.0}
        ],
        "to_call": 0.0
    }"#;

    pub const MALFORMED_BODY: &str = "{\"output\": {\"recommendation\": ";
}
