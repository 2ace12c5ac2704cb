//! Reasoner wire types

use serde::{Deserialize, Serialize};

use crate::common::types::{ActionKind, Card, GameState, HistoryEntry, LegalAction, Position, Street};

/// Game-state view sent to every reasoner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerRequest {
    pub hand_id: String,
    pub session_id: String,
    pub street: Street,
    pub position: Position,
    pub hole_cards: Vec<Card>,
    pub board: Vec<Card>,
    pub pot: f64,
    pub to_call: f64,
    pub effective_stack_bb: f64,
    pub history: Vec<HistoryEntry>,
    pub legal_actions: Vec<LegalAction>,
}

impl ReasonerRequest {
    pub fn from_state(state: &GameState) -> Self {
        Self {
            hand_id: state.hand_id.clone(),
            session_id: state.session_id.clone(),
            street: state.street,
            position: state.hero,
            hole_cards: state.hole_cards.clone(),
            board: state.board.clone(),
            pot: state.pot,
            to_call: state.to_call,
            effective_stack_bb: state.effective_stack_bb(),
            history: state.history.clone(),
            legal_actions: state.legal_actions.clone(),
        }
    }
}

/// Request body: the shared view tagged with the target model
#[derive(Debug, Serialize)]
pub struct ReasonerEnvelope<'a> {
    pub model: &'a str,
    #[serde(flatten)]
    pub request: &'a ReasonerRequest,
}

/// Token usage reported by a reasoner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Raw reply; `output` is validated field by field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerReply {
    pub output: serde_json::Value,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// Validated structured result of one reasoner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentOutput {
    pub agent: String,
    pub model: String,
    pub recommendation: ActionKind,
    /// Implied size in street units (bb raise-to preflop, pot fraction after), when well-formed
    pub sizing: Option<f64>,
    pub confidence: f64,
    pub rationale: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_parses_with_and_without_usage() {
        let reply: ReasonerReply = serde_json::from_str(
            r#"{"output":{"recommendation":"raise","confidence":0.8},"usage":{"prompt_tokens":300,"completion_tokens":50}}"#,
        )
        .unwrap();
        assert_eq!(reply.usage.map(|u| u.total()), Some(350));

        let bare: ReasonerReply =
            serde_json::from_str(r#"{"output":{"recommendation":"fold","confidence":1}}"#).unwrap();
        assert!(bare.usage.is_none());

        assert!(serde_json::from_str::<ReasonerReply>(r#"{"result":"raise"}"#).is_err());
    }

    #[test]
    fn test_envelope_flattens_request() {
        let request = ReasonerRequest {
            hand_id: "h".into(),
            session_id: "s".into(),
            street: Street::Flop,
            position: Position::Co,
            hole_cards: vec!["As".parse().unwrap(), "Kd".parse().unwrap()],
            board: vec![],
            pot: 10.0,
            to_call: 0.0,
            effective_stack_bb: 100.0,
            history: vec![],
            legal_actions: vec![LegalAction::new(ActionKind::Check)],
        };
        let json = serde_json::to_value(ReasonerEnvelope { model: "m-1", request: &request }).unwrap();
        assert_eq!(json["model"], "m-1");
        assert_eq!(json["position"], "CO");
        assert_eq!(json["hole_cards"][0], "As");
    }
}
