//! Reasoner output validation
//!
//! Recommendation and confidence must both be present and valid. A sizing
//! that is malformed is dropped instead of discarding the whole output.

use serde_json::Value;
use tracing::debug;

use super::messages::AgentOutput;
use crate::common::errors::{DecisionError, Result};
use crate::common::types::{ActionKind, GameState};

pub fn validate_output(
    agent: &str,
    model: &str,
    output: &Value,
    state: &GameState,
) -> Result<AgentOutput> {
    let fields = output
        .as_object()
        .ok_or_else(|| DecisionError::Validation("output is not an object".into()))?;

    let recommendation: ActionKind = fields
        .get("recommendation")
        .and_then(Value::as_str)
        .ok_or_else(|| DecisionError::Validation("missing recommendation".into()))?
        .parse()?;
    if !state.is_legal(recommendation) {
        return Err(DecisionError::Validation(format!(
            "recommendation {} is not legal",
            recommendation
        )));
    }

    let confidence = fields
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite() && (0.0..=1.0).contains(c))
        .ok_or_else(|| DecisionError::Validation("confidence missing or outside [0,1]".into()))?;

    let sizing = match fields.get("sizing") {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let parsed = parse_sizing(raw);
            if parsed.is_none() {
                debug!(agent, sizing = %raw, "Ignoring malformed sizing");
            }
            parsed
        }
    };

    let rationale = fields
        .get("rationale")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(AgentOutput {
        agent: agent.to_string(),
        model: model.to_string(),
        recommendation,
        sizing: if recommendation.needs_sizing() { sizing } else { None },
        confidence,
        rationale,
    })
}

/// Positive finite number, given as a JSON number or numeric string
fn parse_sizing(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (value.is_finite() && value > 0.0).then_some(value)
}
