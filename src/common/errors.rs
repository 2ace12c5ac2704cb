//! Error types for the decision core

use thiserror::Error;

/// Result type alias using our DecisionError
pub type Result<T> = std::result::Result<T, DecisionError>;

/// Main error type for decision-core operations
///
/// The first five variants are the recoverable taxonomy the strategy engine
/// folds into fallbacks. None of them ever escapes a decision.
#[derive(Error, Debug)]
pub enum DecisionError {
    /// A sub-budget expired before a component produced output
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Malformed external reasoner output
    #[error("Validation error: {0}")]
    Validation(String),

    /// The total decision deadline is about to be breached
    #[error("Budget exceeded: {component} overran by {overrun_ms}ms")]
    BudgetExceeded { component: String, overrun_ms: u64 },

    /// Risk guard limit violated
    #[error("Risk violation: {0}")]
    RiskViolation(String),

    /// Every reasoner is excluded or tripped
    #[error("All agents unavailable")]
    AllAgentsUnavailable,

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Non-2xx response from a reasoner
    #[error("Agent {agent} returned status {status}")]
    AgentStatus { agent: String, status: u16 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Calibration requested with too few labeled decisions
    #[error("Calibration needs at least {required} samples, got {actual}")]
    InsufficientCalibrationData { required: usize, actual: usize },

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DecisionError {
    /// Whether a retry may succeed: only 429 and 5xx replies.
    /// Timeouts already spent the agent's slice and are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            DecisionError::AgentStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Short machine-readable label used in exclusion reasons and traces
    pub fn kind(&self) -> &'static str {
        match self {
            DecisionError::Timeout(_) => "timeout",
            DecisionError::Validation(_) => "validation",
            DecisionError::BudgetExceeded { .. } => "budget_exceeded",
            DecisionError::RiskViolation(_) => "risk_violation",
            DecisionError::AllAgentsUnavailable => "all_agents_unavailable",
            DecisionError::HttpRequest(_) => "http",
            DecisionError::JsonParse(_) => "json",
            DecisionError::AgentStatus { .. } => "status",
            DecisionError::Configuration(_) => "configuration",
            DecisionError::InsufficientCalibrationData { .. } => "calibration",
            DecisionError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let rate_limited = DecisionError::AgentStatus {
            agent: "a".into(),
            status: 429,
        };
        let server = DecisionError::AgentStatus {
            agent: "a".into(),
            status: 503,
        };
        let client = DecisionError::AgentStatus {
            agent: "a".into(),
            status: 400,
        };
        assert!(rate_limited.is_transient());
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!DecisionError::Validation("bad".into()).is_transient());
        assert!(!DecisionError::Timeout("a exceeded 150ms".into()).is_transient());
    }
}
