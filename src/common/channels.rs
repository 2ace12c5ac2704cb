//! Channel type definitions for health/alerting events

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 256;

/// Events for the health/alerting collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HealthEvent {
    /// An agent's breaker opened after consecutive failures
    CircuitTripped { agent: String, consecutive_failures: u32 },
    /// An agent's breaker moved back to half-open
    CircuitReset { agent: String },
    /// Every agent is tripped; decisions run GTO-only
    AllAgentsUnavailable,
    /// The risk guard halted automated decisions
    PanicStop { reason: String },
}

/// Sending half used by the decision core
pub type HealthSender = mpsc::Sender<HealthEvent>;

/// Create a new health event channel with the default buffer size
pub fn create_health_channel() -> (HealthSender, mpsc::Receiver<HealthEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new health event channel with a custom buffer size
pub fn create_health_channel_with_size(
    size: usize,
) -> (HealthSender, mpsc::Receiver<HealthEvent>) {
    mpsc::channel(size)
}

/// Publish without waiting; a full or closed channel drops the event
pub fn publish(sender: Option<&HealthSender>, event: HealthEvent) {
    if let Some(tx) = sender {
        if let Err(e) = tx.try_send(event) {
            warn!("Dropping health event: {}", e);
        }
    }
}
