//! Trait definitions for decision-core collaborators

use async_trait::async_trait;
use std::time::Duration;

use super::errors::Result;
use crate::agents::messages::{ReasonerReply, ReasonerRequest};
use crate::strategy::types::DecisionTrace;

/// An external reasoning service
///
/// Implementations must honor `timeout` as a hard bound on the outbound
/// request. The coordinator additionally wraps every call in its own
/// deadline, so a late reply is discarded either way.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Stable name; keys weights, breakers and cost accounting
    fn name(&self) -> &str;

    /// Model/version identifier reported in diagnostic traces
    fn model(&self) -> &str;

    /// Send one query and return the raw reply
    ///
    /// # Arguments
    /// * `request` - Serialized view of the game state
    /// * `timeout` - Hard timeout for this attempt
    async fn query(&self, request: &ReasonerRequest, timeout: Duration) -> Result<ReasonerReply>;
}

/// Consumer of full decision traces (the hand-history logger)
///
/// Called on the decision path, so implementations must not block.
pub trait DecisionSink: Send + Sync {
    fn record(&self, trace: &DecisionTrace);
}
