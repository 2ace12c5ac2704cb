//! HTTP reasoner client

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::messages::{ReasonerEnvelope, ReasonerReply, ReasonerRequest};
use crate::common::errors::{DecisionError, Result};
use crate::common::traits::Reasoner;
use crate::config::types::ReasonerConfig;

/// Reasoner reached over HTTP with a JSON POST
#[derive(Debug, Clone)]
pub struct HttpReasoner {
    client: Client,
    name: String,
    model: String,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpReasoner {
    /// Build a client; the bearer token is read from `api_key_env` when set
    pub fn new(config: &ReasonerConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| DecisionError::Internal(e.to_string()))?;

        let api_key = match &config.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) => Some(key),
                Err(_) => {
                    warn!("Reasoner {}: {} is not set, sending without auth", config.name, var);
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            client,
            name: config.name.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(agent = %self.name))]
    async fn query(&self, request: &ReasonerRequest, timeout: Duration) -> Result<ReasonerReply> {
        let body = ReasonerEnvelope {
            model: &self.model,
            request,
        };
        let mut builder = self.client.post(&self.endpoint).timeout(timeout).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DecisionError::AgentStatus {
                agent: self.name.clone(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        let reply: ReasonerReply = serde_json::from_str(&text)?;
        debug!("Reply received ({} bytes)", text.len());
        Ok(reply)
    }
}
