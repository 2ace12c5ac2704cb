//! Hot-reloadable configuration handle

use std::sync::{Arc, RwLock};
use tracing::info;

use super::types::{validate_alpha, EngineConfig};
use crate::common::errors::{DecisionError, Result};

/// Shared, atomically swappable configuration
///
/// Each decision takes one snapshot at its start and uses it throughout, so
/// an update lands between decisions and never mid-decision.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<EngineConfig>>>,
}

impl SharedConfig {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    /// Current configuration snapshot
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the whole configuration after validating it
    pub fn update(&self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        let mut guard = self
            .inner
            .write()
            .map_err(|_| DecisionError::Internal("config lock poisoned".into()))?;
        *guard = Arc::new(config);
        info!("Configuration snapshot replaced");
        Ok(())
    }

    /// Adjust the blend coefficient within its allowed range
    pub fn set_alpha(&self, alpha: f64) -> Result<()> {
        validate_alpha(alpha)?;
        let mut next = (*self.snapshot()).clone();
        next.strategy.alpha = alpha;
        self.update(next)
    }
}
