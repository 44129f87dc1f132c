//! Engine configuration.

use crate::error::{EntitleError, EntitleResult};
use entitle_types::{ProductId, ProductType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// First reconnect delay, and the delay restored after a successful
    /// connection (ms).
    pub initial_delay_ms: u64,
    /// Upper bound on the reconnect delay (ms).
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 15 * 60 * 1_000,
        }
    }
}

impl ReconnectConfig {
    /// The floor delay.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// The ceiling delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base64 public key used to verify purchase signatures.
    pub public_key: String,
    /// Product ids to synchronize from the catalog.
    pub product_ids: Vec<ProductId>,
    /// Product type queried for both catalog and purchases.
    #[serde(default)]
    pub product_type: ProductType,
    /// Reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl EngineConfig {
    /// Creates a configuration for one-time products with default backoff.
    pub fn new<I, P>(public_key: impl Into<String>, product_ids: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProductId>,
    {
        Self {
            public_key: public_key.into(),
            product_ids: product_ids.into_iter().map(Into::into).collect(),
            product_type: ProductType::default(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> EntitleResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings that do not need the key decoded.
    ///
    /// # Errors
    ///
    /// Returns [`EntitleError::Config`] describing the first problem found.
    pub fn validate(&self) -> EntitleResult<()> {
        if self.public_key.trim().is_empty() {
            return Err(EntitleError::Config("public key is empty".to_string()));
        }
        if self.product_ids.is_empty() {
            return Err(EntitleError::Config("no product ids configured".to_string()));
        }
        if let Some(id) = self.product_ids.iter().find(|id| id.is_empty()) {
            return Err(EntitleError::Config(format!("empty product id: {id:?}")));
        }
        if self.reconnect.initial_delay_ms == 0 {
            return Err(EntitleError::Config("reconnect delay must be positive".to_string()));
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            return Err(EntitleError::Config(
                "max reconnect delay is below the initial delay".to_string(),
            ));
        }
        Ok(())
    }
}
