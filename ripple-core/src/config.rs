//! Engine configuration.
//!
//! Configuration is plain data with serde defaults, so a host can embed an
//! `"observation"` section in its own JSON config or build one in code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// When a watcher re-evaluates after one of its dependencies changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Re-evaluate before the mutating call returns.
    Sync,
    /// Mark dirty and re-evaluate on the next task-queue turn.
    #[default]
    Async,
}

/// Settings for the dirty-check fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirtyCheckSettings {
    /// Poll interval of the dirty-check loop, in milliseconds.
    pub interval_ms: u64,
    /// Stop polling altogether. Dirty-check properties then never notify.
    pub disabled: bool,
    /// Emit a warning whenever a property falls back to dirty checking.
    pub warn: bool,
}

impl Default for DirtyCheckSettings {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            disabled: false,
            warn: true,
        }
    }
}

impl DirtyCheckSettings {
    pub fn interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Top-level configuration consumed by [`ObserverLocator`](crate::observer::ObserverLocator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    pub dirty_check: DirtyCheckSettings,
    /// Flush mode of watchers built with `with_default_flush`.
    pub default_flush: FlushMode,
    /// Whether computed getters and watcher compute functions receive a
    /// proxied target.
    pub use_proxy: bool,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            dirty_check: DirtyCheckSettings::default(),
            default_flush: FlushMode::default(),
            use_proxy: true,
        }
    }
}

impl ObservationConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}
