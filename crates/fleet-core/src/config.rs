//! Orchestrator configuration.
//!
//! ```toml
//! [throttle]
//! daily_request_limit = 20
//! duplicate_interval_secs = 1200
//!
//! [blob_wait]
//! delay_ms = 1000
//! max_attempts = 10
//! ```
//!
//! Every key is optional. Zero limits disable the corresponding throttle.

use std::path::Path;

use serde::{Deserialize, Serialize};

use fleet_contracts::error::{FleetError, FleetResult};

use crate::wait::WaitPolicy;

/// Per-user flow creation limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Flows one user may start on one client per day. `0` disables.
    pub daily_request_limit: u32,
    /// Window in which an identical flow may not be started again. `0` disables.
    pub duplicate_interval_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub throttle: ThrottleConfig,
    pub blob_wait: WaitPolicy,
}

impl OrchestratorConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `FleetError::ConfigError` if the TOML is malformed or does not
    /// match `OrchestratorConfig`.
    pub fn from_toml_str(s: &str) -> FleetResult<Self> {
        toml::from_str(s).map_err(|e| FleetError::ConfigError {
            reason: format!("failed to parse orchestrator TOML: {}", e),
        })
    }

    pub fn from_file(path: &Path) -> FleetResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| FleetError::ConfigError {
            reason: format!("failed to read orchestrator config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
