//! Loading foreman rules from TOML.
//!
//! Times are RFC 3339 strings:
//!
//! ```toml
//! [[rules]]
//! hunt_id = "H:1A2B3C"
//! description = "collect sshd config from linux hosts"
//! creation_time = "2026-01-01T00:00:00Z"
//! expiration_time = "2026-02-01T00:00:00Z"
//!
//! [rules.client_rule_set]
//! match_mode = "MATCH_ALL"
//!
//! [[rules.client_rule_set.rules]]
//! rule_type = "OS"
//! os_linux = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use fleet_contracts::{
    error::{FleetError, FleetResult},
    foreman::ForemanRule,
};
use fleet_core::traits::RuleStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<ForemanRule>,
}

impl RuleFile {
    /// Parse `s` as TOML.
    ///
    /// Returns `FleetError::ConfigError` if the TOML is malformed or does not
    /// match the rule schema.
    pub fn from_toml_str(s: &str) -> FleetResult<Self> {
        toml::from_str(s).map_err(|e| FleetError::ConfigError {
            reason: format!("failed to parse foreman rules TOML: {}", e),
        })
    }

    pub fn from_file(path: &Path) -> FleetResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| FleetError::ConfigError {
            reason: format!("failed to read foreman rules file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Write every rule to `store`. Returns the number written.
    pub fn install(&self, store: &dyn RuleStore) -> FleetResult<usize> {
        for rule in &self.rules {
            store.write_foreman_rule(rule)?;
        }
        info!(count = self.rules.len(), "installed foreman rules");
        Ok(self.rules.len())
    }
}
