//! Foreman rule records and the client metadata they are evaluated against.
//!
//! These are data definitions only. Evaluation lives in `fleet-foreman`.
//! The serde layout doubles as the TOML rule-file format:
//!
//! ```toml
//! [[rules]]
//! hunt_id = "H:1A2B3C"
//! creation_time = "2026-01-01T00:00:00Z"
//! expiration_time = "2026-02-01T00:00:00Z"
//!
//! [rules.client_rule_set]
//! match_mode = "MATCH_ALL"
//!
//! [[rules.client_rule_set.rules]]
//! rule_type = "REGEX"
//! field = "SYSTEM"
//! attribute_regex = "Linux"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ClientId, HuntId};

/// A fleet-wide task trigger stored in the rule store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForemanRule {
    /// The hunt to start on matching clients. Doubles as the flow id.
    pub hunt_id: HuntId,
    #[serde(default)]
    pub description: String,
    pub creation_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    #[serde(default)]
    pub client_rule_set: ClientRuleSet,
}

/// How the sub-rules of a rule set combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMode {
    #[default]
    MatchAll,
    MatchAny,
}

/// An ordered set of sub-rules combined by `match_mode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRuleSet {
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub rules: Vec<ClientRule>,
}

/// One typed sub-rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientRule {
    Os(OsRule),
    Label(LabelRule),
    Regex(RegexRule),
    Integer(IntegerRule),
}

/// Operating system family membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub os_windows: bool,
    #[serde(default)]
    pub os_linux: bool,
    #[serde(default)]
    pub os_darwin: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelMatchMode {
    #[default]
    MatchAll,
    MatchAny,
    DoesNotMatchAll,
    DoesNotMatchAny,
}

/// Label set membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule {
    pub label_names: Vec<String>,
    #[serde(default)]
    pub match_mode: LabelMatchMode,
}

/// Client attributes a regex rule can inspect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegexField {
    #[default]
    Unset,
    ClientName,
    Usernames,
    Uname,
    Fqdn,
    HostIps,
    ClientDescription,
    System,
    MacAddresses,
    KernelVersion,
    OsVersion,
    OsRelease,
    ClientLabels,
    ClientId,
}

/// Regex search over a named client attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexRule {
    #[serde(default)]
    pub field: RegexField,
    pub attribute_regex: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegerOperator {
    Equal,
    LessThan,
    GreaterThan,
}

/// Client attributes an integer rule can compare. Times are compared as
/// seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegerField {
    #[default]
    Unset,
    ClientVersion,
    InstallTime,
    LastBootTime,
    ClientClock,
}

/// Integer comparison over a named client attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerRule {
    pub operator: IntegerOperator,
    pub value: u64,
    #[serde(default)]
    pub field: IntegerField,
}

/// Everything the foreman knows about a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFullInfo {
    pub client_id: ClientId,
    #[serde(default)]
    pub fqdn: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_description: String,
    #[serde(default)]
    pub client_version: u64,
    /// OS family as reported by the agent: `Windows`, `Linux` or `Darwin`.
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub os_release: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub usernames: Vec<String>,
    #[serde(default)]
    pub host_ips: Vec<String>,
    #[serde(default)]
    pub mac_addresses: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub install_time: Option<DateTime<Utc>>,
    pub last_boot_time: Option<DateTime<Utc>>,
    pub client_clock: Option<DateTime<Utc>>,
}

impl ClientFullInfo {
    /// A record with every attribute empty.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            fqdn: String::new(),
            client_name: String::new(),
            client_description: String::new(),
            client_version: 0,
            system: String::new(),
            os_release: String::new(),
            os_version: String::new(),
            kernel_version: String::new(),
            usernames: Vec::new(),
            host_ips: Vec::new(),
            mac_addresses: Vec::new(),
            labels: Vec::new(),
            install_time: None,
            last_boot_time: None,
            client_clock: None,
        }
    }
}
