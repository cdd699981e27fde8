//! Evaluation of client rules against client metadata.
//!
//! `Evaluate` is implemented for every rule shape. Rule sets combine their
//! sub-rules by match mode; an empty set is true under `MATCH_ALL` and false
//! under `MATCH_ANY`.

use regex::RegexBuilder;

use fleet_contracts::{
    error::{FleetError, FleetResult},
    foreman::{
        ClientFullInfo, ClientRule, ClientRuleSet, IntegerField, IntegerOperator, IntegerRule,
        LabelMatchMode, LabelRule, MatchMode, OsRule, RegexField, RegexRule,
    },
};

/// A predicate over a client.
///
/// Errors signal a malformed rule (an unset field selector, an invalid
/// pattern), never a non-match.
pub trait Evaluate {
    fn evaluate(&self, client: &ClientFullInfo) -> FleetResult<bool>;
}

impl Evaluate for ClientRuleSet {
    fn evaluate(&self, client: &ClientFullInfo) -> FleetResult<bool> {
        match self.match_mode {
            MatchMode::MatchAll => {
                for rule in &self.rules {
                    if !rule.evaluate(client)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            MatchMode::MatchAny => {
                for rule in &self.rules {
                    if rule.evaluate(client)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl Evaluate for ClientRule {
    fn evaluate(&self, client: &ClientFullInfo) -> FleetResult<bool> {
        match self {
            ClientRule::Os(rule) => rule.evaluate(client),
            ClientRule::Label(rule) => rule.evaluate(client),
            ClientRule::Regex(rule) => rule.evaluate(client),
            ClientRule::Integer(rule) => rule.evaluate(client),
        }
    }
}

impl Evaluate for OsRule {
    fn evaluate(&self, client: &ClientFullInfo) -> FleetResult<bool> {
        Ok(match client.system.as_str() {
            "Windows" => self.os_windows,
            "Linux" => self.os_linux,
            "Darwin" => self.os_darwin,
            _ => false,
        })
    }
}

impl Evaluate for LabelRule {
    fn evaluate(&self, client: &ClientFullInfo) -> FleetResult<bool> {
        let has = |name: &String| client.labels.contains(name);
        Ok(match self.match_mode {
            LabelMatchMode::MatchAll => self.label_names.iter().all(has),
            LabelMatchMode::MatchAny => self.label_names.iter().any(has),
            LabelMatchMode::DoesNotMatchAll => !self.label_names.iter().all(has),
            LabelMatchMode::DoesNotMatchAny => !self.label_names.iter().any(has),
        })
    }
}

/// The attribute text a regex rule searches in. List attributes are joined
/// with single spaces.
fn regex_attribute(rule: &RegexRule, client: &ClientFullInfo) -> FleetResult<String> {
    Ok(match rule.field {
        RegexField::Unset => {
            return Err(FleetError::InvalidRule {
                reason: "regex rule has no field set".to_string(),
            })
        }
        RegexField::ClientName => client.client_name.clone(),
        RegexField::Usernames => client.usernames.join(" "),
        RegexField::Uname => format!("{}-{}-{}", client.system, client.os_release, client.os_version),
        RegexField::Fqdn => client.fqdn.clone(),
        RegexField::HostIps => client.host_ips.join(" "),
        RegexField::ClientDescription => client.client_description.clone(),
        RegexField::System => client.system.clone(),
        RegexField::MacAddresses => client.mac_addresses.join(" "),
        RegexField::KernelVersion => client.kernel_version.clone(),
        RegexField::OsVersion => client.os_version.clone(),
        RegexField::OsRelease => client.os_release.clone(),
        RegexField::ClientLabels => client.labels.join(" "),
        RegexField::ClientId => client.client_id.to_string(),
    })
}

impl Evaluate for RegexRule {
    /// Case-insensitive search anywhere in the attribute.
    fn evaluate(&self, client: &ClientFullInfo) -> FleetResult<bool> {
        let attribute = regex_attribute(self, client)?;
        let re = RegexBuilder::new(&self.attribute_regex)
            .case_insensitive(true)
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| FleetError::InvalidPattern {
                pattern: self.attribute_regex.clone(),
                reason: e.to_string(),
            })?;
        Ok(re.is_match(&attribute))
    }
}

/// The attribute value an integer rule compares; times are seconds since the
/// epoch, absent times 0.
fn integer_attribute(rule: &IntegerRule, client: &ClientFullInfo) -> FleetResult<u64> {
    let seconds = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| u64::try_from(t.timestamp()).unwrap_or(0)).unwrap_or(0)
    };
    Ok(match rule.field {
        IntegerField::Unset => {
            return Err(FleetError::InvalidRule {
                reason: "integer rule has no field set".to_string(),
            })
        }
        IntegerField::ClientVersion => client.client_version,
        IntegerField::InstallTime => seconds(client.install_time),
        IntegerField::LastBootTime => seconds(client.last_boot_time),
        IntegerField::ClientClock => seconds(client.client_clock),
    })
}

impl Evaluate for IntegerRule {
    fn evaluate(&self, client: &ClientFullInfo) -> FleetResult<bool> {
        let value = integer_attribute(self, client)?;
        Ok(match self.operator {
            IntegerOperator::Equal => value == self.value,
            IntegerOperator::LessThan => value < self.value,
            IntegerOperator::GreaterThan => value > self.value,
        })
    }
}
