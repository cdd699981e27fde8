//! # fleet-foreman
//!
//! The foreman rule engine: when a client checks in, decide which fleet-wide
//! hunts must be started on it.
//!
//! - `rule`: client rule evaluation (`Evaluate`)
//! - `engine`: the `Foreman` and its per-client marker bookkeeping
//! - `hunt`: the `HuntRunner` hooks and the orchestrator-backed `HuntRegistry`
//! - `rules_file`: TOML rule files
//!
//! ## Usage
//!
//! ```rust,ignore
//! let rules = RuleFile::from_file(Path::new("rules/fleet.toml"))?;
//! rules.install(store.as_ref())?;
//!
//! let foreman = Foreman::new(store.clone(), store.clone(), store.clone(), hunts);
//! let started = foreman.assign_tasks_to_client(&client_id)?;
//! ```

pub mod engine;
pub mod hunt;
pub mod rule;
pub mod rules_file;

pub use engine::Foreman;
pub use hunt::{HuntRegistry, HuntRunner, HuntState};
pub use rule::Evaluate;
pub use rules_file::RuleFile;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use fleet_audit::InMemoryAuditWriter;
    use fleet_contracts::{
        error::{FleetError, FleetResult},
        flow::{FlowRecord, FlowState},
        foreman::{
            ClientFullInfo, ClientRule, ClientRuleSet, ForemanRule, IntegerField, IntegerOperator,
            IntegerRule, LabelMatchMode, LabelRule, MatchMode, OsRule, RegexField, RegexRule,
        },
        ids::{ClientId, FlowId, FlowKey, HuntId},
        message::ActionRequest,
        payload::{AnyPayload, EmptyArgs},
    };
    use fleet_core::{
        flow::{ContinuationTable, Flow, FlowContext, FlowResult},
        orchestrator::Orchestrator,
        traits::{ClientStore, Connector, FlowStore, RuleStore},
        OrchestratorConfig,
    };
    use fleet_store::InMemoryDatastore;

    use super::{Evaluate, Foreman, HuntRegistry, HuntRunner, HuntState, RuleFile};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn client_id() -> ClientId {
        ClientId::new("C.1000000000000000")
    }

    fn linux_client() -> ClientFullInfo {
        let mut info = ClientFullInfo::new(client_id());
        info.system = "Linux".to_string();
        info.os_release = "Debian".to_string();
        info.os_version = "12.4".to_string();
        info.kernel_version = "6.1.0-17-amd64".to_string();
        info.fqdn = "foo.bar.example.com".to_string();
        info.client_name = "Host-0".to_string();
        info.usernames = vec!["user1".to_string(), "user2".to_string()];
        info.host_ips = vec!["192.168.0.10".to_string(), "2001:abcd::1".to_string()];
        info.labels = vec!["hello".to_string(), "world".to_string()];
        info.client_version = 3400;
        info
    }

    fn os(windows: bool, linux: bool, darwin: bool) -> ClientRule {
        ClientRule::Os(OsRule {
            os_windows: windows,
            os_linux: linux,
            os_darwin: darwin,
        })
    }

    fn regex(field: RegexField, pattern: &str) -> RegexRule {
        RegexRule {
            field,
            attribute_regex: pattern.to_string(),
        }
    }

    fn label(mode: LabelMatchMode, names: &[&str]) -> LabelRule {
        LabelRule {
            label_names: names.iter().map(|n| n.to_string()).collect(),
            match_mode: mode,
        }
    }

    fn rule_set(mode: MatchMode, rules: Vec<ClientRule>) -> ClientRuleSet {
        ClientRuleSet { match_mode: mode, rules }
    }

    // ── Rule sets ─────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_rule_set_truth_table() {
        let info = linux_client();
        assert!(rule_set(MatchMode::MatchAll, vec![]).evaluate(&info).unwrap());
        assert!(!rule_set(MatchMode::MatchAny, vec![]).evaluate(&info).unwrap());
    }

    #[test]
    fn test_one_false_rule_fails_match_all() {
        let info = linux_client();
        let rules = vec![os(false, true, false), os(true, false, false)];
        assert!(!rule_set(MatchMode::MatchAll, rules.clone()).evaluate(&info).unwrap());
        assert!(rule_set(MatchMode::MatchAny, rules).evaluate(&info).unwrap());
    }

    #[test]
    fn test_all_true_rules_pass_match_all() {
        let info = linux_client();
        let rules = vec![
            os(false, true, false),
            ClientRule::Regex(regex(RegexField::Fqdn, "example")),
        ];
        assert!(rule_set(MatchMode::MatchAll, rules).evaluate(&info).unwrap());
    }

    #[test]
    fn test_no_matching_rule_fails_match_any() {
        let info = linux_client();
        let rules = vec![os(true, false, true), ClientRule::Label(label(LabelMatchMode::MatchAny, &["nope"]))];
        assert!(!rule_set(MatchMode::MatchAny, rules).evaluate(&info).unwrap());
    }

    // ── OS rules ──────────────────────────────────────────────────────────────

    #[test]
    fn test_os_rule_with_no_flags_never_matches() {
        let mut info = linux_client();
        for system in ["Windows", "Linux", "Darwin"] {
            info.system = system.to_string();
            assert!(!os(false, false, false).evaluate(&info).unwrap());
        }
    }

    #[test]
    fn test_os_rule_matches_selected_family_only() {
        let mut info = linux_client();
        assert!(os(false, true, false).evaluate(&info).unwrap());
        assert!(!os(true, false, true).evaluate(&info).unwrap());

        info.system = "Darwin".to_string();
        assert!(os(false, false, true).evaluate(&info).unwrap());
        assert!(!os(false, true, false).evaluate(&info).unwrap());
    }

    // ── Label rules ───────────────────────────────────────────────────────────

    #[test]
    fn test_label_match_modes() {
        let info = linux_client();
        let eval = |mode, names: &[&str]| label(mode, names).evaluate(&info).unwrap();

        assert!(!eval(LabelMatchMode::MatchAll, &["arbitrary text"]));
        assert!(eval(LabelMatchMode::MatchAll, &["world"]));
        assert!(eval(LabelMatchMode::MatchAny, &["nowhere", "world"]));
        assert!(!eval(LabelMatchMode::MatchAny, &["nowhere", "nope"]));
        assert!(eval(LabelMatchMode::MatchAll, &["hello", "world"]));
        assert!(!eval(LabelMatchMode::MatchAll, &["hello", "nope"]));
        assert!(!eval(LabelMatchMode::DoesNotMatchAny, &["nope", "world"]));
        assert!(eval(LabelMatchMode::DoesNotMatchAny, &["nope", "nada"]));
        assert!(!eval(LabelMatchMode::DoesNotMatchAll, &["hello", "world"]));
        assert!(eval(LabelMatchMode::DoesNotMatchAll, &["hello", "nope"]));
    }

    // ── Regex rules ───────────────────────────────────────────────────────────

    #[test]
    fn test_regex_searches_the_attribute() {
        let info = linux_client();
        assert!(regex(RegexField::System, "^Linux$").evaluate(&info).unwrap());
        assert!(regex(RegexField::KernelVersion, "amd64").evaluate(&info).unwrap());
        assert!(!regex(RegexField::KernelVersion, "^4").evaluate(&info).unwrap());
        assert!(regex(RegexField::Fqdn, r"foo.*\.example\.com").evaluate(&info).unwrap());
        assert!(!regex(RegexField::Fqdn, "localhost").evaluate(&info).unwrap());
        assert!(regex(RegexField::OsRelease, r"\bDebian\b").evaluate(&info).unwrap());
    }

    #[test]
    fn test_regex_over_list_attributes() {
        let info = linux_client();
        assert!(regex(RegexField::Usernames, "user2").evaluate(&info).unwrap());
        assert!(!regex(RegexField::Usernames, "root").evaluate(&info).unwrap());
        assert!(regex(RegexField::HostIps, r"\b192\.168\.0\.\d+\b").evaluate(&info).unwrap());
        assert!(regex(RegexField::HostIps, r"\b2001:abcd::").evaluate(&info).unwrap());
        assert!(!regex(RegexField::HostIps, "10\\.0").evaluate(&info).unwrap());
        assert!(regex(RegexField::ClientLabels, "ell").evaluate(&info).unwrap());
        assert!(regex(RegexField::ClientLabels, "hello world").evaluate(&info).unwrap());
    }

    #[test]
    fn test_regex_uname_and_client_id() {
        let info = linux_client();
        assert!(regex(RegexField::Uname, "^Linux-Debian-12.4$").evaluate(&info).unwrap());
        assert!(regex(RegexField::ClientId, r"c\.10.*").evaluate(&info).unwrap());
        assert!(!regex(RegexField::ClientId, "abc").evaluate(&info).unwrap());
    }

    #[test]
    fn test_regex_unset_field_is_an_error() {
        let info = linux_client();
        assert!(matches!(
            regex(RegexField::Unset, "foo").evaluate(&info),
            Err(FleetError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_regex_invalid_pattern_is_an_error() {
        let info = linux_client();
        assert!(matches!(
            regex(RegexField::Fqdn, "(unclosed").evaluate(&info),
            Err(FleetError::InvalidPattern { .. })
        ));
    }

    // ── Integer rules ─────────────────────────────────────────────────────────

    fn integer(field: IntegerField, operator: IntegerOperator, value: u64) -> IntegerRule {
        IntegerRule { operator, value, field }
    }

    #[test]
    fn test_integer_comparisons() {
        let boot = Utc.with_ymd_and_hms(2026, 4, 1, 6, 0, 0).unwrap();
        let mut info = linux_client();
        info.last_boot_time = Some(boot);
        let secs = boot.timestamp() as u64;

        assert!(!integer(IntegerField::LastBootTime, IntegerOperator::LessThan, secs)
            .evaluate(&info)
            .unwrap());
        assert!(integer(IntegerField::LastBootTime, IntegerOperator::GreaterThan, secs - 1)
            .evaluate(&info)
            .unwrap());
        assert!(integer(IntegerField::LastBootTime, IntegerOperator::Equal, secs)
            .evaluate(&info)
            .unwrap());
        assert!(integer(IntegerField::ClientVersion, IntegerOperator::LessThan, 3500)
            .evaluate(&info)
            .unwrap());
    }

    #[test]
    fn test_integer_absent_time_is_zero() {
        let info = linux_client();
        assert!(integer(IntegerField::InstallTime, IntegerOperator::Equal, 0)
            .evaluate(&info)
            .unwrap());
    }

    #[test]
    fn test_integer_unset_field_is_an_error() {
        let info = linux_client();
        assert!(matches!(
            integer(IntegerField::Unset, IntegerOperator::Equal, 0).evaluate(&info),
            Err(FleetError::InvalidRule { .. })
        ));
    }

    // ── Foreman ───────────────────────────────────────────────────────────────

    /// A hunt runner that records calls and writes the hunt flow record.
    #[derive(Default)]
    struct MockHunts {
        store: Option<InMemoryDatastore>,
        started: Mutex<Vec<(ClientId, HuntId)>>,
        completed: Mutex<Vec<HuntId>>,
        failing: Vec<HuntId>,
    }

    impl HuntRunner for MockHunts {
        fn start_hunt_flow_on_client(&self, client_id: &ClientId, hunt_id: &HuntId) -> FleetResult<()> {
            if self.failing.contains(hunt_id) {
                return Err(FleetError::Store {
                    reason: "flow store unavailable".to_string(),
                });
            }
            if let Some(store) = &self.store {
                let mut record = flow_record(FlowId::from(hunt_id));
                record.parent_hunt_id = Some(hunt_id.clone());
                store.write_flow(&record)?;
            }
            self.started.lock().unwrap().push((client_id.clone(), hunt_id.clone()));
            Ok(())
        }

        fn complete_hunt_if_expired(&self, hunt_id: &HuntId) -> FleetResult<bool> {
            self.completed.lock().unwrap().push(hunt_id.clone());
            Ok(true)
        }
    }

    fn flow_record(flow_id: FlowId) -> FlowRecord {
        let now = Utc::now();
        FlowRecord {
            client_id: client_id(),
            flow_id,
            flow_name: "Hunted".to_string(),
            creator: "GRRWorker".to_string(),
            args: AnyPayload::pack(&EmptyArgs::default()).unwrap(),
            state: FlowState::Running,
            error_message: None,
            parent_flow_id: None,
            parent_request_id: None,
            parent_hunt_id: None,
            next_request_id: 1,
            create_time: now,
            last_update_time: now,
        }
    }

    fn foreman_rule(hunt: &str, created: DateTime<Utc>, rules: Vec<ClientRule>) -> ForemanRule {
        ForemanRule {
            hunt_id: HuntId::new(hunt),
            description: String::new(),
            creation_time: created,
            expiration_time: created + Duration::days(7),
            client_rule_set: rule_set(MatchMode::MatchAll, rules),
        }
    }

    fn setup(hunts: MockHunts) -> (InMemoryDatastore, Arc<MockHunts>, Foreman) {
        setup_on(InMemoryDatastore::new(), hunts)
    }

    fn setup_on(store: InMemoryDatastore, hunts: MockHunts) -> (InMemoryDatastore, Arc<MockHunts>, Foreman) {
        store.write_client_info(&linux_client()).unwrap();
        let hunts = Arc::new(hunts);
        let foreman = Foreman::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            hunts.clone(),
        );
        (store, hunts, foreman)
    }

    #[test]
    fn test_matching_rule_starts_hunt_and_advances_marker() {
        let (store, hunts, foreman) = setup(MockHunts::default());
        let now = Utc::now();
        let created = now - Duration::hours(1);
        store
            .write_foreman_rule(&foreman_rule("H:LINUX", created, vec![os(false, true, false)]))
            .unwrap();
        store
            .write_foreman_rule(&foreman_rule("H:WIN", created - Duration::minutes(5), vec![os(true, false, false)]))
            .unwrap();

        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 1);
        assert_eq!(
            *hunts.started.lock().unwrap(),
            vec![(client_id(), HuntId::new("H:LINUX"))]
        );
        assert_eq!(store.read_last_foreman_time(&client_id()).unwrap(), Some(created));

        // Nothing newer than the marker: no work, even for matching rules.
        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 0);
        assert_eq!(hunts.started.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_rules_older_than_marker_are_skipped() {
        let (store, hunts, foreman) = setup(MockHunts::default());
        let now = Utc::now();
        store
            .write_foreman_rule(&foreman_rule("H:OLD", now - Duration::hours(3), vec![]))
            .unwrap();
        store
            .write_last_foreman_time(&client_id(), now - Duration::hours(2))
            .unwrap();
        store
            .write_foreman_rule(&foreman_rule("H:NEW", now - Duration::hours(1), vec![]))
            .unwrap();

        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 1);
        assert_eq!(hunts.started.lock().unwrap()[0].1, HuntId::new("H:NEW"));
    }

    #[test]
    fn test_restarting_same_hunt_is_idempotent() {
        let store = InMemoryDatastore::new();
        let (store, hunts, foreman) = setup_on(
            store.clone(),
            MockHunts {
                store: Some(store),
                ..MockHunts::default()
            },
        );
        let now = Utc::now();
        store
            .write_foreman_rule(&foreman_rule("H:ONCE", now - Duration::hours(1), vec![]))
            .unwrap();

        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 1);

        // Forget the marker so the rule is considered again.
        store.write_last_foreman_time(&client_id(), DateTime::UNIX_EPOCH).unwrap();
        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 0);
        assert_eq!(hunts.started.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unrelated_flow_with_hunt_id_is_a_conflict() {
        let (store, hunts, foreman) = setup(MockHunts::default());
        let now = Utc::now();
        store.write_flow(&flow_record(FlowId::new("H:TAKEN"))).unwrap();
        store
            .write_foreman_rule(&foreman_rule("H:TAKEN", now - Duration::hours(1), vec![]))
            .unwrap();

        match foreman.assign_tasks_at(&client_id(), now) {
            Err(FleetError::HuntConflict { hunt_id, flow_id, .. }) => {
                assert_eq!(hunt_id, "H:TAKEN");
                assert_eq!(flow_id, "H:TAKEN");
            }
            other => panic!("expected HuntConflict, got {:?}", other),
        }
        assert!(hunts.started.lock().unwrap().is_empty());
    }

    #[test]
    fn test_start_failure_does_not_stop_other_rules() {
        let (store, hunts, foreman) = setup(MockHunts {
            failing: vec![HuntId::new("H:A")],
            ..MockHunts::default()
        });
        let now = Utc::now();
        store
            .write_foreman_rule(&foreman_rule("H:A", now - Duration::hours(2), vec![]))
            .unwrap();
        store
            .write_foreman_rule(&foreman_rule("H:B", now - Duration::hours(1), vec![]))
            .unwrap();

        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 1);
        assert_eq!(hunts.started.lock().unwrap()[0].1, HuntId::new("H:B"));
    }

    #[test]
    fn test_expired_rules_complete_their_hunt_and_are_purged() {
        let (store, hunts, foreman) = setup(MockHunts::default());
        let now = Utc::now();
        let mut expired = foreman_rule("H:GONE", now - Duration::days(10), vec![]);
        expired.expiration_time = now - Duration::days(1);
        store.write_foreman_rule(&expired).unwrap();
        store
            .write_foreman_rule(&foreman_rule("H:LIVE", now - Duration::hours(1), vec![]))
            .unwrap();

        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 1);
        assert_eq!(*hunts.completed.lock().unwrap(), vec![HuntId::new("H:GONE")]);
        let remaining = store.read_all_foreman_rules().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].hunt_id, HuntId::new("H:LIVE"));
    }

    #[test]
    fn test_rule_expiring_after_last_check_is_still_purged() {
        let (store, hunts, foreman) = setup(MockHunts::default());
        let now = Utc::now();
        let created = now - Duration::hours(2);
        let mut short = foreman_rule("H:SHORT", created, vec![]);
        short.expiration_time = now - Duration::hours(1);
        store.write_foreman_rule(&short).unwrap();
        store.write_last_foreman_time(&client_id(), created).unwrap();

        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 0);
        assert!(hunts.started.lock().unwrap().is_empty());
        assert_eq!(*hunts.completed.lock().unwrap(), vec![HuntId::new("H:SHORT")]);
        assert!(store.read_all_foreman_rules().unwrap().is_empty());
        assert_eq!(store.read_last_foreman_time(&client_id()).unwrap(), Some(created));
    }

    #[test]
    fn test_unknown_client_starts_nothing_but_advances_marker() {
        let (store, hunts, foreman) = setup(MockHunts::default());
        let now = Utc::now();
        let created = now - Duration::hours(1);
        store.write_foreman_rule(&foreman_rule("H:X", created, vec![])).unwrap();

        let stranger = ClientId::new("C.ffffffffffffffff");
        assert_eq!(foreman.assign_tasks_at(&stranger, now).unwrap(), 0);
        assert!(hunts.started.lock().unwrap().is_empty());
        assert_eq!(store.read_last_foreman_time(&stranger).unwrap(), Some(created));
    }

    #[test]
    fn test_no_rules_means_no_work() {
        let (store, _hunts, foreman) = setup(MockHunts::default());
        assert_eq!(foreman.assign_tasks_to_client(&client_id()).unwrap(), 0);
        assert_eq!(store.read_last_foreman_time(&client_id()).unwrap(), None);
    }

    #[test]
    fn test_process_check_ins_sums_and_survives_failures() {
        let (store, hunts, foreman) = setup(MockHunts::default());
        let now = Utc::now();
        store
            .write_foreman_rule(&foreman_rule("H:ALL", now - Duration::hours(1), vec![]))
            .unwrap();
        // Linux clients short-circuit before the malformed sub-rule.
        let mut mixed = foreman_rule("H:MIXED", now - Duration::hours(2), vec![]);
        mixed.client_rule_set = rule_set(
            MatchMode::MatchAny,
            vec![
                os(false, true, false),
                ClientRule::Regex(regex(RegexField::Unset, "x")),
            ],
        );
        store.write_foreman_rule(&mixed).unwrap();

        let mut windows = linux_client();
        windows.client_id = ClientId::new("C.2");
        windows.system = "Windows".to_string();
        store.write_client_info(&windows).unwrap();

        let total = foreman.process_check_ins(&[ClientId::new("C.2"), client_id()]);
        assert_eq!(total, 2);
        let linux_starts = hunts
            .started
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == client_id())
            .count();
        assert_eq!(linux_starts, 2);
    }

    // ── Hunt registry ─────────────────────────────────────────────────────────

    struct NullConnector {
        sent: Mutex<Vec<ActionRequest>>,
    }

    impl Connector for NullConnector {
        fn send(&self, request: &ActionRequest) -> FleetResult<()> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum Step {
        Done,
    }

    struct Interrogate {
        args: EmptyArgs,
    }

    impl Flow for Interrogate {
        const NAME: &'static str = "Interrogate";
        type Args = EmptyArgs;
        type State = Step;

        fn args(&self) -> &EmptyArgs {
            &self.args
        }

        fn continuations() -> ContinuationTable<Self> {
            ContinuationTable::new()
        }

        fn start(&mut self, ctx: &mut FlowContext<'_, Step>) -> FlowResult<()> {
            ctx.call_action("get_platform_info", &EmptyArgs::default(), vec![], Step::Done)?;
            Ok(())
        }
    }

    #[test]
    fn test_hunt_registry_starts_flows_through_the_orchestrator() {
        let store = InMemoryDatastore::new();
        store.write_client_info(&linux_client()).unwrap();
        let connector = Arc::new(NullConnector { sent: Mutex::new(vec![]) });
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(store.clone()),
            connector.clone(),
            Arc::new(InMemoryAuditWriter::new("foreman-test")),
            &OrchestratorConfig::default(),
        ));
        let registry = Arc::new(HuntRegistry::new(orchestrator));
        let hunt = HuntId::new("H:ABCDEF");
        registry
            .register(&hunt, "alice", || Interrogate { args: EmptyArgs::default() })
            .unwrap();

        let foreman = Foreman::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            registry.clone(),
        );
        let now = Utc::now();
        store
            .write_foreman_rule(&foreman_rule("H:ABCDEF", now - Duration::hours(1), vec![]))
            .unwrap();

        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 1);

        let record = store
            .read_flow(&FlowKey::new(client_id(), FlowId::new("H:ABCDEF")))
            .unwrap()
            .unwrap();
        assert_eq!(record.parent_hunt_id, Some(hunt.clone()));
        assert_eq!(record.creator, "alice");
        assert_eq!(record.flow_name, "Interrogate");
        assert_eq!(connector.sent.lock().unwrap().len(), 1);
        assert_eq!(registry.clients_started(&hunt).unwrap(), vec![client_id()]);

        // A second evaluation of the same rule is a no-op.
        store.write_last_foreman_time(&client_id(), DateTime::UNIX_EPOCH).unwrap();
        assert_eq!(foreman.assign_tasks_at(&client_id(), now).unwrap(), 0);
        assert_eq!(connector.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_completed_hunt_starts_no_more_flows() {
        let store = InMemoryDatastore::new();
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(store.clone()),
            Arc::new(NullConnector { sent: Mutex::new(vec![]) }),
            Arc::new(InMemoryAuditWriter::new("foreman-test")),
            &OrchestratorConfig::default(),
        ));
        let registry = HuntRegistry::new(orchestrator);
        let hunt = HuntId::new("H:DONE");
        registry
            .register(&hunt, "alice", || Interrogate { args: EmptyArgs::default() })
            .unwrap();

        assert!(registry.complete_hunt_if_expired(&hunt).unwrap());
        assert!(!registry.complete_hunt_if_expired(&hunt).unwrap());
        assert_eq!(registry.hunt_state(&hunt).unwrap(), Some(HuntState::Completed));

        registry.start_hunt_flow_on_client(&client_id(), &hunt).unwrap();
        assert!(registry.clients_started(&hunt).unwrap().is_empty());

        assert!(matches!(
            registry.start_hunt_flow_on_client(&client_id(), &HuntId::new("H:NONE")),
            Err(FleetError::UnknownHunt { .. })
        ));
    }

    // ── Rule files ────────────────────────────────────────────────────────────

    #[test]
    fn test_rule_file_parses_and_installs() {
        let toml = r#"
[[rules]]
hunt_id = "H:1A2B3C"
description = "linux hosts labelled web"
creation_time = "2026-01-01T00:00:00Z"
expiration_time = "2026-02-01T00:00:00Z"

[rules.client_rule_set]
match_mode = "MATCH_ALL"

[[rules.client_rule_set.rules]]
rule_type = "OS"
os_linux = true

[[rules.client_rule_set.rules]]
rule_type = "LABEL"
label_names = ["web"]
match_mode = "MATCH_ANY"

[[rules.client_rule_set.rules]]
rule_type = "INTEGER"
field = "CLIENT_VERSION"
operator = "GREATER_THAN"
value = 3000
"#;
        let file = RuleFile::from_toml_str(toml).unwrap();
        assert_eq!(file.rules.len(), 1);
        let rule = &file.rules[0];
        assert_eq!(rule.client_rule_set.rules.len(), 3);

        let mut info = linux_client();
        assert!(!rule.client_rule_set.evaluate(&info).unwrap());
        info.labels.push("web".to_string());
        assert!(rule.client_rule_set.evaluate(&info).unwrap());

        let store = InMemoryDatastore::new();
        assert_eq!(file.install(&store).unwrap(), 1);
        assert_eq!(store.read_all_foreman_rules().unwrap(), file.rules);
    }

    #[test]
    fn test_malformed_rule_file_is_a_config_error() {
        let result = RuleFile::from_toml_str("[[rules]]\nhunt_id = 3\n");
        assert!(matches!(result, Err(FleetError::ConfigError { .. })));
    }
}
