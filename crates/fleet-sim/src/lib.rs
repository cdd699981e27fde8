//! # fleet-sim
//!
//! A simulated agent endpoint for the fleet flow orchestrator, and reference
//! scenarios built on it.
//!
//! The orchestrator dispatches requests through a [`QueueConnector`]; the
//! [`Endpoint`] serves each one with a registered handler, applying the
//! request's filters agent-side and routing parcels to sinks; the replies go
//! back through `ingest_responses`. [`execute_flow`] repeats this until both
//! sides are idle.
//!
//! ```rust,ignore
//! let sim = Simulation::new(&OrchestratorConfig::default())
//!     .with_handlers(file_handlers(files));
//! let flow_id = sim.execute_flow(CollectFile::new("/etc/hosts"), StartFlowOptions::new(client, "alice"))?;
//! ```

pub mod connector;
pub mod endpoint;
pub mod fixtures;
pub mod flows;
pub mod harness;
pub mod scenarios;
pub mod session;

pub use connector::QueueConnector;
pub use endpoint::{Endpoint, Handler};
pub use harness::{execute_flow, run_until_idle, Simulation};
pub use session::Session;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use fleet_contracts::{
        error::FleetError,
        filter::{Condition, Filter, Operator},
        flow::FlowState,
        ids::{ActionId, ClientId, FlowId, FlowKey},
        message::{ActionRequest, ResponseBody, SinkId},
        payload::{AnyPayload, EmptyArgs},
    };
    use fleet_core::{
        config::OrchestratorConfig,
        flow::{FlowError, FlowResult},
        orchestrator::StartFlowOptions,
        sinks::SinkRouter,
        traits::FlowStore,
    };
    use fleet_store::{InMemoryDatastore, StartupSink};

    use crate::{
        fixtures::{
            file_handlers, file_handlers_with_chunk_len, list_values_handler, platform_handler, sha256_hex,
            FileSha256, GetFileSha256Args, KeyValue, PlatformInfo, GET_FILE_SHA256, GET_PLATFORM_INFO,
            LIST_VALUES,
        },
        flows::{CollectFile, CollectedFile, HostSurvey, Interrogate, ListMatchingValues, SurveyItem},
        scenarios, Endpoint, Session, Simulation,
    };

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn client() -> ClientId {
        ClientId::new("C.1000000000000000")
    }

    fn request(action: &str, filters: Vec<Filter>) -> ActionRequest {
        ActionRequest {
            client_id: client(),
            flow_id: FlowId::new("ABCD1234"),
            request_id: 7,
            action: ActionId::from(action),
            args: AnyPayload::pack(&EmptyArgs::default()).unwrap(),
            filters,
        }
    }

    fn key_is(key: &str) -> Filter {
        Filter::from(Condition::new(vec![1], Operator::StringEqual(key.to_string())))
    }

    fn foo_bar_baz() -> Vec<KeyValue> {
        vec![
            KeyValue::new("Bar", "1"),
            KeyValue::new("Foo", "2"),
            KeyValue::new("Baz", "3"),
        ]
    }

    fn linux() -> PlatformInfo {
        PlatformInfo {
            system: "Linux".to_string(),
            release: "Debian".to_string(),
            version: "12.4".to_string(),
            fqdn: "host-0.example.com".to_string(),
            client_version: 3400,
        }
    }

    fn files(entries: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
        entries.iter().map(|(p, c)| (p.to_string(), c.to_vec())).collect()
    }

    fn sim() -> Simulation {
        Simulation::new(&OrchestratorConfig::default())
    }

    fn status_of(responses: &[fleet_contracts::message::FlowResponse]) -> (u64, bool, String) {
        match &responses.last().unwrap().body {
            ResponseBody::Status { status } => (
                responses.last().unwrap().response_id,
                status.is_ok(),
                status.error_message.clone(),
            ),
            other => panic!("expected status element last, got {:?}", other),
        }
    }

    // ── Session ───────────────────────────────────────────────────────────────

    #[test]
    fn test_session_keeps_only_admitted_replies() {
        let mut session = Session::new(&request(LIST_VALUES, vec![key_is("Foo")]));
        for pair in foo_bar_baz() {
            session.reply(&pair).unwrap();
        }
        assert_eq!(session.replies().len(), 1);
        assert_eq!(session.filtered_out_count(), 2);
        assert_eq!(session.replies()[0].unpack::<KeyValue>().unwrap().key, "Foo");
    }

    #[test]
    fn test_session_without_filters_keeps_everything() {
        let mut session = Session::new(&request(LIST_VALUES, vec![]));
        for pair in foo_bar_baz() {
            session.reply(&pair).unwrap();
        }
        assert_eq!(session.replies().len(), 3);
        assert_eq!(session.filtered_out_count(), 0);
    }

    #[test]
    fn test_session_reply_is_a_copy() {
        let mut session = Session::new(&request(LIST_VALUES, vec![]));
        let mut pair = KeyValue::new("Foo", "before");
        session.reply(&pair).unwrap();
        pair.value = "after".to_string();
        assert_eq!(session.replies()[0].unpack::<KeyValue>().unwrap().value, "before");
    }

    #[test]
    fn test_session_filter_on_missing_field_is_an_error() {
        let bad = Filter::from(Condition::new(vec![9], Operator::StringEqual("x".to_string())));
        let mut session = Session::new(&request(LIST_VALUES, vec![bad]));
        assert!(matches!(
            session.reply(&KeyValue::new("Foo", "1")),
            Err(FleetError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_session_groups_parcels_by_sink() {
        let mut session = Session::new(&request(LIST_VALUES, vec![]));
        session.send(SinkId::Blob, &KeyValue::new("a", "1")).unwrap();
        session.send(SinkId::Startup, &KeyValue::new("b", "2")).unwrap();
        session.send(SinkId::Blob, &KeyValue::new("c", "3")).unwrap();
        assert_eq!(session.parcels().len(), 3);
        assert_eq!(session.parcels_for(SinkId::Blob).count(), 2);
    }

    // ── Endpoint ──────────────────────────────────────────────────────────────

    #[test]
    fn test_response_ids_are_sequential_with_status_last() {
        let endpoint = Endpoint::new(SinkRouter::new()).with_handlers(vec![list_values_handler(foo_bar_baz())]);
        let responses = endpoint.execute(&request(LIST_VALUES, vec![])).unwrap();

        let ids: Vec<u64> = responses.iter().map(|r| r.response_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(responses.iter().all(|r| r.request_id == 7));
        assert_eq!(status_of(&responses), (4, true, String::new()));
    }

    #[test]
    fn test_filtered_replies_consume_no_response_id() {
        let endpoint = Endpoint::new(SinkRouter::new()).with_handlers(vec![list_values_handler(foo_bar_baz())]);
        let responses = endpoint.execute(&request(LIST_VALUES, vec![key_is("Foo")])).unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].response_id, 1);
        assert_eq!(status_of(&responses).0, 2);
    }

    #[test]
    fn test_missing_handler_names_the_action() {
        let endpoint = Endpoint::new(SinkRouter::new());
        match endpoint.execute(&request("list_processes", vec![])) {
            Err(FleetError::MissingHandler { action }) => assert_eq!(action, "list_processes"),
            other => panic!("expected MissingHandler, got {:?}", other),
        }
    }

    #[test]
    fn test_handler_error_becomes_error_status_after_earlier_replies() {
        let endpoint = Endpoint::new(SinkRouter::new()).handle("flaky", |session: &mut Session| -> FlowResult<()> {
            session.reply(&KeyValue::new("Foo", "1"))?;
            Err(FlowError::new("disk on fire"))
        });
        let responses = endpoint.execute(&request("flaky", vec![])).unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(status_of(&responses), (2, false, "disk on fire".to_string()));
    }

    #[test]
    fn test_handler_panic_becomes_error_status() {
        let endpoint = Endpoint::new(SinkRouter::new()).handle("panics", |_: &mut Session| -> FlowResult<()> {
            panic!("index out of range");
        });
        let responses = endpoint.execute(&request("panics", vec![])).unwrap();

        let (_, ok, message) = status_of(&responses);
        assert!(!ok);
        assert_eq!(message, "index out of range");
    }

    #[test]
    fn test_messageless_handler_failure_records_a_trace() {
        let endpoint = Endpoint::new(SinkRouter::new()).handle("asserts", |_: &mut Session| -> FlowResult<()> {
            fleet_core::flow_ensure!(1 + 1 == 3);
            Ok(())
        });
        let responses = endpoint.execute(&request("asserts", vec![])).unwrap();

        let (_, ok, message) = status_of(&responses);
        assert!(!ok);
        assert!(message.starts_with("assertion failed"), "got {:?}", message);
        assert!(message.len() > "assertion failed".len());
    }

    fn startup_endpoint() -> Endpoint {
        let store = InMemoryDatastore::new();
        Endpoint::new(SinkRouter::new().with(SinkId::Startup, Arc::new(StartupSink::new(Arc::new(store)))))
    }

    #[test]
    fn test_sink_failure_sets_error_status() {
        let endpoint = startup_endpoint().handle("bad_parcel", |session: &mut Session| -> FlowResult<()> {
            session.send(SinkId::Startup, &KeyValue::new("not", "startup info"))?;
            session.reply(&KeyValue::new("Foo", "1"))?;
            Ok(())
        });
        let responses = endpoint.execute(&request("bad_parcel", vec![])).unwrap();

        let (status_id, ok, message) = status_of(&responses);
        assert_eq!(status_id, 2);
        assert!(!ok);
        assert!(message.contains("STARTUP"), "got {:?}", message);
    }

    #[test]
    fn test_sink_failure_does_not_mask_handler_error() {
        let endpoint = startup_endpoint().handle("both_fail", |session: &mut Session| -> FlowResult<()> {
            session.send(SinkId::Startup, &KeyValue::new("not", "startup info"))?;
            Err(FlowError::new("handler failed first"))
        });
        let responses = endpoint.execute(&request("both_fail", vec![])).unwrap();

        assert_eq!(status_of(&responses).2, "handler failed first");
    }

    #[test]
    fn test_unregistered_sink_sets_error_status() {
        let endpoint = Endpoint::new(SinkRouter::new()).handle("blobby", |session: &mut Session| -> FlowResult<()> {
            session.send(SinkId::Blob, &fleet_contracts::blob::Blob { data: vec![1, 2, 3] })?;
            Ok(())
        });
        let responses = endpoint.execute(&request("blobby", vec![])).unwrap();
        assert!(!status_of(&responses).1);
    }

    // ── End to end ────────────────────────────────────────────────────────────

    #[test]
    fn test_filtered_flow_sees_only_foo() {
        let sim = sim().with_handlers(vec![list_values_handler(foo_bar_baz())]);
        let flow_id = sim
            .execute_flow(ListMatchingValues::new("Foo"), StartFlowOptions::new(client(), "alice"))
            .unwrap();

        let record = sim.flow(&client(), &flow_id).unwrap();
        assert_eq!(record.state, FlowState::Finished);
        let values = sim.results::<KeyValue>(&client(), &flow_id).unwrap();
        assert_eq!(values, vec![KeyValue::new("Foo", "2")]);

        let stored = sim
            .store
            .read_flow_responses(&FlowKey::new(client(), flow_id), 1)
            .unwrap();
        let ids: Vec<u64> = stored.iter().map(|r| r.response_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_missing_handler_aborts_execution() {
        let sim = sim();
        match sim.execute_flow(ListMatchingValues::new("Foo"), StartFlowOptions::new(client(), "alice")) {
            Err(FleetError::MissingHandler { action }) => assert_eq!(action, LIST_VALUES),
            other => panic!("expected MissingHandler, got {:?}", other),
        }
    }

    #[test]
    fn test_collect_file_reassembles_chunks() {
        // 4096 is not a multiple of 251, so no two chunks are identical.
        let content: Vec<u8> = (0u8..=250).cycle().take(10_000).collect();
        let sim = sim().with_handlers(file_handlers_with_chunk_len(files(&[("/var/log/syslog", &content)]), 4096));

        let flow_id = sim
            .execute_flow(CollectFile::new("/var/log/syslog"), StartFlowOptions::new(client(), "alice"))
            .unwrap();

        assert_eq!(sim.flow(&client(), &flow_id).unwrap().state, FlowState::Finished);
        let collected = sim.results::<CollectedFile>(&client(), &flow_id).unwrap();
        assert_eq!(
            collected,
            vec![CollectedFile {
                path: "/var/log/syslog".to_string(),
                size: 10_000,
                sha256: sha256_hex(&content),
                chunks: 3,
            }]
        );
        assert_eq!(sim.store.blob_count().unwrap(), 3);
    }

    #[test]
    fn test_identical_chunks_are_stored_once() {
        let content: Vec<u8> = (0u8..=255).cycle().take(3 * 256).collect();
        let sim = sim().with_handlers(file_handlers_with_chunk_len(files(&[("/dev/pattern", &content)]), 256));

        let flow_id = sim
            .execute_flow(CollectFile::new("/dev/pattern"), StartFlowOptions::new(client(), "alice"))
            .unwrap();

        let collected = sim.results::<CollectedFile>(&client(), &flow_id).unwrap();
        assert_eq!(collected[0].chunks, 3);
        assert_eq!(collected[0].size, 768);
        assert_eq!(sim.store.blob_count().unwrap(), 1);
    }

    #[test]
    fn test_hash_range_beyond_the_file_is_clamped() {
        let endpoint = Endpoint::new(SinkRouter::new())
            .with_handlers(file_handlers(files(&[("/etc/hosts", b"127.0.0.1 localhost")])));
        let hash_of = |offset: u64, length: u64| -> FileSha256 {
            let mut req = request(GET_FILE_SHA256, vec![]);
            req.args = AnyPayload::pack(&GetFileSha256Args {
                path: "/etc/hosts".to_string(),
                offset,
                length,
            })
            .unwrap();
            let responses = endpoint.execute(&req).unwrap();
            assert!(status_of(&responses).1);
            match &responses[0].body {
                ResponseBody::Payload { payload } => payload.unpack().unwrap(),
                other => panic!("expected a payload, got {:?}", other),
            }
        };

        let tail = hash_of(10, u64::MAX);
        assert_eq!(tail.length, 9);
        assert_eq!(tail.sha256, sha256_hex(b"localhost"));

        let past_end = hash_of(u64::MAX, 4);
        assert_eq!(past_end.length, 0);
        assert_eq!(past_end.sha256, sha256_hex(b""));
    }

    #[test]
    fn test_collect_missing_file_ends_in_error() {
        let sim = sim().with_handlers(file_handlers_with_chunk_len(files(&[]), 4096));
        let flow_id = sim
            .execute_flow(CollectFile::new("/nope"), StartFlowOptions::new(client(), "alice"))
            .unwrap();

        let record = sim.flow(&client(), &flow_id).unwrap();
        assert_eq!(record.state, FlowState::Error);
        assert!(record.error_message.unwrap().contains("open failed"));
    }

    #[test]
    fn test_start_failure_returns_without_serving() {
        let sim = sim();
        let flow_id = sim
            .execute_flow(CollectFile::new(""), StartFlowOptions::new(client(), "alice"))
            .unwrap();

        let record = sim.flow(&client(), &flow_id).unwrap();
        assert_eq!(record.state, FlowState::Error);
        assert_eq!(record.error_message.as_deref(), Some("no path to collect"));
        assert!(sim.connector.is_empty().unwrap());
    }

    #[test]
    fn test_child_results_reach_parent() {
        let sim = sim()
            .with_handlers(file_handlers_with_chunk_len(files(&[("/etc/hostname", b"host-0\n")]), 4096))
            .with_handlers(vec![platform_handler(linux())]);

        let flow_id = sim
            .execute_flow(HostSurvey::new("/etc/hostname"), StartFlowOptions::new(client(), "alice"))
            .unwrap();

        assert_eq!(sim.flow(&client(), &flow_id).unwrap().state, FlowState::Finished);
        let items = sim.results::<SurveyItem>(&client(), &flow_id).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.success));
        let interrogate = items.iter().find(|i| i.check == "Interrogate").unwrap();
        assert!(interrogate.detail.contains("host-0.example.com"));

        let children = sim.store.child_flows(&FlowKey::new(client(), flow_id)).unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.state == FlowState::Finished));
        assert!(children.iter().all(|c| c.creator == "alice"));
    }

    #[test]
    fn test_child_failure_is_isolated_from_parent() {
        let sim = sim()
            .with_handlers(file_handlers_with_chunk_len(files(&[("/etc/hostname", b"host-0\n")]), 4096))
            .handle(GET_PLATFORM_INFO, |_: &mut Session| -> FlowResult<()> {
                Err(FlowError::new("uname failed"))
            });

        let flow_id = sim
            .execute_flow(HostSurvey::new("/etc/hostname"), StartFlowOptions::new(client(), "alice"))
            .unwrap();

        assert_eq!(sim.flow(&client(), &flow_id).unwrap().state, FlowState::Finished);

        let children = sim.store.child_flows(&FlowKey::new(client(), flow_id.clone())).unwrap();
        let child = children.iter().find(|c| c.flow_name == "Interrogate").unwrap();
        assert_eq!(child.state, FlowState::Error);
        assert!(child.error_message.as_deref().unwrap().contains("uname failed"));

        let items = sim.results::<SurveyItem>(&client(), &flow_id).unwrap();
        let failed = items.iter().find(|i| i.check == "Interrogate").unwrap();
        assert!(!failed.success);
        assert!(items.iter().any(|i| i.check == "CollectFile" && i.success));
    }

    #[test]
    fn test_hunt_flow_runs_to_completion() {
        let sim = sim().with_handlers(vec![platform_handler(linux())]);
        let flow_id = sim
            .execute_flow(
                Interrogate::default(),
                StartFlowOptions::for_hunt(client(), &fleet_contracts::ids::HuntId::new("H:AB12"), "scheduler"),
            )
            .unwrap();

        assert_eq!(flow_id, FlowId::new("H:AB12"));
        assert_eq!(sim.results::<PlatformInfo>(&client(), &flow_id).unwrap(), vec![linux()]);
    }

    #[test]
    fn test_audit_chain_covers_every_flow() {
        let sim = sim().with_handlers(vec![list_values_handler(foo_bar_baz())]);
        for key in ["Foo", "Bar"] {
            sim.execute_flow(ListMatchingValues::new(key), StartFlowOptions::new(client(), "alice"))
                .unwrap();
        }
        assert!(sim.audit.verify_integrity().unwrap());
        assert_eq!(sim.audit.export_log().unwrap().finalized.len(), 2);
        assert_eq!(sim.orchestrator.active_flow_count().unwrap(), 0);
    }

    #[test]
    fn test_throttled_simulation_refuses_duplicates() {
        let mut config = OrchestratorConfig::default();
        config.throttle.duplicate_interval_secs = 600;
        let sim = Simulation::new(&config).with_handlers(vec![list_values_handler(foo_bar_baz())]);

        let first = sim
            .execute_flow(ListMatchingValues::new("Foo"), StartFlowOptions::new(client(), "alice"))
            .unwrap();
        match sim.execute_flow(ListMatchingValues::new("Foo"), StartFlowOptions::new(client(), "bob")) {
            Err(FleetError::DuplicateFlow { flow_id, .. }) => assert_eq!(flow_id, first.to_string()),
            other => panic!("expected DuplicateFlow, got {:?}", other),
        }
        assert!(sim
            .execute_flow(ListMatchingValues::new("Bar"), StartFlowOptions::new(client(), "bob"))
            .is_ok());
    }

    // ── Scenarios ─────────────────────────────────────────────────────────────

    #[test]
    fn test_scenarios_run() {
        scenarios::file_collection::run_scenario().unwrap();
        scenarios::nested_flows::run_scenario().unwrap();
        scenarios::foreman_hunt::run_scenario().unwrap();
        scenarios::throttling::run_scenario().unwrap();
    }
}
