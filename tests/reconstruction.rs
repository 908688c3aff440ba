//! End-to-end reconstruction of captured trace output.

use chrono::{TimeZone, Utc};
use dnstrace::export::{generate_export, DecodedDnssec, ResponseStatus, StepType};
use dnstrace::presentation::{format_for_visualization, MessageType, ResponsePayload, StepKind};
use dnstrace::trace::{reconstruct, Query, ServerRole};
use dnstrace::tracer::TraceResult;
use dnstrace::{AttemptResult, StageType};

const EXAMPLE_COM: &str = include_str!("data/example_com.txt");
const NXDOMAIN: &str = include_str!("data/nxdomain.txt");
const CO_UK: &str = include_str!("data/co_uk.txt");

fn types(query: &Query, raw: &str) -> Vec<StageType> {
    reconstruct(raw, query)
        .stages
        .iter()
        .map(|s| s.stage_type)
        .collect()
}

#[test]
fn test_example_com_stages() {
    let query = Query::new("example.com", "A");
    let r = reconstruct(EXAMPLE_COM, &query);

    assert_eq!(
        types(&query, EXAMPLE_COM),
        vec![
            StageType::Root,
            StageType::Tld,
            StageType::Authoritative,
            StageType::Final
        ]
    );

    let root = &r.stages[0];
    assert_eq!(root.zone, ".");
    assert_eq!(root.nameservers.len(), 3);
    assert_eq!(root.responder_hostname(), Some("127.0.0.53"));

    let com = &r.stages[1];
    assert_eq!(com.zone, "com");
    assert_eq!(com.received_bytes, 1170);
    assert_eq!(com.response_time_ms, 42);
    assert_eq!(com.nameservers, vec!["a.gtld-servers.net", "b.gtld-servers.net"]);
    assert!(com.has_dnssec());
    assert_eq!(com.records_returned.len(), 2);

    let auth = &r.stages[2];
    assert_eq!(auth.zone, "example.com");
    assert!(!auth.is_delegation);

    let answer = &r.stages[3];
    assert_eq!(answer.answer_value.as_deref(), Some("93.184.216.34"));
    assert_eq!(answer.ttl, 300);
    assert_eq!(answer.dnssec_records.len(), 1);
}

#[test]
fn test_example_com_attempts_follow_receipts() {
    let r = reconstruct(EXAMPLE_COM, &Query::new("example.com", "A"));

    let results: Vec<Vec<AttemptResult>> = r
        .stages
        .iter()
        .map(|s| s.attempts.iter().map(|a| a.result).collect())
        .collect();
    assert_eq!(
        results,
        vec![
            vec![AttemptResult::Success, AttemptResult::NetworkUnreachable],
            vec![AttemptResult::Success, AttemptResult::Timeout],
            vec![AttemptResult::Success],
            vec![AttemptResult::Success],
        ]
    );

    for stage in &r.stages {
        for (i, attempt) in stage.attempts.iter().enumerate() {
            assert_eq!(attempt.attempt_index, i);
        }
    }
    assert_eq!(r.stages[1].attempts[0].elapsed_ms, Some(42));
    assert_eq!(r.stages[1].attempts[0].bytes_received, 1170);
}

#[test]
fn test_example_com_diagnostics() {
    let errors = reconstruct(EXAMPLE_COM, &Query::new("example.com", "A")).errors;

    assert_eq!(errors.ipv6_failures.len(), 1);
    assert_eq!(errors.ipv6_failures[0].server.as_deref(), Some("2001:500:2f::f"));
    assert_eq!(errors.timeouts.len(), 1);
    assert_eq!(errors.timeouts[0].server.as_deref(), Some("192.5.6.30"));
    assert!(errors.communication_errors.is_empty());
    assert!(errors.other_warnings.is_empty());
    assert_eq!(errors.summary.total_issues, 2);
    assert_eq!(errors.summary.warnings, 2);
    assert_eq!(errors.summary.critical_errors, 0);
}

#[test]
fn test_example_com_visual_steps() {
    let query = Query::new("example.com", "A");
    let stages = reconstruct(EXAMPLE_COM, &query).stages;
    let steps = format_for_visualization(&stages, &query);

    assert_eq!(steps.len(), stages.len() * 2);
    for (i, step) in steps.iter().enumerate() {
        assert_eq!(step.step, i + 1);
        assert_eq!(step.stage_index, i / 2);
        let expected = if i % 2 == 0 {
            MessageType::Query
        } else {
            MessageType::Response
        };
        assert_eq!(step.message_type, expected);
    }

    assert_eq!(steps[0].stage, StepKind::LocalResolverQuery);
    assert_eq!(steps[1].server.role, ServerRole::Resolver);
    match steps[1].response.as_ref() {
        Some(ResponsePayload::Referral(referral)) => assert!(referral.cached),
        other => panic!("unexpected response: {other:?}"),
    }

    assert_eq!(steps[3].name, "Root Server Provides .com TLD Delegation");
    assert_eq!(steps[3].server.role, ServerRole::Root);
    assert!(steps[3].has_dnssec);

    assert_eq!(steps[5].name, ".com TLD Provides example.com Nameservers");
    assert_eq!(steps[5].server.role, ServerRole::Tld);

    assert_eq!(steps[7].stage, StepKind::FinalAnswer);
    assert_eq!(steps[7].description, "A record: 93.184.216.34");
    assert_eq!(steps[7].server.ip.as_deref(), Some("199.43.135.53"));
}

#[test]
fn test_example_com_export() {
    let query = Query::new("example.com", "A");
    let start = Utc.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap();
    let stages = reconstruct(EXAMPLE_COM, &query).stages;
    let export = generate_export(&query, start, 95, EXAMPLE_COM, &stages);

    assert_eq!(export.query.name, "example.com");
    assert_eq!(export.query.qtype, "A");
    assert_eq!(export.raw_output, EXAMPLE_COM);

    let roles: Vec<&str> = export.steps.iter().map(|s| s.role.as_str()).collect();
    assert_eq!(
        roles,
        vec!["Root Query", "TLD Delegation", "Authoritative Query", "Final Answer"]
    );
    assert_eq!(export.steps[3].step_type, StepType::FinalAnswer);
    assert!(export
        .steps
        .iter()
        .all(|s| s.response_status == ResponseStatus::NoError));

    let root = &export.steps[0];
    assert_eq!(root.notes, vec!["1 attempt(s) failed before success"]);
    assert_eq!(root.timing_summary.successful_time_ms, Some(0));
    assert_eq!(root.timing_summary.failed_attempts, 1);

    match export.steps[1].dnssec[0].parsed.as_ref() {
        Some(DecodedDnssec::Ds {
            key_tag, digest, ..
        }) => {
            assert_eq!(*key_tag, 19718);
            assert_eq!(
                digest,
                "8ACBB0CD28F41250A80A491389424D341522D946B0DA0C0291F2D3D771D7805A"
            );
        }
        other => panic!("unexpected DS decode: {other:?}"),
    }

    let json = serde_json::to_value(&export).unwrap();
    assert_eq!(json["steps"][0]["step_type"], "root");
    assert_eq!(json["steps"][0]["response_status"], "NOERROR");
    assert_eq!(json["duration_ms"], 95);
}

#[test]
fn test_same_input_gives_identical_envelope() {
    let query = Query::new("example.com", "A");
    let start = Utc.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap();
    let first = TraceResult::from_output(&query, EXAMPLE_COM.to_string(), start, 95);
    let second = TraceResult::from_output(&query, EXAMPLE_COM.to_string(), start, 95);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_nxdomain_walk() {
    let query = Query::new("nope.example.com", "A");
    let r = reconstruct(NXDOMAIN, &query);

    assert_eq!(
        types(&query, NXDOMAIN),
        vec![
            StageType::Root,
            StageType::Tld,
            StageType::Delegation,
            StageType::Negative
        ]
    );

    let delegation = &r.stages[2];
    assert!(delegation.is_delegation);
    assert_eq!(delegation.delegates_to_domain.as_deref(), Some("nope.example.com"));

    let negative = &r.stages[3];
    assert_eq!(negative.zone, "example.com");
    let soa = negative.authority_record.as_ref().unwrap();
    assert_eq!(soa.ttl, 3600);
    assert!(soa.data.starts_with("ns.icann.org."));
    assert_eq!(negative.dnssec_records.len(), 2);

    let steps = format_for_visualization(&r.stages, &query);
    assert_eq!(steps[5].name, ".com TLD Provides example.com Delegation");
    let info = steps[5].delegation.as_ref().unwrap();
    assert_eq!(info.parent_zone, "com");
    assert_eq!(info.delegated_zone, "example.com");
    assert!(info.skipped_levels.is_empty());

    assert_eq!(steps[7].stage, StepKind::NxdomainResponse);
    assert_eq!(
        steps[7].description,
        "a.iana-servers.net authoritatively states that nope.example.com does not exist"
    );
    match steps[7].response.as_ref() {
        Some(ResponsePayload::Negative(negative)) => {
            assert_eq!(negative.status, "NXDOMAIN");
            assert_eq!(negative.proof_records.len(), 2);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let export = generate_export(&query, Utc::now(), 0, NXDOMAIN, &r.stages);
    assert_eq!(export.steps[2].step_type, StepType::Referral);
    assert_eq!(export.steps[2].notes, vec!["Subdomain delegation"]);
    let last = &export.steps[3];
    assert_eq!(last.step_type, StepType::Nxdomain);
    assert_eq!(last.role, "Negative Answer");
    assert_eq!(last.response_status, ResponseStatus::NxDomain);
    assert_eq!(last.notes, vec!["Non-existence backed by 2 DNSSEC record(s)"]);
}

#[test]
fn test_registry_suffix_delegation_skips_level() {
    let query = Query::new("www.example.co.uk", "A");
    let r = reconstruct(CO_UK, &query);

    assert_eq!(
        types(&query, CO_UK),
        vec![
            StageType::Root,
            StageType::Tld,
            StageType::Delegation,
            StageType::Final
        ]
    );
    assert_eq!(r.stages[1].zone, "uk");

    let steps = format_for_visualization(&r.stages, &query);
    let info = steps[4].delegation.as_ref().unwrap();
    assert_eq!(info.parent_zone, "uk");
    assert_eq!(info.delegated_zone, "example.co.uk");
    assert_eq!(info.skipped_levels, vec!["co.uk"]);
    assert_eq!(steps[7].description, "A record: 203.0.113.10");
}

#[test]
fn test_thirteen_roots_then_com_then_answer_with_receipts() {
    let mut text: String = "abcdefghijklm"
        .chars()
        .map(|c| format!(".\t\t\t518400\tIN\tNS\t{c}.root-servers.net.\n"))
        .collect();
    text.push_str(";; Received 811 bytes from 192.5.5.241#53(f.root-servers.net) in 42 ms\n\n");
    text.push_str("com.\t\t\t172800\tIN\tNS\ta.gtld-servers.net.\n");
    text.push_str(";; Received 1170 bytes from 192.5.6.30#53(a.gtld-servers.net) in 20 ms\n\n");
    text.push_str("example.com.\t\t300\tIN\tA\t93.184.216.34\n");
    text.push_str(";; Received 56 bytes from 199.43.135.53#53(a.iana-servers.net) in 12 ms\n");

    let query = Query::new("example.com", "A");
    let stages = reconstruct(&text, &query).stages;
    assert_eq!(
        stages.iter().map(|s| s.stage_type).collect::<Vec<_>>(),
        vec![StageType::Root, StageType::Tld, StageType::Final]
    );
    assert_eq!(stages[0].nameservers.len(), 13);
    assert_eq!(stages[0].ttl, 518400);
    assert_eq!(stages[0].received_bytes, 811);

    let steps = format_for_visualization(&stages, &query);
    assert_eq!(steps.len(), 6);
    assert_eq!(steps[0].name, "Query Root Servers");
    assert_eq!(steps[1].description, "Root servers provide 13 nameservers");

    let export = generate_export(&query, Utc::now(), 74, &text, &stages);
    assert_eq!(export.steps[0].role, "Root Query");
    assert_eq!(export.steps[0].timing_summary.successful_time_ms, Some(42));
}

#[test]
fn test_answer_after_referral_in_one_buffer_is_its_own_stage() {
    let mut text: String = "abcdefghijklm"
        .chars()
        .map(|c| format!(".\t\t\t518400\tIN\tNS\t{c}.root-servers.net.\n"))
        .collect();
    text.push_str(";; Received 811 bytes from 192.5.5.241#53(f.root-servers.net) in 42 ms\n\n");
    text.push_str("com.\t\t\t172800\tIN\tNS\ta.gtld-servers.net.\n");
    text.push_str("example.com.\t\t300\tIN\tA\t93.184.216.34\n");

    let query = Query::new("example.com", "A");
    let stages = reconstruct(&text, &query).stages;
    assert_eq!(
        stages.iter().map(|s| s.stage_type).collect::<Vec<_>>(),
        vec![StageType::Root, StageType::Tld, StageType::Final]
    );
    assert_eq!(stages[1].records_returned.len(), 1);
    assert_eq!(stages[2].answer_value.as_deref(), Some("93.184.216.34"));

    let steps = format_for_visualization(&stages, &query);
    assert_eq!(steps.len(), 6);

    let export = generate_export(&query, Utc::now(), 42, &text, &stages);
    assert_eq!(export.steps[0].role, "Root Query");
}

#[test]
fn test_garbage_input_reconstructs_nothing() {
    let query = Query::new("example.com", "A");
    let r = reconstruct("not a trace\nat all\n", &query);
    assert!(r.stages.is_empty());
    assert!(format_for_visualization(&r.stages, &query).is_empty());
    assert_eq!(r.errors.summary.total_issues, 0);
}
