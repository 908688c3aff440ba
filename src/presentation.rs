//! Presentation-ready step sequence.
//!
//! Every classified stage becomes exactly two [`VisualStep`]s, a query and a
//! response, numbered by a single counter starting at 1. The narrative text
//! depends on both the structural stage type and the role of the server that
//! actually answered, since a stub resolver often answers the root stage and
//! a root server often answers the TLD stage.

use crate::core::{Attempt, AuthorityRecord, DnssecRecord, StageType, TraceStage};
use crate::domain::skipped_levels;
use crate::trace::{detect_role, Query, ServerRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    LocalResolverQuery,
    LocalResolverResponse,
    RootQuery,
    RootResponse,
    TldQuery,
    TldResponse,
    DelegationQuery,
    DelegationResponse,
    AuthoritativeQuery,
    AuthoritativeResponse,
    FinalQuery,
    FinalAnswer,
    NxdomainQuery,
    NxdomainResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Query,
    Response,
}

/// The server a step is addressed to or answered by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub role: ServerRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub zone: String,
    pub nameservers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub name: String,
    pub record_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralPayload {
    pub nameservers: Vec<String>,
    pub ttl: u32,
    pub dnssec: bool,
    /// The referral came from a stub resolver's cache.
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub record_type: String,
    pub answer: String,
    pub ttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegativePayload {
    pub status: String,
    pub authority: Option<AuthorityRecord>,
    pub proof_records: Vec<DnssecRecord>,
    pub ttl: u32,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponsePayload {
    Referral(ReferralPayload),
    Answer(AnswerPayload),
    Negative(NegativePayload),
}

/// Hierarchy levels a delegation jumped over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationInfo {
    pub parent_zone: String,
    pub delegated_zone: String,
    pub skipped_levels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualStep {
    /// 1-based, strictly increasing across the whole sequence.
    pub step: usize,
    pub stage: StepKind,
    /// Index of the source stage in the reconstruction.
    pub stage_index: usize,
    pub name: String,
    pub description: String,
    pub server: ServerDescriptor,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponsePayload>,
    pub timing_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_bytes: Option<u64>,
    pub has_dnssec: bool,
    pub dnssec_records: Vec<DnssecRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation: Option<DelegationInfo>,
    pub attempts: Vec<Attempt>,
}

/// Text and tags chosen for one stage.
struct Narrative {
    query_kind: StepKind,
    response_kind: StepKind,
    query_name: String,
    query_description: String,
    response_name: String,
    response_description: String,
    /// Who the query is addressed to.
    target_name: String,
    target_role: ServerRole,
    query: QueryPayload,
}

fn narrate(stage: &TraceStage, actual: ServerRole, query: &Query) -> Narrative {
    let zone = &stage.zone;
    let count = stage.nameservers.len();
    let ns_query = |name: &str| QueryPayload {
        name: name.to_string(),
        record_type: "NS".to_string(),
    };

    match stage.stage_type {
        StageType::Root if actual == ServerRole::Resolver => Narrative {
            query_kind: StepKind::LocalResolverQuery,
            response_kind: StepKind::LocalResolverResponse,
            query_name: "Query Local DNS Resolver".into(),
            query_description: "Querying local DNS resolver for root server information".into(),
            response_name: "Local Resolver Response (Cached Root NS)".into(),
            response_description: format!(
                "Local resolver provided cached root hints: {count} root servers"
            ),
            target_name: "Local DNS Resolver".into(),
            target_role: ServerRole::Resolver,
            query: ns_query("."),
        },
        StageType::Root => Narrative {
            query_kind: StepKind::RootQuery,
            response_kind: StepKind::RootResponse,
            query_name: "Query Root Servers".into(),
            query_description: "Querying root DNS servers to find TLD nameservers".into(),
            response_name: "Root Servers Response".into(),
            response_description: format!("Root servers provide {count} nameservers"),
            target_name: "Root DNS Servers".into(),
            target_role: ServerRole::Root,
            query: ns_query("."),
        },
        StageType::Tld if actual == ServerRole::Root => Narrative {
            query_kind: StepKind::RootQuery,
            response_kind: StepKind::RootResponse,
            query_name: format!("Query Root Server for .{zone} TLD"),
            query_description: format!("Querying root server to find .{zone} TLD nameservers"),
            response_name: format!("Root Server Provides .{zone} TLD Delegation"),
            response_description: format!(
                "Root server provides {count} .{zone} TLD nameservers"
            ),
            target_name: "Root DNS Server".into(),
            target_role: ServerRole::Root,
            query: ns_query(zone),
        },
        StageType::Tld => Narrative {
            query_kind: StepKind::TldQuery,
            response_kind: StepKind::TldResponse,
            query_name: format!("Query .{zone} TLD Servers"),
            query_description: format!("Querying TLD servers for {zone} nameservers"),
            response_name: format!(".{zone} TLD Response"),
            response_description: format!("TLD provides {count} nameservers"),
            target_name: format!("{zone} TLD"),
            target_role: ServerRole::Tld,
            query: ns_query(zone),
        },
        StageType::Delegation | StageType::Authoritative => {
            let delegated = stage.stage_type == StageType::Delegation;
            let tld = zone.rsplit('.').next().unwrap_or(zone);
            let (query_kind, response_kind) = match (actual, delegated) {
                (ServerRole::Tld, _) => (StepKind::TldQuery, StepKind::TldResponse),
                (_, true) => (StepKind::DelegationQuery, StepKind::DelegationResponse),
                _ => (StepKind::AuthoritativeQuery, StepKind::AuthoritativeResponse),
            };
            let (query_name, query_description, target_name, target_role) =
                match (actual, delegated) {
                    (ServerRole::Tld, _) => (
                        format!("Query .{tld} TLD Server"),
                        format!("Querying .{tld} TLD servers for nameservers of {zone}"),
                        format!(".{tld} TLD Server"),
                        ServerRole::Tld,
                    ),
                    (_, true) => (
                        format!("Query {zone} Delegation"),
                        format!("Querying delegated nameservers for {zone}"),
                        format!("{zone} Delegation"),
                        ServerRole::Authoritative,
                    ),
                    _ => (
                        "Query Authoritative Server".to_string(),
                        format!("Querying authoritative nameservers for {zone}"),
                        "Authoritative DNS".to_string(),
                        ServerRole::Authoritative,
                    ),
                };
            let (response_name, response_description) = match (actual, delegated) {
                (ServerRole::Tld, true) => (
                    format!(".{tld} TLD Provides {zone} Delegation"),
                    format!("TLD server delegates to {count} nameservers for {zone}"),
                ),
                (ServerRole::Tld, false) => (
                    format!(".{tld} TLD Provides {zone} Nameservers"),
                    format!("TLD server provides {count} authoritative nameservers for {zone}"),
                ),
                (_, true) => (
                    format!("{zone} Delegation Response"),
                    format!("Delegation provides {count} nameservers for {zone}"),
                ),
                _ => (
                    "Authoritative Nameservers".to_string(),
                    format!("Domain has {count} authoritative nameservers"),
                ),
            };
            Narrative {
                query_kind,
                response_kind,
                query_name,
                query_description,
                response_name,
                response_description,
                target_name,
                target_role,
                query: ns_query(zone),
            }
        }
        StageType::Final => {
            let record_type = stage
                .answer_type
                .clone()
                .unwrap_or_else(|| query.record_type.clone());
            let answer = stage.answer_value.clone().unwrap_or_default();
            Narrative {
                query_kind: StepKind::FinalQuery,
                response_kind: StepKind::FinalAnswer,
                query_name: format!("Query for {record_type} Record"),
                query_description: format!("Requesting {record_type} record for {zone}"),
                response_name: "Final Answer".into(),
                response_description: format!("{record_type} record: {answer}"),
                target_name: "Authoritative Server".into(),
                target_role: ServerRole::Authoritative,
                query: QueryPayload {
                    name: zone.clone(),
                    record_type,
                },
            }
        }
        StageType::Negative => {
            let responder = stage
                .responder_hostname()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{zone} Server"));
            let target_name = if actual == ServerRole::Tld {
                format!(".{zone} TLD Server")
            } else {
                responder.clone()
            };
            Narrative {
                query_kind: StepKind::NxdomainQuery,
                response_kind: StepKind::NxdomainResponse,
                query_name: format!("Query {zone} for {}", query.domain),
                query_description: format!("Querying {zone} servers for domain existence"),
                response_name: "Domain Not Found (NXDOMAIN)".into(),
                response_description: format!(
                    "{responder} authoritatively states that {} does not exist",
                    query.domain
                ),
                target_name,
                target_role: actual,
                query: QueryPayload {
                    name: query.domain.clone(),
                    record_type: query.record_type.clone(),
                },
            }
        }
    }
}

fn response_payload(stage: &TraceStage, actual: ServerRole) -> ResponsePayload {
    match stage.stage_type {
        StageType::Final => ResponsePayload::Answer(AnswerPayload {
            record_type: stage.answer_type.clone().unwrap_or_default(),
            answer: stage.answer_value.clone().unwrap_or_default(),
            ttl: stage.ttl,
        }),
        StageType::Negative => ResponsePayload::Negative(NegativePayload {
            status: "NXDOMAIN".into(),
            authority: stage.authority_record.clone(),
            proof_records: stage.dnssec_records.clone(),
            ttl: stage.authority_record.as_ref().map_or(stage.ttl, |soa| soa.ttl),
            explanation: format!(
                "The authoritative server for {} confirms the name does not exist. \
                 The SOA record describes the zone and the NSEC/NSEC3 records prove non-existence.",
                stage.zone
            ),
        }),
        _ => ResponsePayload::Referral(ReferralPayload {
            nameservers: stage.nameservers.clone(),
            ttl: stage.ttl,
            dnssec: stage.has_dnssec(),
            cached: stage.stage_type == StageType::Root && actual == ServerRole::Resolver,
        }),
    }
}

/// Turns classified stages into the numbered query/response sequence.
pub fn format_for_visualization(stages: &[TraceStage], query: &Query) -> Vec<VisualStep> {
    let mut steps = Vec::with_capacity(stages.len() * 2);
    let mut counter = 0usize;
    let mut delegation_point = ".".to_string();

    for (index, stage) in stages.iter().enumerate() {
        let actual = detect_role(stage.responder_hostname());
        let narrative = narrate(stage, actual, query);

        let delegation = (stage.stage_type == StageType::Delegation).then(|| DelegationInfo {
            parent_zone: delegation_point.clone(),
            delegated_zone: stage.zone.clone(),
            skipped_levels: skipped_levels(&delegation_point, &stage.zone),
        });
        if matches!(
            stage.stage_type,
            StageType::Root | StageType::Tld | StageType::Delegation | StageType::Authoritative
        ) {
            delegation_point = stage.zone.clone();
        }

        counter += 1;
        steps.push(VisualStep {
            step: counter,
            stage: narrative.query_kind,
            stage_index: index,
            name: narrative.query_name,
            description: narrative.query_description,
            server: ServerDescriptor {
                name: narrative.target_name.clone(),
                role: narrative.target_role,
                ip: None,
                zone: stage.zone.clone(),
                nameservers: stage.nameservers.clone(),
            },
            message_type: MessageType::Query,
            query: Some(narrative.query),
            response: None,
            timing_ms: stage.response_time_ms,
            received_bytes: None,
            has_dnssec: false,
            dnssec_records: Vec::new(),
            delegation: delegation.clone(),
            attempts: stage.attempts.clone(),
        });

        counter += 1;
        steps.push(VisualStep {
            step: counter,
            stage: narrative.response_kind,
            stage_index: index,
            name: narrative.response_name,
            description: narrative.response_description,
            server: ServerDescriptor {
                name: stage
                    .responder_hostname()
                    .map(str::to_string)
                    .unwrap_or(narrative.target_name),
                role: actual,
                ip: stage.responding_server.as_ref().map(|s| s.ip.clone()),
                zone: stage.zone.clone(),
                nameservers: stage.nameservers.clone(),
            },
            message_type: MessageType::Response,
            query: None,
            response: Some(response_payload(stage, actual)),
            timing_ms: stage.response_time_ms,
            received_bytes: Some(stage.received_bytes),
            has_dnssec: stage.has_dnssec(),
            dnssec_records: stage.dnssec_records.clone(),
            delegation,
            attempts: stage.attempts.clone(),
        });
    }

    steps
}
