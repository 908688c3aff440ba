//! Canonical structured export of a reconstructed trace.
//!
//! The export is a pure function of the reconstruction and the envelope
//! timestamp. Field names are snake_case so the document can be diffed and
//! replayed independently of the camelCase envelope.

use crate::core::{
    AddressFamily, Attempt, AttemptResult, DnssecRecord, ResourceRecord, RespondingServer,
    StageType, TraceStage, TransportProtocol,
};
use crate::trace::Query;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used by RRSIG inception and expiration fields.
const RRSIG_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Root,
    Tld,
    Referral,
    Authoritative,
    FinalAnswer,
    Nxdomain,
}

impl StepType {
    pub fn of(stage: &TraceStage) -> Self {
        match stage.stage_type {
            StageType::Root => StepType::Root,
            StageType::Tld => StepType::Tld,
            StageType::Delegation => StepType::Referral,
            StageType::Authoritative if stage.is_delegation => StepType::Referral,
            StageType::Authoritative => StepType::Authoritative,
            StageType::Final => StepType::FinalAnswer,
            StageType::Negative => StepType::Nxdomain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    NoError,
    NxDomain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportQuery {
    pub name: String,
    pub qtype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub name: String,
    pub ttl: u32,
    #[serde(rename = "type")]
    pub record_type: String,
    pub data: String,
}

impl From<&ResourceRecord> for ExportRecord {
    fn from(record: &ResourceRecord) -> Self {
        Self {
            name: record.name.clone(),
            ttl: record.ttl,
            record_type: record.record_type.clone(),
            data: record.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportAttempt {
    pub attempt_index: usize,
    pub target_ip: String,
    pub target_hostname: Option<String>,
    pub address_family: AddressFamily,
    pub protocol: TransportProtocol,
    pub result: AttemptResult,
    pub time_ms: Option<u64>,
    pub bytes_received: u64,
    pub error_message: Option<String>,
    pub raw_line: String,
}

impl From<&Attempt> for ExportAttempt {
    fn from(a: &Attempt) -> Self {
        Self {
            attempt_index: a.attempt_index,
            target_ip: a.target_ip.clone(),
            target_hostname: a.target_hostname.clone(),
            address_family: a.address_family,
            protocol: a.transport_protocol,
            result: a.result,
            time_ms: a.elapsed_ms,
            bytes_received: a.bytes_received,
            error_message: a.error_message.clone(),
            raw_line: a.raw_line.clone(),
        }
    }
}

/// Structural decoding of the DNSSEC record types the export understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedDnssec {
    Rrsig {
        type_covered: String,
        algorithm: u8,
        labels: u8,
        original_ttl: u32,
        /// `None` when the timestamp does not match the RRSIG layout.
        inception: Option<DateTime<Utc>>,
        expiration: Option<DateTime<Utc>>,
        key_tag: u16,
        signer_name: String,
    },
    Ds {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDnssec {
    #[serde(rename = "type")]
    pub record_type: String,
    pub data: String,
    pub parsed: Option<DecodedDnssec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub target: String,
    pub time_ms: Option<u64>,
    pub result: AttemptResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub total_time_ms: Option<u64>,
    pub successful_time_ms: Option<u64>,
    pub failed_attempts: usize,
    pub failed_attempts_details: Vec<FailedAttempt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStep {
    pub step_index: usize,
    pub step_type: StepType,
    pub name: String,
    pub role: String,
    pub returned_records: String,
    pub records_returned: Vec<ExportRecord>,
    pub responding_server: Option<RespondingServer>,
    pub attempts: Vec<ExportAttempt>,
    pub dnssec: Vec<ExportDnssec>,
    pub notes: Vec<String>,
    pub timing_summary: TimingSummary,
    pub response_status: ResponseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredExport {
    pub query: ExportQuery,
    pub start_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub raw_output: String,
    pub steps: Vec<ExportStep>,
}

/// Builds the structured export for one reconstruction.
pub fn generate_export(
    query: &Query,
    start_time: DateTime<Utc>,
    duration_ms: u64,
    raw_output: &str,
    stages: &[TraceStage],
) -> StructuredExport {
    StructuredExport {
        query: ExportQuery {
            name: query.domain.clone(),
            qtype: query.record_type.clone(),
        },
        start_time,
        duration_ms,
        raw_output: raw_output.to_string(),
        steps: stages
            .iter()
            .enumerate()
            .map(|(index, stage)| export_step(index, stage, query))
            .collect(),
    }
}

fn export_step(index: usize, stage: &TraceStage, query: &Query) -> ExportStep {
    let step_type = StepType::of(stage);
    let (role, returned_records) = role_description(stage, step_type, query);
    ExportStep {
        step_index: index,
        step_type,
        name: stage.zone.clone(),
        role,
        returned_records,
        records_returned: stage.records_returned.iter().map(ExportRecord::from).collect(),
        responding_server: stage.responding_server.clone(),
        attempts: stage.attempts.iter().map(ExportAttempt::from).collect(),
        dnssec: stage.dnssec_records.iter().map(export_dnssec).collect(),
        notes: step_notes(stage),
        timing_summary: timing_summary(&stage.attempts),
        response_status: if stage.stage_type == StageType::Negative {
            ResponseStatus::NxDomain
        } else {
            ResponseStatus::NoError
        },
    }
}

fn role_description(stage: &TraceStage, step_type: StepType, query: &Query) -> (String, String) {
    let zone = &stage.zone;
    let (role, returned) = match step_type {
        StepType::Root => ("Root Query", "Root NS list".to_string()),
        StepType::Tld => ("TLD Delegation", format!("NS records for .{zone}")),
        StepType::Referral => ("Subdomain Delegation", format!("NS records for {zone}")),
        StepType::FinalAnswer => {
            let record_type = stage.answer_type.as_deref().unwrap_or(&query.record_type);
            ("Final Answer", format!("{record_type} record(s)"))
        }
        StepType::Nxdomain => ("Negative Answer", "SOA and non-existence proof".to_string()),
        StepType::Authoritative => ("Authoritative Query", "NS or A records".to_string()),
    };
    (role.to_string(), returned)
}

fn export_dnssec(record: &DnssecRecord) -> ExportDnssec {
    ExportDnssec {
        record_type: record.record_type.clone(),
        data: record.raw_data.clone(),
        parsed: decode_dnssec(&record.record_type, &record.raw_data),
    }
}

/// Decodes RRSIG and DS rdata; other types and malformed data yield `None`.
pub fn decode_dnssec(record_type: &str, data: &str) -> Option<DecodedDnssec> {
    let parts: Vec<&str> = data.split_whitespace().collect();
    match record_type {
        "RRSIG" if parts.len() >= 8 => Some(DecodedDnssec::Rrsig {
            type_covered: parts[0].to_string(),
            algorithm: parts[1].parse().ok()?,
            labels: parts[2].parse().ok()?,
            original_ttl: parts[3].parse().ok()?,
            expiration: parse_rrsig_time(parts[4]),
            inception: parse_rrsig_time(parts[5]),
            key_tag: parts[6].parse().ok()?,
            signer_name: parts[7].to_string(),
        }),
        "DS" if parts.len() >= 4 => Some(DecodedDnssec::Ds {
            key_tag: parts[0].parse().ok()?,
            algorithm: parts[1].parse().ok()?,
            digest_type: parts[2].parse().ok()?,
            digest: parts[3..].concat(),
        }),
        _ => None,
    }
}

fn parse_rrsig_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, RRSIG_TIME_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

fn step_notes(stage: &TraceStage) -> Vec<String> {
    let mut notes = Vec::new();
    let failures = stage
        .attempts
        .iter()
        .filter(|a| a.result != AttemptResult::Success)
        .count();
    if stage.attempts.len() > 1 && failures > 0 {
        notes.push(format!("{failures} attempt(s) failed before success"));
    }
    if stage.is_delegation {
        notes.push("Subdomain delegation".to_string());
    }
    if stage.stage_type == StageType::Negative && stage.has_dnssec() {
        notes.push(format!(
            "Non-existence backed by {} DNSSEC record(s)",
            stage.dnssec_records.len()
        ));
    }
    notes
}

/// Summarizes attempt timing; a successful attempt's time is kept even when 0.
pub fn timing_summary(attempts: &[Attempt]) -> TimingSummary {
    let successful_time_ms = attempts
        .iter()
        .find(|a| a.result == AttemptResult::Success)
        .and_then(|a| a.elapsed_ms);
    let failed: Vec<FailedAttempt> = attempts
        .iter()
        .filter(|a| a.result != AttemptResult::Success)
        .map(|a| FailedAttempt {
            target: a.target_ip.clone(),
            time_ms: a.elapsed_ms,
            result: a.result,
        })
        .collect();

    TimingSummary {
        total_time_ms: successful_time_ms,
        successful_time_ms,
        failed_attempts: failed.len(),
        failed_attempts_details: failed,
    }
}
