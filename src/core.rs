//! Core domain types and service traits for dnstrace
//!
//! This module defines the data model of a reconstructed delegation walk and
//! the trait contracts for the two external collaborators: the trace tool and
//! the nameserver lookups used by the zone-boundary prober.

use crate::probe::ProbeError;
use crate::runner::TraceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// The structural classification of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    Root,
    Tld,
    Delegation,
    Authoritative,
    Final,
    Negative,
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageType::Root => "root",
            StageType::Tld => "tld",
            StageType::Delegation => "delegation",
            StageType::Authoritative => "authoritative",
            StageType::Final => "final",
            StageType::Negative => "negative",
        };
        f.write_str(s)
    }
}

/// A single resource record line, as printed by the trace tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// Owner name exactly as printed (usually with a trailing dot).
    pub name: String,
    pub ttl: u32,
    pub record_type: String,
    /// Everything after the type column.
    pub data: String,
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\tIN\t{}\t{}",
            self.name, self.ttl, self.record_type, self.data
        )
    }
}

/// A DNSSEC-related record carried by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnssecRecord {
    pub name: String,
    pub ttl: u32,
    pub record_type: String,
    pub raw_data: String,
}

impl From<&ResourceRecord> for DnssecRecord {
    fn from(record: &ResourceRecord) -> Self {
        Self {
            name: record.name.clone(),
            ttl: record.ttl,
            record_type: record.record_type.clone(),
            raw_data: record.data.clone(),
        }
    }
}

/// The server that answered a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondingServer {
    pub hostname: String,
    pub ip: String,
    pub port: u16,
}

/// The SOA record backing a negative-existence answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityRecord {
    pub zone: String,
    pub ttl: u32,
    pub data: String,
}

/// One zone-delegation step of the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStage {
    pub zone: String,
    #[serde(rename = "type")]
    pub stage_type: StageType,
    pub nameservers: Vec<String>,
    pub ttl: u32,
    pub dnssec_records: Vec<DnssecRecord>,
    pub responding_server: Option<RespondingServer>,
    pub received_bytes: u64,
    pub response_time_ms: u64,
    pub is_delegation: bool,
    pub delegates_to_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_record: Option<AuthorityRecord>,
    /// Answer and authority records of this stage.
    pub records_returned: Vec<ResourceRecord>,
    pub attempts: Vec<Attempt>,
}

impl TraceStage {
    /// Creates an empty stage of the given type for `zone`.
    pub fn new(zone: impl Into<String>, stage_type: StageType) -> Self {
        Self {
            zone: zone.into(),
            stage_type,
            nameservers: Vec::new(),
            ttl: 0,
            dnssec_records: Vec::new(),
            responding_server: None,
            received_bytes: 0,
            response_time_ms: 0,
            is_delegation: false,
            delegates_to_domain: None,
            answer_value: None,
            answer_type: None,
            authority_record: None,
            records_returned: Vec::new(),
            attempts: Vec::new(),
        }
    }

    pub fn has_dnssec(&self) -> bool {
        !self.dnssec_records.is_empty()
    }

    /// Hostname of the responding server, if one was recorded.
    pub fn responder_hostname(&self) -> Option<&str> {
        self.responding_server.as_ref().map(|s| s.hostname.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// IPv6 literals are the only addresses that contain a colon.
    pub fn of(ip: &str) -> Self {
        if ip.contains(':') {
            AddressFamily::Ipv6
        } else {
            AddressFamily::Ipv4
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Success,
    Timeout,
    NetworkUnreachable,
    Error,
}

impl fmt::Display for AttemptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptResult::Success => "success",
            AttemptResult::Timeout => "timeout",
            AttemptResult::NetworkUnreachable => "network_unreachable",
            AttemptResult::Error => "error",
        };
        f.write_str(s)
    }
}

/// One transport-level try to reach a server during a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub attempt_index: usize,
    pub target_ip: String,
    pub target_hostname: Option<String>,
    pub address_family: AddressFamily,
    pub transport_protocol: TransportProtocol,
    pub result: AttemptResult,
    pub elapsed_ms: Option<u64>,
    pub bytes_received: u64,
    pub error_message: Option<String>,
    pub raw_line: String,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Runs the external trace tool and captures its output.
#[async_trait]
pub trait TraceRunner: Send + Sync {
    /// Runs an iterative trace for `domain` and `record_type`.
    ///
    /// # Returns
    /// * `Ok(String)` with the captured standard output
    /// * `Err` when the tool is missing, times out, overflows the output
    ///   limit or exits unsuccessfully
    async fn run(&self, domain: &str, record_type: &str) -> Result<String, TraceError>;
}

/// Resolves the records the zone-boundary prober needs.
#[async_trait]
pub trait NameserverLookup: Send + Sync {
    /// Returns the NS hostnames (without trailing dot) published for `zone`.
    async fn nameservers(&self, zone: &str) -> Result<Vec<String>, ProbeError>;

    /// Returns the IPv4 addresses of `domain`.
    async fn addresses(&self, domain: &str) -> Result<Vec<IpAddr>, ProbeError>;
}
