//! Zone-boundary prober and cross-check.
//!
//! The prober asks a regular resolver, level by level, whether each suffix of
//! a domain publishes NS records. That tells which levels are real zone cuts.
//! The cross-check compares those boundaries with the stages reconstructed
//! from a trace.

use crate::config::ProbeConfig;
use crate::core::{NameserverLookup, StageType, TraceStage};
use crate::domain::{DomainError, DomainHierarchy, LevelKind};
use crate::tracer::{LiveTracer, TraceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use hickory_resolver::{
    config::{NameServerConfig, ResolverConfig, ResolverOpts},
    proto::rr::{RData, RecordType},
    proto::xfer::Protocol,
    system_conf, TokioResolver,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Note attached to intermediate levels that have no zone cut of their own.
pub const NOT_DELEGATED_NOTE: &str = "No delegation - served by parent zone";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error(transparent)]
    InvalidDomain(#[from] DomainError),

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("invalid resolver configuration: {0}")]
    Config(String),
}

/// NS and address lookups backed by hickory-resolver.
pub struct HickoryNameserverLookup {
    resolver: TokioResolver,
}

impl HickoryNameserverLookup {
    /// Creates a lookup service from the prober configuration.
    ///
    /// Returns the service and the nameservers it will query.
    pub fn from_config(config: &ProbeConfig) -> Result<(Self, Vec<SocketAddr>), ProbeError> {
        let resolver_config = if let Some(resolver) = &config.resolver {
            // A configured resolver is used exclusively.
            let mut custom_config = ResolverConfig::new();
            custom_config.add_name_server(NameServerConfig::new(
                parse_resolver_addr(resolver)?,
                Protocol::Udp,
            ));
            custom_config
        } else {
            let (system_config, _) = system_conf::read_system_conf()
                .map_err(|e| ProbeError::Config(e.to_string()))?;
            if system_config.name_servers().is_empty() {
                warn!("No system DNS servers found, falling back to Cloudflare DNS.");
                ResolverConfig::cloudflare()
            } else {
                system_config
            }
        };

        // Drop search domains; probe names are always fully qualified.
        let mut resolver_config_no_search = ResolverConfig::new();
        for ns in resolver_config.name_servers() {
            resolver_config_no_search.add_name_server(ns.clone());
        }

        let mut nameservers: Vec<_> = resolver_config_no_search
            .name_servers()
            .iter()
            .map(|ns| ns.socket_addr)
            .collect();
        nameservers.sort();
        nameservers.dedup();

        let mut resolver_opts = ResolverOpts::default();
        resolver_opts.ndots = 1;
        resolver_opts.timeout = Duration::from_millis(config.timeout_ms);

        let resolver = hickory_resolver::Resolver::builder_with_config(
            resolver_config_no_search,
            hickory_resolver::name_server::TokioConnectionProvider::default(),
        )
        .with_options(resolver_opts)
        .build();

        Ok((Self { resolver }, nameservers))
    }
}

/// Accepts `IP:PORT` or a bare IP (port 53).
fn parse_resolver_addr(value: &str) -> Result<SocketAddr, ProbeError> {
    value
        .parse::<SocketAddr>()
        .or_else(|_| value.parse::<IpAddr>().map(|ip| SocketAddr::new(ip, 53)))
        .map_err(|_| ProbeError::Config(format!("not an IP or IP:PORT: {value}")))
}

/// Checks if a lookup error only says that no records exist.
fn is_empty_answer(err: &str) -> bool {
    let lower = err.to_lowercase();
    lower.contains("nxdomain") || lower.contains("no records found")
}

fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

#[async_trait]
impl NameserverLookup for HickoryNameserverLookup {
    async fn nameservers(&self, zone: &str) -> Result<Vec<String>, ProbeError> {
        match self.resolver.lookup(fqdn(zone), RecordType::NS).await {
            Ok(lookup) => {
                metrics::counter!("ns_lookups_total", "status" => "success").increment(1);
                Ok(lookup
                    .iter()
                    .filter_map(|rdata| match rdata {
                        RData::NS(ns) => Some(ns.0.to_utf8().trim_end_matches('.').to_string()),
                        _ => None,
                    })
                    .collect())
            }
            Err(e) => {
                let err_string = e.to_string();
                if is_empty_answer(&err_string) {
                    metrics::counter!("ns_lookups_total", "status" => "empty").increment(1);
                    trace!(zone, error = %err_string, "No NS records");
                    Ok(Vec::new())
                } else {
                    metrics::counter!("ns_lookups_total", "status" => "failure").increment(1);
                    Err(ProbeError::Lookup(err_string))
                }
            }
        }
    }

    async fn addresses(&self, domain: &str) -> Result<Vec<IpAddr>, ProbeError> {
        match self.resolver.lookup(fqdn(domain), RecordType::A).await {
            Ok(lookup) => Ok(lookup.iter().filter_map(|r| r.ip_addr()).collect()),
            Err(e) if is_empty_answer(&e.to_string()) => Ok(Vec::new()),
            Err(e) => Err(ProbeError::Lookup(e.to_string())),
        }
    }
}

/// NS probe result for one level of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBoundary {
    pub zone: String,
    pub level: LevelKind,
    pub has_ns: bool,
    pub nameservers: Vec<String>,
    pub is_delegated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTime {
    pub domain: String,
    pub query_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBoundaries {
    pub domain: String,
    /// Root first, then each suffix inward.
    pub boundaries: Vec<ZoneBoundary>,
    pub query_times: Vec<QueryTime>,
}

impl ZoneBoundaries {
    /// Levels that are actual zone cuts, root included.
    pub fn actual_zones(&self) -> impl Iterator<Item = &ZoneBoundary> {
        self.boundaries.iter().filter(|b| b.is_delegated)
    }

    pub fn non_delegated_levels(&self) -> impl Iterator<Item = &ZoneBoundary> {
        self.boundaries.iter().filter(|b| !b.is_delegated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// A trace stage names a zone that has no NS records live.
    UnconfirmedZone,
    /// A live zone cut does not appear among the trace stages.
    MissingDelegation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub zone: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossCheck {
    pub differences: Vec<Discrepancy>,
    pub is_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationPathEntry {
    pub zone: String,
    pub level: LevelKind,
    pub nameservers: Vec<String>,
    pub query_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub ns_queries: Vec<QueryTime>,
    pub address_query_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub total_stages: usize,
    pub delegated_levels: Vec<String>,
    pub non_delegated_subdomains: Vec<String>,
    pub delegation_path: Vec<DelegationPathEntry>,
    pub timing: TimingBreakdown,
}

/// Trace, zone boundaries and addresses of one domain, gathered concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationChain {
    pub domain: String,
    pub trace: TraceResult,
    pub zone_boundaries: ZoneBoundaries,
    pub final_ip: Option<IpAddr>,
    pub all_ips: Vec<IpAddr>,
    pub timestamp: DateTime<Utc>,
    pub summary: ChainSummary,
    /// Present only when the trace succeeded.
    pub cross_check: Option<CrossCheck>,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

pub struct ZoneProber {
    lookup: Arc<dyn NameserverLookup>,
}

impl ZoneProber {
    pub fn new(lookup: Arc<dyn NameserverLookup>) -> Self {
        Self { lookup }
    }

    /// Probes every level of `domain` for NS records.
    ///
    /// The root is always a boundary. The per-level lookups run concurrently
    /// and the result keeps the hierarchy order.
    #[instrument(skip(self))]
    pub async fn determine_zone_boundaries(&self, domain: &str) -> Result<ZoneBoundaries, ProbeError> {
        let hierarchy = DomainHierarchy::parse(domain)?;
        let last_depth = hierarchy.labels.len();

        let probes = hierarchy.levels.iter().skip(1).map(|level| {
            let lookup = Arc::clone(&self.lookup);
            let zone = level.zone();
            async move {
                let start = Instant::now();
                let result = lookup.nameservers(&zone).await;
                (zone, result, millis(start.elapsed()))
            }
        });
        let results = join_all(probes).await;

        let mut boundaries = vec![ZoneBoundary {
            zone: ".".to_string(),
            level: LevelKind::Root,
            has_ns: true,
            nameservers: Vec::new(),
            is_delegated: true,
            query_time_ms: None,
            note: None,
            error: None,
        }];
        let mut query_times = Vec::with_capacity(results.len());

        for (level, (zone, result, elapsed)) in hierarchy.levels.iter().skip(1).zip(results) {
            query_times.push(QueryTime {
                domain: zone.clone(),
                query_time_ms: elapsed,
            });
            let (nameservers, error) = match result {
                Ok(ns) => (ns, None),
                Err(e) => {
                    warn!(zone = %zone, error = %e, "NS lookup failed");
                    (Vec::new(), Some(e.to_string()))
                }
            };
            let has_ns = !nameservers.is_empty();
            let kind = match level.kind {
                LevelKind::Intermediate => LevelKind::Authoritative,
                other => other,
            };
            let note = (!has_ns && level.depth != last_depth).then(|| NOT_DELEGATED_NOTE.to_string());
            debug!(zone = %zone, has_ns, "Probed level");
            boundaries.push(ZoneBoundary {
                zone,
                level: kind,
                has_ns,
                nameservers,
                is_delegated: has_ns,
                query_time_ms: Some(elapsed),
                note,
                error,
            });
        }

        Ok(ZoneBoundaries {
            domain: hierarchy.normalized,
            boundaries,
            query_times,
        })
    }

    /// Runs the trace, the boundary probe and an address lookup concurrently
    /// and combines them once all three have settled.
    #[instrument(skip(self, tracer))]
    pub async fn delegation_chain(
        &self,
        tracer: &LiveTracer,
        domain: &str,
    ) -> Result<DelegationChain, ProbeError> {
        let start = Instant::now();
        let address_lookup = async {
            let start = Instant::now();
            let result = self.lookup.addresses(domain).await;
            (result, millis(start.elapsed()))
        };

        let (trace, boundaries, (addresses, address_query_ms)) = tokio::join!(
            tracer.trace(domain, "A"),
            self.determine_zone_boundaries(domain),
            address_lookup
        );
        let total_ms = millis(start.elapsed());
        let zone_boundaries = boundaries?;
        let all_ips = addresses.unwrap_or_else(|e| {
            warn!(error = %e, "Address lookup failed");
            Vec::new()
        });

        let cross_check = trace
            .success
            .then(|| cross_check(&zone_boundaries, &trace.stages));
        let summary = ChainSummary {
            total_stages: if trace.success {
                trace.stages.len()
            } else {
                zone_boundaries.actual_zones().count()
            },
            delegated_levels: zone_boundaries.actual_zones().map(|z| z.zone.clone()).collect(),
            non_delegated_subdomains: zone_boundaries
                .non_delegated_levels()
                .map(|z| z.zone.clone())
                .collect(),
            delegation_path: zone_boundaries
                .actual_zones()
                .map(|z| DelegationPathEntry {
                    zone: z.zone.clone(),
                    level: z.level,
                    nameservers: z.nameservers.clone(),
                    query_time_ms: z.query_time_ms,
                })
                .collect(),
            timing: TimingBreakdown {
                ns_queries: zone_boundaries.query_times.clone(),
                address_query_ms,
                total_ms,
            },
        };

        Ok(DelegationChain {
            domain: zone_boundaries.domain.clone(),
            final_ip: all_ips.first().copied(),
            all_ips,
            timestamp: Utc::now(),
            trace,
            zone_boundaries,
            summary,
            cross_check,
        })
    }
}

/// Compares live zone cuts with the zones of reconstructed referral stages.
pub fn cross_check(boundaries: &ZoneBoundaries, stages: &[TraceStage]) -> CrossCheck {
    let delegated: HashSet<&str> = boundaries.actual_zones().map(|b| b.zone.as_str()).collect();
    let referrals: Vec<&str> = stages
        .iter()
        .filter(|s| {
            matches!(
                s.stage_type,
                StageType::Tld | StageType::Delegation | StageType::Authoritative
            )
        })
        .map(|s| s.zone.as_str())
        .unique()
        .collect();

    let mut differences: Vec<Discrepancy> = referrals
        .iter()
        .filter(|zone| !delegated.contains(*zone))
        .map(|zone| Discrepancy {
            kind: DiscrepancyKind::UnconfirmedZone,
            zone: zone.to_string(),
            message: format!("Trace shows a referral for {zone} but it has no NS records"),
        })
        .collect();
    for boundary in boundaries.actual_zones().filter(|b| b.zone != ".") {
        if !referrals.contains(&boundary.zone.as_str()) {
            differences.push(Discrepancy {
                kind: DiscrepancyKind::MissingDelegation,
                zone: boundary.zone.clone(),
                message: format!("Delegation for {} is not shown in the trace", boundary.zone),
            });
        }
    }

    CrossCheck {
        is_consistent: differences.is_empty(),
        differences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(zone: &str, delegated: bool) -> ZoneBoundary {
        ZoneBoundary {
            zone: zone.into(),
            level: LevelKind::Authoritative,
            has_ns: delegated,
            nameservers: Vec::new(),
            is_delegated: delegated,
            query_time_ms: Some(1),
            note: None,
            error: None,
        }
    }

    #[test]
    fn test_parse_resolver_addr() {
        assert_eq!(
            parse_resolver_addr("1.1.1.1:5353").unwrap(),
            "1.1.1.1:5353".parse().unwrap()
        );
        assert_eq!(
            parse_resolver_addr("9.9.9.9").unwrap(),
            "9.9.9.9:53".parse().unwrap()
        );
        assert!(parse_resolver_addr("resolver.local").is_err());
    }

    #[test]
    fn test_cross_check_consistent() {
        let boundaries = ZoneBoundaries {
            domain: "www.example.com".into(),
            boundaries: vec![
                boundary(".", true),
                boundary("com", true),
                boundary("example.com", true),
                boundary("www.example.com", false),
            ],
            query_times: Vec::new(),
        };
        let stages = vec![
            TraceStage::new(".", StageType::Root),
            TraceStage::new("com", StageType::Tld),
            TraceStage::new("example.com", StageType::Delegation),
            TraceStage::new("www.example.com", StageType::Final),
        ];
        let check = cross_check(&boundaries, &stages);
        assert!(check.is_consistent, "{:?}", check.differences);
    }

    #[test]
    fn test_cross_check_reports_both_directions() {
        let boundaries = ZoneBoundaries {
            domain: "a.b.example.com".into(),
            boundaries: vec![
                boundary(".", true),
                boundary("com", true),
                boundary("example.com", true),
                boundary("b.example.com", true),
                boundary("a.b.example.com", false),
            ],
            query_times: Vec::new(),
        };
        let stages = vec![
            TraceStage::new("com", StageType::Tld),
            TraceStage::new("example.com", StageType::Delegation),
            TraceStage::new("a.b.example.com", StageType::Authoritative),
        ];
        let check = cross_check(&boundaries, &stages);
        assert!(!check.is_consistent);
        let kinds: Vec<(DiscrepancyKind, &str)> = check
            .differences
            .iter()
            .map(|d| (d.kind, d.zone.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (DiscrepancyKind::UnconfirmedZone, "a.b.example.com"),
                (DiscrepancyKind::MissingDelegation, "b.example.com"),
            ]
        );
    }
}
