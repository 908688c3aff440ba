//! Structural classification of raw stages.
//!
//! Classification is an ordered table of rules evaluated first-match-wins
//! against the stage's first record. A stage that matches no rule is left
//! unclassified; its slot is kept so receipt positions stay aligned.

use super::segmenter::RawStage;
use super::Query;
use crate::core::{AuthorityRecord, DnssecRecord, ResourceRecord, RespondingServer, StageType, TraceStage};
use crate::domain::{is_strict_subdomain, normalize};
use crate::knowledge;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static ZONE_OWNER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9.-]+\.$").unwrap());

/// Record types that carry DNSSEC material on a referral.
const DNSSEC_TYPES: &[&str] = &["DS", "RRSIG", "NSEC", "NSEC3", "DNSKEY"];

/// Record types that prove non-existence alongside an SOA.
const NEGATIVE_PROOF_TYPES: &[&str] = &["NSEC", "NSEC3", "RRSIG"];

struct Rule {
    name: &'static str,
    matches: fn(&ResourceRecord, &Query) -> bool,
    build: fn(&RawStage, &Query) -> TraceStage,
}

static RULES: &[Rule] = &[
    Rule {
        name: "root-ns",
        matches: is_root_ns,
        build: build_root,
    },
    Rule {
        name: "zone-ns",
        matches: is_zone_ns,
        build: build_zone,
    },
    Rule {
        name: "final-answer",
        matches: is_requested_type,
        build: build_final,
    },
    Rule {
        name: "negative",
        matches: is_soa,
        build: build_negative,
    },
];

fn is_root_ns(first: &ResourceRecord, _query: &Query) -> bool {
    first.name == "." && first.record_type == "NS"
}

fn is_zone_ns(first: &ResourceRecord, _query: &Query) -> bool {
    first.record_type == "NS" && ZONE_OWNER_RE.is_match(&first.name)
}

fn is_requested_type(first: &ResourceRecord, query: &Query) -> bool {
    first.record_type == query.record_type
}

fn is_soa(first: &ResourceRecord, _query: &Query) -> bool {
    first.record_type == "SOA"
}

/// Classifies a raw stage, returning `None` when no rule applies.
pub fn classify(raw: &RawStage, query: &Query) -> Option<TraceStage> {
    let first = raw.first()?;
    let Some(rule) = RULES.iter().find(|rule| (rule.matches)(first, query)) else {
        debug!(record = %first, "Stage matched no classification rule");
        return None;
    };

    let mut stage = (rule.build)(raw, query);
    stage.records_returned = raw
        .records
        .iter()
        .filter(|r| !DNSSEC_TYPES.contains(&r.record_type.as_str()))
        .cloned()
        .collect();

    if let Some(receipt) = &raw.receipt {
        stage.received_bytes = receipt.bytes;
        stage.response_time_ms = receipt.elapsed_ms;
        stage.responding_server = Some(RespondingServer {
            hostname: receipt.hostname.clone(),
            ip: receipt.ip.clone(),
            port: receipt.port,
        });
    }

    debug!(rule = rule.name, zone = %stage.zone, stage_type = %stage.stage_type, "Classified stage");
    Some(stage)
}

/// Classifies every raw stage, one slot per raw stage.
pub fn classify_all(raw: &[RawStage], query: &Query) -> Vec<Option<TraceStage>> {
    raw.iter().map(|r| classify(r, query)).collect()
}

fn build_root(raw: &RawStage, _query: &Query) -> TraceStage {
    let mut stage = TraceStage::new(".", StageType::Root);
    collect_referral(&mut stage, raw, |r| r.name == ".");
    stage
}

fn build_zone(raw: &RawStage, query: &Query) -> TraceStage {
    let zone = raw.first().map(|r| normalize(&r.name)).unwrap_or_default();

    let mut stage = if knowledge::is_known_tld(&zone) {
        TraceStage::new(zone, StageType::Tld)
    } else if is_strict_subdomain(&query.domain, &zone) {
        let mut stage = TraceStage::new(zone, StageType::Delegation);
        stage.is_delegation = true;
        stage.delegates_to_domain = Some(query.domain.clone());
        stage
    } else {
        TraceStage::new(zone, StageType::Authoritative)
    };

    collect_referral(&mut stage, raw, |_| true);
    stage
}

fn build_final(raw: &RawStage, query: &Query) -> TraceStage {
    let mut stage = TraceStage::new(query.domain.clone(), StageType::Final);
    if let Some(first) = raw.first() {
        stage.ttl = first.ttl;
        stage.answer_type = Some(first.record_type.clone());
        stage.answer_value = Some(first.data.clone());
    }
    stage.dnssec_records = dnssec_of(raw, DNSSEC_TYPES);
    stage
}

fn build_negative(raw: &RawStage, _query: &Query) -> TraceStage {
    let first = raw.first();
    let zone = first.map(|r| normalize(&r.name)).unwrap_or_default();
    let mut stage = TraceStage::new(zone.clone(), StageType::Negative);
    if let Some(soa) = first {
        stage.ttl = soa.ttl;
        stage.authority_record = Some(AuthorityRecord {
            zone,
            ttl: soa.ttl,
            data: soa.data.clone(),
        });
    }
    stage.dnssec_records = dnssec_of(raw, NEGATIVE_PROOF_TYPES);
    stage
}

/// Fills nameservers, TTL and DNSSEC material from a referral's records.
fn collect_referral(stage: &mut TraceStage, raw: &RawStage, owner_filter: fn(&ResourceRecord) -> bool) {
    for record in raw.records.iter().filter(|r| r.record_type == "NS" && owner_filter(r)) {
        if stage.nameservers.is_empty() {
            stage.ttl = record.ttl;
        }
        if let Some(host) = record.data.split_whitespace().next() {
            stage.nameservers.push(host.trim_end_matches('.').to_string());
        }
    }
    stage.dnssec_records = dnssec_of(raw, DNSSEC_TYPES);
}

fn dnssec_of(raw: &RawStage, types: &[&str]) -> Vec<DnssecRecord> {
    raw.records
        .iter()
        .filter(|r| types.contains(&r.record_type.as_str()))
        .map(DnssecRecord::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::tokenizer::parse_record;

    fn raw(lines: &[&str]) -> RawStage {
        RawStage {
            records: lines.iter().map(|l| parse_record(l).unwrap()).collect(),
            receipt: None,
        }
    }

    fn query(domain: &str, record_type: &str) -> Query {
        Query::new(domain, record_type)
    }

    #[test]
    fn test_root_stage() {
        let stage = classify(
            &raw(&[
                ". 518400 IN NS a.root-servers.net.",
                ". 518400 IN NS b.root-servers.net.",
                ". 518400 IN RRSIG NS 8 0 518400 20250801050000 20250719040000 46441 . sig==",
            ]),
            &query("example.com", "A"),
        )
        .unwrap();
        assert_eq!(stage.stage_type, StageType::Root);
        assert_eq!(stage.zone, ".");
        assert_eq!(stage.ttl, 518400);
        assert_eq!(stage.nameservers, vec!["a.root-servers.net", "b.root-servers.net"]);
        assert_eq!(stage.dnssec_records.len(), 1);
        assert_eq!(stage.records_returned.len(), 2);
    }

    #[test]
    fn test_tld_stage() {
        let stage = classify(
            &raw(&[
                "com. 172800 IN NS a.gtld-servers.net.",
                "com. 86400 IN DS 19718 13 2 8ACBB0CD28F41250A80A491389424D341522D946B0DA0C0291F2D3D771D7805A",
            ]),
            &query("example.com", "A"),
        )
        .unwrap();
        assert_eq!(stage.stage_type, StageType::Tld);
        assert_eq!(stage.zone, "com");
        assert!(!stage.is_delegation);
        assert_eq!(stage.dnssec_records[0].record_type, "DS");
    }

    #[test]
    fn test_delegation_stage() {
        let stage = classify(
            &raw(&["example.com. 172800 IN NS a.iana-servers.net."]),
            &query("www.example.com", "A"),
        )
        .unwrap();
        assert_eq!(stage.stage_type, StageType::Delegation);
        assert!(stage.is_delegation);
        assert_eq!(stage.delegates_to_domain.as_deref(), Some("www.example.com"));
    }

    #[test]
    fn test_authoritative_stage_for_queried_zone() {
        let stage = classify(
            &raw(&["example.com. 172800 IN NS a.iana-servers.net."]),
            &query("example.com", "A"),
        )
        .unwrap();
        assert_eq!(stage.stage_type, StageType::Authoritative);
        assert!(!stage.is_delegation);
        assert!(stage.delegates_to_domain.is_none());
    }

    #[test]
    fn test_final_stage() {
        let stage = classify(
            &raw(&[
                "example.com. 300 IN A 93.184.216.34",
                "example.com. 300 IN RRSIG A 13 2 300 20250801000000 20250718000000 12345 example.com. sig==",
            ]),
            &query("example.com.", "a"),
        )
        .unwrap();
        assert_eq!(stage.stage_type, StageType::Final);
        assert_eq!(stage.zone, "example.com");
        assert_eq!(stage.answer_value.as_deref(), Some("93.184.216.34"));
        assert_eq!(stage.answer_type.as_deref(), Some("A"));
        assert_eq!(stage.ttl, 300);
        assert!(stage.nameservers.is_empty());
    }

    #[test]
    fn test_negative_stage_vacuums_proof_records() {
        let stage = classify(
            &raw(&[
                "com. 900 IN SOA a.gtld-servers.net. nstld.verisign-grs.com. 1721 1800 900 604800 86400",
                "com. 900 IN RRSIG SOA 13 1 900 20250801000000 20250718000000 4534 com. sig==",
                "CK0POJMG874LJREF7EFN8430QVIT8BSM.com. 86400 IN NSEC3 1 1 0 - CK0Q3UDG8CEKKAE7RUKPGCT1DVSSH8LL NS SOA RRSIG DNSKEY NSEC3PARAM",
            ]),
            &query("doesnotexist.com", "A"),
        )
        .unwrap();
        assert_eq!(stage.stage_type, StageType::Negative);
        assert_eq!(stage.zone, "com");
        let soa = stage.authority_record.as_ref().unwrap();
        assert_eq!(soa.ttl, 900);
        assert!(soa.data.starts_with("a.gtld-servers.net."));
        let types: Vec<&str> = stage.dnssec_records.iter().map(|d| d.record_type.as_str()).collect();
        assert_eq!(types, vec!["RRSIG", "NSEC3"]);
    }

    #[test]
    fn test_soa_is_negative_even_when_zone_heuristics_apply() {
        let stage = classify(
            &raw(&["example.com. 3600 IN SOA ns.icann.org. noc.dns.icann.org. 1 7200 3600 1209600 3600"]),
            &query("missing.example.com", "A"),
        )
        .unwrap();
        assert_eq!(stage.stage_type, StageType::Negative);
        assert!(!stage.is_delegation);
    }

    #[test]
    fn test_soa_query_yields_final_answer() {
        let stage = classify(
            &raw(&["example.com. 3600 IN SOA ns.icann.org. noc.dns.icann.org. 1 7200 3600 1209600 3600"]),
            &query("example.com", "SOA"),
        )
        .unwrap();
        assert_eq!(stage.stage_type, StageType::Final);
    }

    #[test]
    fn test_unmatched_stage_is_unclassified() {
        let raw = raw(&["www.example.com. 300 IN CNAME example.com."]);
        assert!(classify(&raw, &query("www.example.com", "A")).is_none());
        assert_eq!(classify_all(&[raw], &query("www.example.com", "A")), vec![None]);
    }
}
