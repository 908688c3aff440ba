//! Static lookup tables shared by the reconstruction engine.
//!
//! Everything here is immutable process-wide data, built on first access.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use crate::trace::diagnostics::DiagnosticKind;

/// Top-level domains the classifier treats as `tld` stages.
pub static KNOWN_TLDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "com", "org", "net", "edu", "gov", "mil", "int", "info", "biz", "in", "uk", "de", "fr",
        "jp", "cn", "au", "br", "ru", "za", "nz", "sg", "hk", "tw", "kr", "th", "vn", "ph", "my",
        "id", "io", "ai", "co",
    ]
    .into_iter()
    .collect()
});

/// Registry-operated second-level suffixes (e.g. `co.uk`).
pub static KNOWN_SLD_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // uk
        "co.uk", "ac.uk", "gov.uk", "org.uk", "net.uk", "sch.uk", "nhs.uk", "police.uk",
        // in
        "co.in", "ac.in", "gov.in", "org.in", "net.in", "edu.in", "nic.in", "res.in",
        // au
        "com.au", "edu.au", "gov.au", "net.au", "org.au", "asn.au", "id.au",
        // jp
        "co.jp", "ac.jp", "go.jp", "or.jp", "ne.jp", "gr.jp", "ed.jp",
        // cn
        "com.cn", "edu.cn", "gov.cn", "net.cn", "org.cn", "ac.cn",
        // br
        "com.br", "edu.br", "gov.br", "net.br", "org.br",
        // nz
        "co.nz", "ac.nz", "govt.nz", "net.nz", "org.nz",
        // za
        "co.za", "ac.za", "gov.za", "net.za", "org.za",
    ]
    .into_iter()
    .collect()
});

/// Hostname fragments that identify TLD registry nameservers.
pub static TLD_SERVER_FRAGMENTS: &[&str] = &["gtld-servers.net", "cctld", "registry.in", "trs-dns"];

/// Country codes whose registries name servers `<cc>-server.` / `<cc>-servers.`.
pub static CCTLD_SERVER_PREFIXES: &[&str] = &[
    "in", "uk", "de", "fr", "jp", "cn", "au", "br", "ru", "za", "nz", "sg", "hk", "tw", "kr",
    "th", "vn", "ph", "my", "id",
];

/// Domain suffix shared by the root server operators.
pub const ROOT_SERVER_SUFFIX: &str = "root-servers.net";

/// Hostnames that always denote a stub or local recursive resolver.
pub static LOCAL_RESOLVER_NAMES: &[&str] = &["localhost", "::1", "systemd-resolved"];

/// Fixed human-readable text attached to each diagnostic category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticText {
    pub reason: &'static str,
    pub explanation: &'static str,
    pub impact: &'static str,
}

/// Explanation strings keyed by diagnostic kind. These strings are consumed
/// verbatim by renderers and must not change.
pub static DIAGNOSTIC_TEXT: Lazy<HashMap<DiagnosticKind, DiagnosticText>> = Lazy::new(|| {
    HashMap::from([
        (
            DiagnosticKind::Ipv6Unreachable,
            DiagnosticText {
                reason: "IPv6 network unreachable",
                explanation: "The system attempted to use IPv6 but your network does not support it. This is normal and DNS falls back to IPv4.",
                impact: "No impact - DNS automatically retries with IPv4",
            },
        ),
        (
            DiagnosticKind::Timeout,
            DiagnosticText {
                reason: "Connection timeout",
                explanation: "The DNS server did not respond within the timeout period. This can happen due to network congestion, firewall rules, or server load.",
                impact: "DNS will retry with other nameservers automatically",
            },
        ),
        (
            DiagnosticKind::NoServersReached,
            DiagnosticText {
                reason: "No servers could be reached",
                explanation: "All attempts to contact the current set of servers failed. This message appears after IPv6 attempts before IPv4 retry.",
                impact: "DNS continues with IPv4 servers",
            },
        ),
        (
            DiagnosticKind::UdpSetupFailed,
            DiagnosticText {
                reason: "UDP setup failed",
                explanation: "Failed to establish UDP connection for DNS query.",
                impact: "DNS falls back to alternative servers or protocols",
            },
        ),
        (
            DiagnosticKind::CommunicationError,
            DiagnosticText {
                reason: "Communication error",
                explanation: "The DNS server could not be contacted or returned an unusable reply.",
                impact: "DNS retries the query against the remaining nameservers",
            },
        ),
    ])
});

/// Looks up the fixed text for a diagnostic kind.
pub fn diagnostic_text(kind: DiagnosticKind) -> DiagnosticText {
    DIAGNOSTIC_TEXT[&kind]
}

/// Returns `true` if `zone` is one of the known top-level domains.
pub fn is_known_tld(zone: &str) -> bool {
    KNOWN_TLDS.contains(zone)
}

/// Returns `true` if `suffix` is a known registry second-level suffix.
pub fn is_known_sld(suffix: &str) -> bool {
    KNOWN_SLD_SUFFIXES.contains(suffix)
}
