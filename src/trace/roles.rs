//! Responder role inference from nameserver hostnames.

use crate::knowledge::{
    CCTLD_SERVER_PREFIXES, LOCAL_RESOLVER_NAMES, ROOT_SERVER_SUFFIX, TLD_SERVER_FRAGMENTS,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static CCTLD_SERVER_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = CCTLD_SERVER_PREFIXES.join("|");
    Regex::new(&format!(r"\.({alternatives})-servers?\.")).unwrap()
});

/// The kind of server that actually answered a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    Resolver,
    Root,
    Tld,
    Authoritative,
    Unknown,
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerRole::Resolver => "resolver",
            ServerRole::Root => "root",
            ServerRole::Tld => "tld",
            ServerRole::Authoritative => "authoritative",
            ServerRole::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Infers the role of a responder from its hostname (or IP literal).
pub fn detect_role(hostname: Option<&str>) -> ServerRole {
    let Some(hostname) = hostname.filter(|h| !h.is_empty()) else {
        return ServerRole::Unknown;
    };
    let host = hostname.to_ascii_lowercase();

    if host.starts_with("127.") || LOCAL_RESOLVER_NAMES.contains(&host.as_str()) {
        return ServerRole::Resolver;
    }

    if host.contains(ROOT_SERVER_SUFFIX) {
        return ServerRole::Root;
    }

    if TLD_SERVER_FRAGMENTS.iter().any(|f| host.contains(f)) || CCTLD_SERVER_RE.is_match(&host) {
        return ServerRole::Tld;
    }

    ServerRole::Authoritative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_resolvers() {
        assert_eq!(detect_role(Some("127.0.0.53")), ServerRole::Resolver);
        assert_eq!(detect_role(Some("localhost")), ServerRole::Resolver);
        assert_eq!(detect_role(Some("::1")), ServerRole::Resolver);
        assert_eq!(detect_role(Some("systemd-resolved")), ServerRole::Resolver);
    }

    #[test]
    fn test_root_and_tld_servers() {
        assert_eq!(detect_role(Some("F.ROOT-SERVERS.NET")), ServerRole::Root);
        assert_eq!(detect_role(Some("a.gtld-servers.net")), ServerRole::Tld);
        assert_eq!(detect_role(Some("ns1.registry.in")), ServerRole::Tld);
        // The country code must follow a dot.
        assert_eq!(detect_role(Some("in-servers.example")), ServerRole::Authoritative);
        assert_eq!(detect_role(Some("b.de-server.net")), ServerRole::Tld);
        assert_eq!(detect_role(Some("x.trs-dns.com")), ServerRole::Tld);
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(detect_role(None), ServerRole::Unknown);
        assert_eq!(detect_role(Some("")), ServerRole::Unknown);
        assert_eq!(detect_role(Some("a.iana-servers.net")), ServerRole::Authoritative);
        assert_eq!(detect_role(Some("192.0.2.10")), ServerRole::Authoritative);
        assert_eq!(detect_role(Some("2001:db8::1")), ServerRole::Authoritative);
    }
}
