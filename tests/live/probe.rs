//! Live tests against real resolvers and the installed trace tool.
//!
//! Run with `--features live-tests`. They need outbound DNS and, for the
//! trace test, `dig` on `PATH`.

use dnstrace::config::{ProbeConfig, TracerConfig};
use dnstrace::probe::{HickoryNameserverLookup, ZoneProber};
use dnstrace::runner::DigTraceRunner;
use dnstrace::tracer::LiveTracer;
use dnstrace::NameserverLookup;
use std::sync::Arc;

fn probe_config() -> ProbeConfig {
    ProbeConfig {
        resolver: Some("1.1.1.1:53".to_string()),
        timeout_ms: 5000,
    }
}

#[tokio::test]
async fn test_live_ns_lookup() {
    let (lookup, nameservers) = HickoryNameserverLookup::from_config(&probe_config()).unwrap();
    assert_eq!(nameservers.len(), 1);

    let ns = lookup.nameservers("com").await.unwrap();
    println!("com NS: {ns:?}");
    assert!(ns.iter().any(|n| n.ends_with("gtld-servers.net")));

    let ips = lookup.addresses("example.com").await.unwrap();
    assert!(!ips.is_empty());
}

#[tokio::test]
async fn test_live_zone_boundaries() {
    let (lookup, _) = HickoryNameserverLookup::from_config(&probe_config()).unwrap();
    let prober = ZoneProber::new(Arc::new(lookup));

    let result = prober.determine_zone_boundaries("www.example.com").await.unwrap();
    for b in &result.boundaries {
        println!("{:<20} delegated={} ns={:?}", b.zone, b.is_delegated, b.nameservers);
    }
    assert!(result.boundaries[1].is_delegated);
    assert!(result.boundaries[2].is_delegated);
}

#[tokio::test]
async fn test_live_trace() {
    let config = TracerConfig {
        command: "dig".to_string(),
        timeout_ms: 30_000,
        max_output_bytes: 1024 * 1024,
        default_record_type: "A".to_string(),
    };
    let tracer = LiveTracer::new(Arc::new(DigTraceRunner::from_config(&config)));

    let result = tracer.trace("example.com", "A").await;
    assert!(result.success, "{:?}", result.error);
    assert!(result.stages.len() >= 3);
    assert_eq!(result.total_steps(), result.stages.len() * 2);
}
