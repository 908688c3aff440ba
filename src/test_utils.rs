//! In-memory fakes for the service traits, enabled by the `test-utils` feature.

use crate::core::{NameserverLookup, TraceRunner};
use crate::probe::ProbeError;
use crate::runner::TraceError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Fake trace runner returning canned output per domain.
#[derive(Default)]
pub struct FakeTraceRunner {
    // The front of each queue is the next response for that domain.
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<String, TraceError>>>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeTraceRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues captured output for a domain.
    pub fn add_output(&self, domain: &str, output: &str) {
        let mut responses = self.responses.lock().unwrap();
        responses
            .entry(domain.to_string())
            .or_default()
            .push_back(Ok(output.to_string()));
    }

    /// Queues an invocation failure for a domain.
    pub fn add_error(&self, domain: &str, error: TraceError) {
        let mut responses = self.responses.lock().unwrap();
        responses
            .entry(domain.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Every `(domain, record_type)` the runner was called with, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TraceRunner for FakeTraceRunner {
    async fn run(&self, domain: &str, record_type: &str) -> Result<String, TraceError> {
        self.calls
            .lock()
            .unwrap()
            .push((domain.to_string(), record_type.to_string()));

        let mut responses = self.responses.lock().unwrap();
        responses
            .get_mut(domain)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(TraceError::Io(format!(
                    "No more responses configured for {}",
                    domain
                )))
            })
    }
}

/// Fake lookup service with fixed NS and address tables.
#[derive(Default)]
pub struct FakeNameserverLookup {
    nameservers: Mutex<HashMap<String, Result<Vec<String>, ProbeError>>>,
    addresses: Mutex<HashMap<String, Vec<IpAddr>>>,
    ns_calls: Mutex<HashMap<String, u32>>,
}

impl FakeNameserverLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes NS records for a zone. Unknown zones have none.
    pub fn with_zone(self, zone: &str, nameservers: &[&str]) -> Self {
        self.nameservers.lock().unwrap().insert(
            zone.to_string(),
            Ok(nameservers.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    /// Makes NS lookups for a zone fail.
    pub fn with_failure(self, zone: &str, message: &str) -> Self {
        self.nameservers
            .lock()
            .unwrap()
            .insert(zone.to_string(), Err(ProbeError::Lookup(message.to_string())));
        self
    }

    pub fn with_addresses(self, domain: &str, ips: &[IpAddr]) -> Self {
        self.addresses
            .lock()
            .unwrap()
            .insert(domain.to_string(), ips.to_vec());
        self
    }

    /// Number of NS lookups made for a zone.
    pub fn ns_call_count(&self, zone: &str) -> u32 {
        self.ns_calls.lock().unwrap().get(zone).copied().unwrap_or(0)
    }
}

#[async_trait]
impl NameserverLookup for FakeNameserverLookup {
    async fn nameservers(&self, zone: &str) -> Result<Vec<String>, ProbeError> {
        *self
            .ns_calls
            .lock()
            .unwrap()
            .entry(zone.to_string())
            .or_insert(0) += 1;
        self.nameservers
            .lock()
            .unwrap()
            .get(zone)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn addresses(&self, domain: &str) -> Result<Vec<IpAddr>, ProbeError> {
        Ok(self
            .addresses
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .unwrap_or_default())
    }
}
