//! Attaches per-stage connection attempts to classified stages.
//!
//! The extractor is a single fold over the token stream. Its only state is
//! the cursor below; every receipt line opens the next stage, and failures
//! are attributed to whichever stage is currently open. Stages are slots,
//! one per segmented stage; an empty slot still consumes its receipt.

use super::tokenizer::{CommunicationFailure, Receipt, SetupFailure, Token, TraceLine};
use crate::core::{AddressFamily, Attempt, AttemptResult, RespondingServer, TraceStage, TransportProtocol};
use tracing::trace;

/// Fold state of the attempt extractor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptCursor {
    /// Index of the stage currently receiving attempts.
    pub stage: Option<usize>,
    /// Ordinal of the next attempt within that stage.
    pub next_attempt: usize,
}

impl AttemptCursor {
    fn open_next_stage(self) -> Self {
        Self {
            stage: Some(self.stage.map_or(0, |i| i + 1)),
            next_attempt: 0,
        }
    }

    /// Appends `attempt` to the open stage, if there is one.
    fn record(self, stages: &mut [Option<TraceStage>], attempt: impl FnOnce(usize) -> Attempt) -> Self {
        match self.stage.and_then(|i| stages.get_mut(i)?.as_mut()) {
            Some(stage) => {
                stage.attempts.push(attempt(self.next_attempt));
                Self {
                    next_attempt: self.next_attempt + 1,
                    ..self
                }
            }
            None => self,
        }
    }

    /// Advances the cursor over one token.
    pub fn step(self, stages: &mut [Option<TraceStage>], token: &Token) -> Self {
        match &token.line {
            TraceLine::Received(receipt) => {
                let cursor = self.open_next_stage();
                let Some(receipt) = receipt else {
                    return cursor;
                };
                if let Some(stage) = cursor.stage.and_then(|i| stages.get_mut(i)?.as_mut()) {
                    if stage.responding_server.is_none() {
                        stage.responding_server = Some(RespondingServer {
                            hostname: receipt.hostname.clone(),
                            ip: receipt.ip.clone(),
                            port: receipt.port,
                        });
                    }
                }
                cursor.record(stages, |index| success(index, receipt, &token.raw))
            }
            TraceLine::SetupFailed(failure) => {
                self.record(stages, |index| setup_failure(index, failure, &token.raw))
            }
            TraceLine::CommunicationError(failure) => {
                self.record(stages, |index| communication_failure(index, failure, &token.raw))
            }
            _ => self,
        }
    }
}

/// Re-scans the token stream and appends attempts to `stages` in place.
///
/// Failures seen before the first receipt line have no open stage and are
/// not attributed.
pub fn attach_attempts(stages: &mut [Option<TraceStage>], tokens: &[Token]) -> AttemptCursor {
    let cursor = tokens
        .iter()
        .fold(AttemptCursor::default(), |cursor, token| cursor.step(stages, token));
    trace!(?cursor, "Attempt extraction finished");
    cursor
}

fn success(index: usize, receipt: &Receipt, raw: &str) -> Attempt {
    Attempt {
        attempt_index: index,
        target_ip: receipt.ip.clone(),
        target_hostname: Some(receipt.hostname.clone()),
        address_family: AddressFamily::of(&receipt.ip),
        transport_protocol: protocol_of(raw),
        result: AttemptResult::Success,
        elapsed_ms: Some(receipt.elapsed_ms),
        bytes_received: receipt.bytes,
        error_message: None,
        raw_line: raw.to_string(),
    }
}

fn setup_failure(index: usize, failure: &SetupFailure, raw: &str) -> Attempt {
    let result = if failure.reason.contains("network unreachable") {
        AttemptResult::NetworkUnreachable
    } else {
        AttemptResult::Error
    };
    Attempt {
        attempt_index: index,
        target_ip: failure.ip.clone(),
        target_hostname: failure.hostname.clone(),
        address_family: AddressFamily::of(&failure.ip),
        transport_protocol: failure.protocol,
        result,
        elapsed_ms: None,
        bytes_received: 0,
        error_message: Some(failure.reason.clone()),
        raw_line: raw.to_string(),
    }
}

fn communication_failure(index: usize, failure: &CommunicationFailure, raw: &str) -> Attempt {
    let result = if failure.reason.contains("timed out") {
        AttemptResult::Timeout
    } else {
        AttemptResult::Error
    };
    Attempt {
        attempt_index: index,
        target_ip: failure.ip.clone(),
        target_hostname: None,
        address_family: AddressFamily::of(&failure.ip),
        transport_protocol: protocol_of(raw),
        result,
        elapsed_ms: None,
        bytes_received: 0,
        error_message: Some(failure.reason.clone()),
        raw_line: raw.to_string(),
    }
}

fn protocol_of(raw: &str) -> TransportProtocol {
    if raw.contains("TCP") {
        TransportProtocol::Tcp
    } else {
        TransportProtocol::Udp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageType;
    use crate::trace::tokenizer::tokenize;

    fn stages(n: usize) -> Vec<Option<TraceStage>> {
        (0..n)
            .map(|i| Some(TraceStage::new(format!("zone{i}"), StageType::Delegation)))
            .collect()
    }

    fn stage(stages: &[Option<TraceStage>], i: usize) -> &TraceStage {
        stages[i].as_ref().unwrap()
    }

    #[test]
    fn test_receipts_open_stages_in_order() {
        let text = "\
;; Received 525 bytes from 127.0.0.53#53(127.0.0.53) in 0 ms
;; Received 1170 bytes from 192.5.5.241#53(f.root-servers.net) in 42 ms
";
        let mut stages = stages(2);
        let cursor = attach_attempts(&mut stages, &tokenize(text));
        assert_eq!(cursor.stage, Some(1));
        assert_eq!(stage(&stages, 0).attempts.len(), 1);
        assert_eq!(stage(&stages, 1).attempts[0].target_hostname.as_deref(), Some("f.root-servers.net"));
        assert_eq!(stage(&stages, 1).attempts[0].elapsed_ms, Some(42));
        assert_eq!(stage(&stages, 1).attempts[0].bytes_received, 1170);
        assert_eq!(
            stage(&stages, 1).responding_server.as_ref().map(|s| s.ip.as_str()),
            Some("192.5.5.241")
        );
    }

    #[test]
    fn test_failures_attach_to_current_stage() {
        let text = "\
;; Received 525 bytes from 127.0.0.53#53(127.0.0.53) in 0 ms
UDP setup with 2001:500:2::c#53(2001:500:2::c) for example.com failed: network unreachable.
;; communications error to 192.33.4.12#53: timed out
;; communications error to 192.33.4.13#53: connection refused
";
        let mut stages = stages(1);
        attach_attempts(&mut stages, &tokenize(text));
        let attempts = &stage(&stages, 0).attempts;
        assert_eq!(attempts.len(), 4);
        assert_eq!(attempts[1].result, AttemptResult::NetworkUnreachable);
        assert_eq!(attempts[1].address_family, AddressFamily::Ipv6);
        assert_eq!(attempts[1].error_message.as_deref(), Some("network unreachable"));
        assert_eq!(attempts[2].result, AttemptResult::Timeout);
        assert_eq!(attempts[2].address_family, AddressFamily::Ipv4);
        assert_eq!(attempts[3].result, AttemptResult::Error);
        let indices: Vec<usize> = attempts.iter().map(|a| a.attempt_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(
            attempts.iter().filter(|a| a.result == AttemptResult::Success).count(),
            1
        );
    }

    #[test]
    fn test_failures_before_first_receipt_are_dropped() {
        let text = "\
;; communications error to 192.33.4.12#53: timed out
;; Received 525 bytes from 127.0.0.53#53(127.0.0.53) in 0 ms
";
        let mut stages = stages(1);
        attach_attempts(&mut stages, &tokenize(text));
        assert_eq!(stage(&stages, 0).attempts.len(), 1);
        assert_eq!(stage(&stages, 0).attempts[0].result, AttemptResult::Success);
    }

    #[test]
    fn test_empty_slot_consumes_its_receipt() {
        let text = "\
;; Received 525 bytes from 127.0.0.53#53(127.0.0.53) in 0 ms
;; Received 90 bytes from 192.0.2.1#53(ns.alias.example) in 5 ms
;; communications error to 192.0.2.2#53: timed out
;; Received 56 bytes from 192.0.2.53#53(a.iana-servers.net) in 12 ms
";
        let mut stages = stages(3);
        stages[1] = None;
        let cursor = attach_attempts(&mut stages, &tokenize(text));
        assert_eq!(cursor.stage, Some(2));
        assert_eq!(stage(&stages, 0).attempts.len(), 1);
        let last = &stage(&stages, 2).attempts;
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].target_hostname.as_deref(), Some("a.iana-servers.net"));
    }

    #[test]
    fn test_receipts_beyond_known_stages_are_ignored() {
        let text = ";; Received 525 bytes from 127.0.0.53#53(127.0.0.53) in 0 ms\n";
        let mut stages = stages(0);
        let cursor = attach_attempts(&mut stages, &tokenize(text));
        assert_eq!(cursor.stage, Some(0));
        assert_eq!(cursor.next_attempt, 0);
    }

    #[test]
    fn test_existing_responding_server_is_kept() {
        let mut stages = stages(1);
        stages[0].as_mut().unwrap().responding_server = Some(RespondingServer {
            hostname: "a.gtld-servers.net".into(),
            ip: "192.5.6.30".into(),
            port: 53,
        });
        let text = ";; Received 800 bytes from 192.12.94.30#53(e.gtld-servers.net) in 20 ms\n";
        attach_attempts(&mut stages, &tokenize(text));
        assert_eq!(
            stage(&stages, 0).responding_server.as_ref().unwrap().hostname,
            "a.gtld-servers.net"
        );
        assert_eq!(stage(&stages, 0).attempts[0].target_ip, "192.12.94.30");
    }
}
