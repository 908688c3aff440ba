//! Error and warning taxonomy for diagnostic lines.
//!
//! Each line falls into at most one category. The explanation and impact
//! strings come from [`crate::knowledge::DIAGNOSTIC_TEXT`] and are stable.

use super::tokenizer::{Token, TraceLine, CONTROL_MARKER};
use crate::core::AddressFamily;
use crate::knowledge::diagnostic_text;
use serde::{Deserialize, Serialize};

/// The fixed diagnostic kinds the extractor can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Ipv6Unreachable,
    Timeout,
    NoServersReached,
    UdpSetupFailed,
    CommunicationError,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; 5] = [
        DiagnosticKind::Ipv6Unreachable,
        DiagnosticKind::Timeout,
        DiagnosticKind::NoServersReached,
        DiagnosticKind::UdpSetupFailed,
        DiagnosticKind::CommunicationError,
    ];

    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::NoServersReached => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// One classified diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub reason: String,
    pub explanation: String,
    pub severity: Severity,
    pub impact: String,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind) -> Self {
        let text = diagnostic_text(kind);
        Self {
            kind,
            server: None,
            port: None,
            hostname: None,
            domain: None,
            reason: text.reason.to_string(),
            explanation: text.explanation.to_string(),
            severity: kind.severity(),
            impact: text.impact.to_string(),
        }
    }
}

/// A control line that matched none of the known diagnostic shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherWarning {
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSummary {
    pub total_issues: usize,
    pub critical_errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub ipv6_failures: Vec<Diagnostic>,
    pub timeouts: Vec<Diagnostic>,
    pub communication_errors: Vec<Diagnostic>,
    pub other_warnings: Vec<OtherWarning>,
    pub summary: DiagnosticSummary,
}

impl DiagnosticReport {
    /// Builds a report from its categories, deriving the summary.
    pub fn new(
        ipv6_failures: Vec<Diagnostic>,
        timeouts: Vec<Diagnostic>,
        communication_errors: Vec<Diagnostic>,
        other_warnings: Vec<OtherWarning>,
    ) -> Self {
        let summary = DiagnosticSummary {
            total_issues: ipv6_failures.len()
                + timeouts.len()
                + communication_errors.len()
                + other_warnings.len(),
            critical_errors: communication_errors
                .iter()
                .filter(|d| d.kind == DiagnosticKind::CommunicationError)
                .count(),
            warnings: ipv6_failures.len() + timeouts.len(),
        };
        Self {
            ipv6_failures,
            timeouts,
            communication_errors,
            other_warnings,
            summary,
        }
    }
}

/// Where a classified line is filed.
enum Filed {
    Ipv6(Diagnostic),
    Timeout(Diagnostic),
    Communication(Diagnostic),
    Other(OtherWarning),
}

/// Classifies every diagnostic line of the trace.
pub fn extract(tokens: &[Token]) -> DiagnosticReport {
    let mut ipv6 = Vec::new();
    let mut timeouts = Vec::new();
    let mut communication = Vec::new();
    let mut other = Vec::new();

    for filed in tokens.iter().filter_map(classify_line) {
        match filed {
            Filed::Ipv6(d) => ipv6.push(d),
            Filed::Timeout(d) => timeouts.push(d),
            Filed::Communication(d) => communication.push(d),
            Filed::Other(w) => other.push(w),
        }
    }

    DiagnosticReport::new(ipv6, timeouts, communication, other)
}

fn classify_line(token: &Token) -> Option<Filed> {
    match &token.line {
        TraceLine::SetupFailed(failure) => {
            let is_ipv6_unreachable = failure.reason.contains("network unreachable")
                && AddressFamily::of(&failure.ip) == AddressFamily::Ipv6;
            let mut diagnostic = if is_ipv6_unreachable {
                Diagnostic::new(DiagnosticKind::Ipv6Unreachable)
            } else {
                let mut d = Diagnostic::new(DiagnosticKind::UdpSetupFailed);
                d.reason = failure.reason.clone();
                d
            };
            diagnostic.server = Some(failure.ip.clone());
            diagnostic.port = failure.port;
            diagnostic.hostname = failure.hostname.clone();
            diagnostic.domain = Some(failure.query_name.clone());
            Some(if is_ipv6_unreachable {
                Filed::Ipv6(diagnostic)
            } else {
                Filed::Communication(diagnostic)
            })
        }
        TraceLine::CommunicationError(failure) => {
            let timed_out = failure.reason.contains("timed out");
            let mut diagnostic = if timed_out {
                Diagnostic::new(DiagnosticKind::Timeout)
            } else {
                let mut d = Diagnostic::new(DiagnosticKind::CommunicationError);
                d.reason = failure.reason.clone();
                d
            };
            diagnostic.server = Some(failure.ip.clone());
            diagnostic.port = Some(failure.port);
            Some(if timed_out {
                Filed::Timeout(diagnostic)
            } else {
                Filed::Communication(diagnostic)
            })
        }
        TraceLine::NoServersReached => Some(Filed::Communication(Diagnostic::new(
            DiagnosticKind::NoServersReached,
        ))),
        TraceLine::Received(_) | TraceLine::GlobalOptions => None,
        _ if token.is_control() && token.raw.len() > CONTROL_MARKER.len() + 1 => {
            let message = token.raw.trim_start_matches(';').trim_start().to_string();
            Some(Filed::Other(OtherWarning {
                message,
                severity: Severity::Info,
            }))
        }
        _ => None,
    }
}
