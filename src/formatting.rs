// src/formatting.rs

use crate::config::OutputFormat;
use crate::core::AttemptResult;
use crate::presentation::MessageType;
use crate::probe::{DelegationChain, ZoneBoundaries};
use crate::tracer::TraceResult;
use crate::trace::{Diagnostic, DiagnosticReport};
use std::fmt::Write;

/// Renders command results for stdout.
pub trait TextFormatter: Send + Sync {
    fn format_trace(&self, result: &TraceResult) -> String;
    fn format_boundaries(&self, boundaries: &ZoneBoundaries) -> String;
    fn format_chain(&self, chain: &DelegationChain) -> String;
}

/// Returns the formatter for a configured output format.
pub fn formatter_for(format: OutputFormat) -> Box<dyn TextFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::PlainText => Box::new(PlainTextFormatter),
    }
}

/// Pretty-printed JSON, one document per result.
pub struct JsonFormatter;

impl JsonFormatter {
    fn render<T: serde::Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":\"serialization failed: {e}\"}}"))
    }
}

impl TextFormatter for JsonFormatter {
    fn format_trace(&self, result: &TraceResult) -> String {
        Self::render(result)
    }

    fn format_boundaries(&self, boundaries: &ZoneBoundaries) -> String {
        Self::render(boundaries)
    }

    fn format_chain(&self, chain: &DelegationChain) -> String {
        Self::render(chain)
    }
}

/// A compact, human-readable rendering of the step sequence.
pub struct PlainTextFormatter;

impl PlainTextFormatter {
    fn write_diagnostics(&self, out: &mut String, report: &DiagnosticReport) {
        let summary = &report.summary;
        if summary.total_issues == 0 {
            let _ = writeln!(out, "No issues detected.");
            return;
        }
        let _ = writeln!(
            out,
            "Issues: {} ({} warnings, {} critical)",
            summary.total_issues, summary.warnings, summary.critical_errors
        );
        let listed = report
            .ipv6_failures
            .iter()
            .chain(&report.timeouts)
            .chain(&report.communication_errors);
        for diagnostic in listed {
            let _ = writeln!(out, "  - {}", diagnostic_line(diagnostic));
        }
        for warning in &report.other_warnings {
            let _ = writeln!(out, "  - [info] {}", warning.message);
        }
    }
}

fn diagnostic_line(d: &Diagnostic) -> String {
    let severity = serde_json::to_value(d.severity)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    match &d.server {
        Some(server) => format!("[{severity}] {} ({server}): {}", d.reason, d.impact),
        None => format!("[{severity}] {}: {}", d.reason, d.impact),
    }
}

impl TextFormatter for PlainTextFormatter {
    fn format_trace(&self, result: &TraceResult) -> String {
        let mut out = String::new();
        if !result.success {
            let _ = writeln!(
                out,
                "Trace for {} {} failed: {}",
                result.domain,
                result.record_type,
                result.error.as_deref().unwrap_or("unknown error")
            );
            return out;
        }

        let _ = writeln!(
            out,
            "Trace for {} {}: {} stages in {} ms",
            result.domain,
            result.record_type,
            result.stages.len(),
            result.total_time_ms.unwrap_or_default()
        );

        for step in result.visual_stages.iter().flatten() {
            let _ = writeln!(out, "{:>3}. {}: {}", step.step, step.name, step.description);
            if step.message_type != MessageType::Response {
                continue;
            }
            let _ = writeln!(
                out,
                "     from {} [{}] in {} ms",
                step.server.name, step.server.role, step.timing_ms
            );
            for attempt in step.attempts.iter().filter(|a| a.result != AttemptResult::Success) {
                let _ = writeln!(
                    out,
                    "     ! {} {} ({})",
                    attempt.target_ip,
                    attempt.result,
                    attempt.error_message.as_deref().unwrap_or("")
                );
            }
        }

        if let Some(errors) = &result.errors {
            self.write_diagnostics(&mut out, errors);
        }
        out
    }

    fn format_boundaries(&self, boundaries: &ZoneBoundaries) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Zone boundaries for {}", boundaries.domain);
        for b in &boundaries.boundaries {
            let marker = if b.is_delegated { "+" } else { "-" };
            let _ = write!(out, "  {marker} {:<30} {:?}", b.zone, b.level);
            if !b.nameservers.is_empty() {
                let _ = write!(out, "  NS: {}", b.nameservers.join(", "));
            }
            if let Some(note) = b.note.as_deref().or(b.error.as_deref()) {
                let _ = write!(out, "  ({note})");
            }
            out.push('\n');
        }
        out
    }

    fn format_chain(&self, chain: &DelegationChain) -> String {
        let mut out = self.format_boundaries(&chain.zone_boundaries);
        let summary = &chain.summary;
        let _ = writeln!(
            out,
            "Delegated levels: {}",
            summary.delegated_levels.join(" -> ")
        );
        if !summary.non_delegated_subdomains.is_empty() {
            let _ = writeln!(
                out,
                "Served by parent zone: {}",
                summary.non_delegated_subdomains.join(", ")
            );
        }
        let ips: Vec<String> = chain.all_ips.iter().map(ToString::to_string).collect();
        let _ = writeln!(
            out,
            "Addresses: {}",
            if ips.is_empty() { "none".to_string() } else { ips.join(", ") }
        );
        match &chain.cross_check {
            Some(check) if check.is_consistent => {
                let _ = writeln!(out, "Trace agrees with live zone boundaries.");
            }
            Some(check) => {
                for d in &check.differences {
                    let _ = writeln!(out, "  * {}", d.message);
                }
            }
            None => {
                let _ = writeln!(
                    out,
                    "Trace failed: {}",
                    chain.trace.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        let _ = writeln!(out, "Total time: {} ms", summary.timing.total_ms);
        out
    }
}
