//! Live trace orchestration and the result envelope.
//!
//! [`LiveTracer`] runs the trace tool through a [`TraceRunner`], feeds the
//! captured text to the reconstruction engine, and wraps everything in a
//! [`TraceResult`]. Invocation failures become a failure envelope with no
//! partial reconstruction.

use crate::core::{TraceRunner, TraceStage};
use crate::export::{generate_export, StructuredExport};
use crate::presentation::{format_for_visualization, VisualStep};
use crate::trace::{reconstruct, DiagnosticReport, Query};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// The envelope returned for every trace request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    pub success: bool,
    pub domain: String,
    pub record_type: String,
    pub stages: Vec<TraceStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_stages: Option<Vec<VisualStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_export: Option<StructuredExport>,
    /// Number of visual steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_stages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<DiagnosticReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceResult {
    /// Reconstructs `raw_output` and builds a success envelope.
    ///
    /// Pure: the same output, query, timestamp and duration always produce
    /// the same envelope.
    pub fn from_output(
        query: &Query,
        raw_output: String,
        timestamp: DateTime<Utc>,
        total_time_ms: u64,
    ) -> Self {
        let reconstruction = reconstruct(&raw_output, query);
        let visual_stages = format_for_visualization(&reconstruction.stages, query);
        let structured_export = generate_export(
            query,
            timestamp,
            total_time_ms,
            &raw_output,
            &reconstruction.stages,
        );

        Self {
            success: true,
            domain: query.domain.clone(),
            record_type: query.record_type.clone(),
            stages: reconstruction.stages,
            total_stages: Some(visual_stages.len()),
            visual_stages: Some(visual_stages),
            structured_export: Some(structured_export),
            errors: Some(reconstruction.errors),
            total_time_ms: Some(total_time_ms),
            timestamp: Some(timestamp),
            raw_output: Some(raw_output),
            error: None,
        }
    }

    /// Builds a failure envelope carrying only the error message.
    pub fn failure(query: &Query, error: impl fmt::Display) -> Self {
        Self {
            success: false,
            domain: query.domain.clone(),
            record_type: query.record_type.clone(),
            stages: Vec::new(),
            visual_stages: None,
            structured_export: None,
            total_stages: None,
            errors: None,
            total_time_ms: None,
            timestamp: None,
            raw_output: None,
            error: Some(error.to_string()),
        }
    }

    /// Number of visual steps, or zero for a failure.
    pub fn total_steps(&self) -> usize {
        self.total_stages.unwrap_or(0)
    }
}

/// Runs live traces and reconstructs them.
pub struct LiveTracer {
    runner: Arc<dyn TraceRunner>,
}

impl LiveTracer {
    pub fn new(runner: Arc<dyn TraceRunner>) -> Self {
        Self { runner }
    }

    /// Traces `domain` for `record_type`. Never fails; failures are reported
    /// inside the envelope.
    #[instrument(skip(self))]
    pub async fn trace(&self, domain: &str, record_type: &str) -> TraceResult {
        let query = Query::new(domain, record_type);
        let timestamp = Utc::now();
        let start = Instant::now();

        let outcome = self.runner.run(&query.domain, &query.record_type).await;
        let elapsed = start.elapsed();
        metrics::histogram!("trace_duration_seconds").record(elapsed.as_secs_f64());

        match outcome {
            Ok(raw) => {
                metrics::counter!("trace_runs_total", "status" => "success").increment(1);
                let total_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                let result = TraceResult::from_output(&query, raw, timestamp, total_time_ms);
                if let Some(errors) = &result.errors {
                    info!(
                        stages = result.stages.len(),
                        issues = errors.summary.total_issues,
                        total_time_ms,
                        "Trace reconstructed"
                    );
                }
                result
            }
            Err(e) => {
                metrics::counter!("trace_runs_total", "status" => "failure").increment(1);
                warn!(error = %e, "Trace failed");
                TraceResult::failure(&query, e)
            }
        }
    }
}
