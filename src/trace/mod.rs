//! Trace-to-model reconstruction engine.
//!
//! The pipeline is synchronous and pure: raw text is tokenized, grouped into
//! raw stages, classified, annotated with connection attempts, and scanned
//! for diagnostics. Nothing here performs I/O.

pub mod attempts;
pub mod classifier;
pub mod diagnostics;
pub mod roles;
pub mod segmenter;
pub mod tokenizer;

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticReport, OtherWarning, Severity};
pub use roles::{detect_role, ServerRole};

use crate::core::TraceStage;
use crate::domain::normalize;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The question a trace was run for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Normalized queried name (lowercase, no trailing dot).
    pub domain: String,
    /// Upper-cased record type mnemonic.
    pub record_type: String,
}

impl Query {
    pub fn new(domain: &str, record_type: &str) -> Self {
        Self {
            domain: normalize(domain),
            record_type: record_type.trim().to_ascii_uppercase(),
        }
    }
}

/// Classified, attempt-annotated stages plus the diagnostic report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub stages: Vec<TraceStage>,
    pub errors: DiagnosticReport,
}

/// Reconstructs the delegation walk from captured trace output.
pub fn reconstruct(raw: &str, query: &Query) -> Reconstruction {
    let tokens = tokenizer::tokenize(raw);
    let raw_stages = segmenter::segment(&tokens);
    let mut slots = classifier::classify_all(&raw_stages, query);

    // Receipts are counted against every segmented stage, classified or not.
    attempts::attach_attempts(&mut slots, &tokens);
    let stages: Vec<TraceStage> = slots.into_iter().flatten().collect();
    debug!(
        raw_stages = raw_stages.len(),
        classified = stages.len(),
        "Segmented and classified trace"
    );
    let errors = diagnostics::extract(&tokens);

    Reconstruction { stages, errors }
}
