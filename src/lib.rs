//! dnstrace - reconstructs `dig +trace` output into a structured model of
//! DNS resolution.
//!
//! The reconstruction engine in [`trace`] is pure: it turns captured text
//! into resolution stages and diagnostics. [`presentation`] and [`export`]
//! derive the step-by-step and archival views from those stages, while
//! [`tracer`] and [`probe`] drive the live tool and resolver.

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod export;
pub mod formatting;
pub mod knowledge;
pub mod presentation;
pub mod probe;
pub mod runner;
pub mod trace;
pub mod tracer;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-export core types for convenience
pub use core::*;
