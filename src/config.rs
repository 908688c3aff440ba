//! Configuration management for dnstrace
//!
//! This module defines the main `Config` struct and its sub-structs. Settings
//! are layered with `figment`: built-in defaults, then a `dnstrace.toml` file,
//! then `DNSTRACE_` environment variables, then command-line flags.

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::cli::Cli;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "dnstrace.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level, used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Settings for invoking the trace tool.
    pub tracer: TracerConfig,
    /// Settings for the zone-boundary prober.
    pub probe: ProbeConfig,
    /// Settings for rendering results.
    pub output: OutputConfig,
}

/// Configuration for the trace tool invocation.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TracerConfig {
    /// Executable to run, looked up on `PATH`.
    pub command: String,
    /// Wall-clock limit for one trace.
    pub timeout_ms: u64,
    /// Maximum captured standard output; larger output fails the trace.
    pub max_output_bytes: usize,
    /// Record type used when none is given.
    pub default_record_type: String,
}

/// Configuration for the NS lookups of the prober.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProbeConfig {
    /// `IP:PORT` of a resolver to use exclusively. System resolvers otherwise.
    pub resolver: Option<String>,
    /// Per-query timeout.
    pub timeout_ms: u64,
}

/// The format for stdout output.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    PlainText,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "JSON"),
            OutputFormat::PlainText => write!(f, "Plain Text"),
        }
    }
}

/// Configuration for output.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// The format to use for stdout output.
    pub format: OutputFormat,
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file,
    /// environment variables and the parsed command line.
    ///
    /// Nested keys are addressed with a double underscore in the
    /// environment, e.g. `DNSTRACE_TRACER__TIMEOUT_MS=5000`.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("DNSTRACE_").split("__"))
            .merge(cli)
            .extract()
            .with_context(|| format!("invalid configuration (file: {})", path.display()))?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            tracer: TracerConfig {
                command: "dig".to_string(),
                timeout_ms: 30_000,
                max_output_bytes: 10 * 1024 * 1024,
                default_record_type: "A".to_string(),
            },
            probe: ProbeConfig {
                resolver: None,
                timeout_ms: 5_000,
            },
            output: OutputConfig {
                format: OutputFormat::PlainText,
            },
        }
    }
}
