//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments using the `clap` crate.
//! Global flags are merged over the configuration file and environment by
//! implementing figment's `Provider` for [`Cli`].

use clap::{Parser, Subcommand};
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Reconstructs iterative DNS resolution traces into structured delegation walks.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Wall-clock timeout for the trace tool in milliseconds.
    #[arg(long, value_name = "MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Maximum captured output of the trace tool in bytes.
    #[arg(long, value_name = "BYTES", global = true)]
    pub max_output_bytes: Option<usize>,

    /// Resolver (IP:PORT) used by the zone-boundary prober.
    #[arg(long, value_name = "IP:PORT", global = true)]
    pub resolver: Option<String>,

    /// Print JSON instead of plain text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Logging level when RUST_LOG is not set.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a live trace and reconstruct it.
    Trace {
        domain: String,
        /// Record type to query (defaults to the configured type).
        record_type: Option<String>,
    },
    /// Reconstruct previously captured trace output (`-` reads stdin).
    Parse {
        file: PathBuf,
        domain: String,
        record_type: Option<String>,
    },
    /// Probe which hierarchy levels of a domain are delegated.
    Probe { domain: String },
    /// Trace, probe and resolve a domain concurrently and compare the results.
    Chain { domain: String },
}

/// Inserts `value` at `section.key`, creating the section table on demand.
fn insert_nested(dict: &mut Dict, section: &str, key: &str, value: Value) {
    let entry = dict
        .entry(section.to_string())
        .or_insert_with(|| Value::Dict(Tag::Default, Dict::new()));
    if let Value::Dict(_, table) = entry {
        table.insert(key.to_string(), value);
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(timeout) = self.timeout_ms {
            insert_nested(&mut dict, "tracer", "timeout_ms", Value::from(timeout));
        }

        if let Some(max) = self.max_output_bytes {
            insert_nested(&mut dict, "tracer", "max_output_bytes", Value::from(max));
        }

        if let Some(resolver) = &self.resolver {
            insert_nested(&mut dict, "probe", "resolver", Value::from(resolver.clone()));
        }

        // Only an explicit `--json` overrides the configured format.
        if self.json {
            insert_nested(&mut dict, "output", "format", Value::from("Json"));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
