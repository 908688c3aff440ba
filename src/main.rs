//! dnstrace - reconstruct and explain DNS resolution paths.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use dnstrace::{
    cli::{Cli, Command},
    config::Config,
    formatting::formatter_for,
    probe::{HickoryNameserverLookup, ZoneProber},
    runner::DigTraceRunner,
    trace::Query,
    tracer::{LiveTracer, TraceResult},
};
use std::io::Read;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err:#}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, &config).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            error!("{err:#}");
            std::process::exit(1);
        }
    }
}

/// Executes the selected command. Returns `false` when the command produced
/// a failure result that was still printed.
async fn run(cli: Cli, config: &Config) -> Result<bool> {
    let formatter = formatter_for(config.output.format);
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(true);
    };

    match command {
        Command::Trace {
            domain,
            record_type,
        } => {
            let record_type =
                record_type.unwrap_or_else(|| config.tracer.default_record_type.clone());
            let tracer = LiveTracer::new(Arc::new(DigTraceRunner::from_config(&config.tracer)));
            let result = tracer.trace(&domain, &record_type).await;
            println!("{}", formatter.format_trace(&result));
            Ok(result.success)
        }
        Command::Parse {
            file,
            domain,
            record_type,
        } => {
            let raw = if file.as_os_str() == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read trace output from stdin")?;
                buf
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?
            };
            let record_type =
                record_type.unwrap_or_else(|| config.tracer.default_record_type.clone());
            let query = Query::new(&domain, &record_type);
            info!(domain = %query.domain, bytes = raw.len(), "Reconstructing captured trace");
            let result = TraceResult::from_output(&query, raw, Utc::now(), 0);
            println!("{}", formatter.format_trace(&result));
            Ok(true)
        }
        Command::Probe { domain } => {
            let prober = prober(config)?;
            let boundaries = prober.determine_zone_boundaries(&domain).await?;
            println!("{}", formatter.format_boundaries(&boundaries));
            Ok(true)
        }
        Command::Chain { domain } => {
            let prober = prober(config)?;
            let tracer = LiveTracer::new(Arc::new(DigTraceRunner::from_config(&config.tracer)));
            let chain = prober.delegation_chain(&tracer, &domain).await?;
            println!("{}", formatter.format_chain(&chain));
            Ok(chain.trace.success)
        }
    }
}

fn prober(config: &Config) -> Result<ZoneProber> {
    let (lookup, nameservers) = HickoryNameserverLookup::from_config(&config.probe)?;
    info!(?nameservers, "Probing with resolvers");
    Ok(ZoneProber::new(Arc::new(lookup)))
}
