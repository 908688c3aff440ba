//! Bounded invocation of the external trace tool.
//!
//! The tool is spawned directly with an argument vector (no shell), its output
//! is captured up to a byte limit, and the whole run is bounded by a
//! wall-clock timeout. Dropping the future kills the child.

use crate::config::TracerConfig;
use crate::core::TraceRunner;
use crate::domain::DomainHierarchy;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Failures of a trace invocation. None of these carry a partial result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("trace tool `{0}` was not found")]
    ToolMissing(String),

    #[error("trace timed out after {0} ms")]
    Timeout(u64),

    #[error("trace output exceeded {0} bytes")]
    OutputTooLarge(usize),

    #[error("trace tool exited with {status}: {message}")]
    Failed { status: String, message: String },

    #[error("failed to run trace tool: {0}")]
    Io(String),
}

impl From<io::Error> for TraceError {
    fn from(err: io::Error) -> Self {
        TraceError::Io(err.to_string())
    }
}

/// Rejects queries that could not have come from a well-formed name.
///
/// Leading `-` or `+` would be read by the tool as an option.
pub fn validate_query(domain: &str, record_type: &str) -> Result<(), TraceError> {
    if domain.starts_with(['-', '+']) {
        return Err(TraceError::InvalidQuery(format!(
            "domain must not start with an option marker: {domain}"
        )));
    }
    DomainHierarchy::parse(domain).map_err(|e| TraceError::InvalidQuery(e.to_string()))?;

    let type_ok = !record_type.is_empty()
        && record_type.len() <= 10
        && record_type.chars().all(|c| c.is_ascii_alphanumeric());
    if !type_ok {
        return Err(TraceError::InvalidQuery(format!(
            "unsupported record type: {record_type}"
        )));
    }
    Ok(())
}

/// Runs `dig +trace DOMAIN TYPE` as a child process.
pub struct DigTraceRunner {
    command: String,
    timeout: Duration,
    max_output_bytes: usize,
}

impl DigTraceRunner {
    pub fn new(command: impl Into<String>, timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            command: command.into(),
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &TracerConfig) -> Self {
        Self::new(
            config.command.clone(),
            Duration::from_millis(config.timeout_ms),
            config.max_output_bytes,
        )
    }

    async fn capture(&self, mut command: Command) -> Result<(String, String), TraceError> {
        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TraceError::ToolMissing(self.command.clone()),
            _ => TraceError::from(e),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TraceError::Io("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TraceError::Io("stderr was not captured".into()))?;

        // Stderr drains on its own task so an overflowing stdout returns at once.
        let stderr_task = tokio::spawn(read_capped(stderr, self.max_output_bytes));

        // One byte past the limit is enough to detect overflow.
        let out = read_capped(stdout, self.max_output_bytes.saturating_add(1)).await?;
        if out.len() > self.max_output_bytes {
            stderr_task.abort();
            return Err(TraceError::OutputTooLarge(self.max_output_bytes));
        }

        let status = child.wait().await?;
        let err = stderr_task
            .await
            .map_err(|e| TraceError::Io(e.to_string()))??;
        let stdout = String::from_utf8_lossy(&out).into_owned();
        let stderr = String::from_utf8_lossy(&err).into_owned();

        if !status.success() {
            let message = if stderr.trim().is_empty() {
                stdout.lines().last().unwrap_or_default().trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(TraceError::Failed {
                status: status.to_string(),
                message,
            });
        }

        Ok((stdout, stderr))
    }
}

async fn read_capped<R>(reader: R, cap: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.take(cap as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}

#[async_trait]
impl TraceRunner for DigTraceRunner {
    async fn run(&self, domain: &str, record_type: &str) -> Result<String, TraceError> {
        validate_query(domain, record_type)?;

        let mut command = Command::new(&self.command);
        command
            .arg("+trace")
            .arg(domain)
            .arg(record_type)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(command = %self.command, domain, record_type, "Running trace");
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let (stdout, stderr) = tokio::time::timeout(self.timeout, self.capture(command))
            .await
            .map_err(|_| TraceError::Timeout(timeout_ms))??;

        if !stderr.trim().is_empty() && !stderr.contains("communications error") {
            warn!(stderr = %stderr.trim(), "Trace tool reported warnings");
        }
        debug!(bytes = stdout.len(), "Captured trace output");
        Ok(stdout)
    }
}
