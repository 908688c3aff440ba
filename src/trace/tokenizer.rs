//! Line tokenizer for `dig +trace` output.
//!
//! Each input line becomes exactly one [`Token`]. Resource records are parsed
//! into fields; control lines are recognized by their sub-format; anything
//! else is kept as an unrecognized token so later passes can ignore it.

use crate::core::{ResourceRecord, TransportProtocol};
use once_cell::sync::Lazy;
use regex::Regex;

/// The two-character marker that prefixes the tool's control lines.
pub const CONTROL_MARKER: &str = ";;";

static RECORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(\d+)\s+IN\s+(\S+)\s+(.+?)\s*$").unwrap());

static RECEIVED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Received (\d+) bytes from ([^#\s]+)#(\d+)\(([^)]*)\) in (\d+) ms").unwrap()
});

static UDP_SETUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(UDP|TCP) setup with\s+([^#\s(]+)(?:#(\d+))?(?:\(([^)]*)\))?\s+for\s+(\S+)\s+failed:\s+(.+?)\.?\s*$",
    )
    .unwrap()
});

static COMM_ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"communications error to\s+([^#\s]+)#(\d+):\s+(.+?)\.?\s*$").unwrap()
});

/// A `Received N bytes from IP#PORT(HOST) in T ms` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub bytes: u64,
    pub ip: String,
    pub port: u16,
    pub hostname: String,
    pub elapsed_ms: u64,
}

/// A `UDP setup with IP#PORT(HOST) for NAME failed: REASON` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFailure {
    pub protocol: TransportProtocol,
    pub ip: String,
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub query_name: String,
    pub reason: String,
}

/// A `communications error to IP#PORT: REASON` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicationFailure {
    pub ip: String,
    pub port: u16,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine {
    Blank,
    GlobalOptions,
    Record(ResourceRecord),
    /// A receipt line; `None` when the line announced a receipt in an
    /// unexpected shape.
    Received(Option<Receipt>),
    SetupFailed(SetupFailure),
    CommunicationError(CommunicationFailure),
    NoServersReached,
    /// Any other line starting with `;`.
    Comment,
    Unrecognized,
}

/// A tokenized line together with its original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Zero-based line number in the captured output.
    pub line_no: usize,
    /// The line with surrounding whitespace removed.
    pub raw: String,
    pub line: TraceLine,
}

impl Token {
    pub fn is_control(&self) -> bool {
        self.raw.starts_with(CONTROL_MARKER)
    }
}

/// Tokenizes the full captured output, one token per line.
pub fn tokenize(output: &str) -> Vec<Token> {
    output
        .lines()
        .enumerate()
        .map(|(line_no, line)| {
            let raw = line.trim();
            Token {
                line_no,
                raw: raw.to_string(),
                line: tokenize_line(raw),
            }
        })
        .collect()
}

/// Classifies a single, already trimmed line.
pub fn tokenize_line(line: &str) -> TraceLine {
    if line.is_empty() {
        return TraceLine::Blank;
    }

    if line.starts_with(';') {
        if line.starts_with(CONTROL_MARKER) && line.contains("global options") {
            return TraceLine::GlobalOptions;
        }
        if line.contains("Received") && line.contains("from") {
            return TraceLine::Received(parse_receipt(line));
        }
    }

    // Failure lines appear both with and without the control marker.
    if let Some(failure) = parse_setup_failure(line) {
        return TraceLine::SetupFailed(failure);
    }
    if let Some(failure) = parse_communication_error(line) {
        return TraceLine::CommunicationError(failure);
    }

    if line.starts_with(';') {
        if line.contains("no servers could be reached") {
            return TraceLine::NoServersReached;
        }
        return TraceLine::Comment;
    }

    match parse_record(line) {
        Some(record) => TraceLine::Record(record),
        None => TraceLine::Unrecognized,
    }
}

/// Parses a `NAME TTL IN TYPE DATA` line.
pub fn parse_record(line: &str) -> Option<ResourceRecord> {
    let caps = RECORD_RE.captures(line.trim())?;
    Some(ResourceRecord {
        name: caps[1].to_string(),
        ttl: caps[2].parse().ok()?,
        record_type: caps[3].to_ascii_uppercase(),
        data: caps[4].to_string(),
    })
}

fn parse_receipt(line: &str) -> Option<Receipt> {
    let caps = RECEIVED_RE.captures(line)?;
    Some(Receipt {
        bytes: caps[1].parse().ok()?,
        ip: caps[2].to_string(),
        port: caps[3].parse().ok()?,
        hostname: caps[4].to_string(),
        elapsed_ms: caps[5].parse().ok()?,
    })
}

fn parse_setup_failure(line: &str) -> Option<SetupFailure> {
    let caps = UDP_SETUP_RE.captures(line)?;
    let protocol = if &caps[1] == "TCP" {
        TransportProtocol::Tcp
    } else {
        TransportProtocol::Udp
    };
    Some(SetupFailure {
        protocol,
        ip: caps[2].to_string(),
        port: caps.get(3).and_then(|m| m.as_str().parse().ok()),
        hostname: caps.get(4).map(|m| m.as_str().to_string()),
        query_name: caps[5].to_string(),
        reason: caps[6].to_string(),
    })
}

fn parse_communication_error(line: &str) -> Option<CommunicationFailure> {
    let caps = COMM_ERROR_RE.captures(line)?;
    Some(CommunicationFailure {
        ip: caps[1].to_string(),
        port: caps[2].parse().ok()?,
        reason: caps[3].to_string(),
    })
}
