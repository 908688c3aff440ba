//! Groups resource records into delegation stages.

use super::tokenizer::{Receipt, Token, TraceLine};
use crate::core::ResourceRecord;
use tracing::debug;

/// An unclassified stage: the records of one zone cut plus the receipt line
/// that closed the response they arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStage {
    pub records: Vec<ResourceRecord>,
    pub receipt: Option<Receipt>,
}

impl RawStage {
    pub fn first(&self) -> Option<&ResourceRecord> {
        self.records.first()
    }
}

/// Which kind of block the splitter is currently extending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Ns,
    Soa,
    Other,
}

/// Signature and proof records ride along with the block they cover.
const ATTACHED_TYPES: &[&str] = &["DS", "RRSIG", "NSEC", "NSEC3", "DNSKEY"];

/// Splits the token stream into raw stages.
///
/// Records accumulate until a receipt line, which flushes the buffer into one
/// or more stages. A trailing buffer is flushed without a receipt.
pub fn segment(tokens: &[Token]) -> Vec<RawStage> {
    let mut stages = Vec::new();
    let mut buffer: Vec<ResourceRecord> = Vec::new();

    for token in tokens {
        match &token.line {
            TraceLine::Record(record) => buffer.push(record.clone()),
            TraceLine::Received(receipt) => {
                if !buffer.is_empty() {
                    debug!(
                        records = buffer.len(),
                        line = %token.raw,
                        "Flushing record buffer at receipt line"
                    );
                    stages.extend(split_response(std::mem::take(&mut buffer), receipt.as_ref()));
                }
            }
            _ => {}
        }
    }

    if !buffer.is_empty() {
        debug!(records = buffer.len(), "Flushing trailing record buffer");
        stages.extend(split_response(buffer, None));
    }

    stages
}

/// Splits the records of a single response into stages.
///
/// A new stage starts at every SOA record, at an NS record following an SOA
/// block, and at any other non-DNSSEC record whose owner differs from the
/// open block's. DNSSEC records extend whatever stage is open.
pub fn split_response(records: Vec<ResourceRecord>, receipt: Option<&Receipt>) -> Vec<RawStage> {
    let mut stages = Vec::new();
    let mut current: Vec<ResourceRecord> = Vec::new();
    let mut zone: Option<String> = None;
    let mut block: Option<Block> = None;

    for record in records {
        let record_type = record.record_type.as_str();
        if ATTACHED_TYPES.contains(&record_type) {
            current.push(record);
            continue;
        }

        let changed = zone
            .as_deref()
            .is_some_and(|z| !z.eq_ignore_ascii_case(&record.name));
        let (next, starts_new) = match record_type {
            "NS" => (Block::Ns, changed || block == Some(Block::Soa)),
            "SOA" => (Block::Soa, true),
            _ => (Block::Other, changed),
        };
        zone = Some(record.name.clone());
        block = Some(next);

        if starts_new && !current.is_empty() {
            stages.push(RawStage {
                records: std::mem::take(&mut current),
                receipt: receipt.cloned(),
            });
        }
        current.push(record);
    }

    if !current.is_empty() {
        stages.push(RawStage {
            records: current,
            receipt: receipt.cloned(),
        });
    }

    stages
}
