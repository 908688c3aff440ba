//! Domain-name normalization and hierarchy decomposition.
//!
//! A queried name such as `www.example.co.uk` is broken into the levels a
//! resolver walks through: the root, the TLD, an optional registry
//! second-level suffix, any intermediate labels and the final name.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::knowledge;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid domain name: {0:?}")]
    Invalid(String),
}

/// Strips a single trailing dot and lowercases the name. The root stays `.`.
pub fn normalize(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed == "." {
        return ".".to_string();
    }
    trimmed.trim_end_matches('.').to_ascii_lowercase()
}

/// Returns `true` if `name` lies strictly below `zone`.
pub fn is_strict_subdomain(name: &str, zone: &str) -> bool {
    if zone == "." {
        return name != ".";
    }
    name != zone && name.ends_with(&format!(".{}", zone))
}

/// The kind of a level in the delegation hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Root,
    Tld,
    Sld,
    Intermediate,
    Authoritative,
}

/// One level of a decomposed domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLevel {
    /// Number of labels below the root (the root itself is 0).
    pub depth: usize,
    /// The label added at this level (empty for the root).
    pub label: String,
    /// Fully qualified name with trailing dot.
    pub fqdn: String,
    pub kind: LevelKind,
}

impl HierarchyLevel {
    /// The level's name without the trailing dot (`.` for the root).
    pub fn zone(&self) -> String {
        normalize(&self.fqdn)
    }
}

/// A domain decomposed into its delegation hierarchy, root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainHierarchy {
    pub normalized: String,
    pub labels: Vec<String>,
    pub levels: Vec<HierarchyLevel>,
    pub has_known_sld: bool,
}

impl DomainHierarchy {
    /// Parses and validates a domain name.
    pub fn parse(domain: &str) -> Result<Self, DomainError> {
        let normalized = normalize(domain);
        if normalized.is_empty() || normalized == "." {
            return Err(DomainError::Invalid(domain.to_string()));
        }

        let labels: Vec<String> = normalized.split('.').map(str::to_string).collect();
        if labels.iter().any(|l| !is_valid_label(l)) {
            return Err(DomainError::Invalid(domain.to_string()));
        }

        let sld_index = if labels.len() >= 2 {
            let candidate = labels[labels.len() - 2..].join(".");
            knowledge::is_known_sld(&candidate).then(|| labels.len() - 2)
        } else {
            None
        };

        let mut levels = vec![HierarchyLevel {
            depth: 0,
            label: String::new(),
            fqdn: ".".to_string(),
            kind: LevelKind::Root,
        }];

        for i in (0..labels.len()).rev() {
            let kind = if i == labels.len() - 1 {
                LevelKind::Tld
            } else if sld_index == Some(i) {
                LevelKind::Sld
            } else if i == 0 {
                LevelKind::Authoritative
            } else {
                LevelKind::Intermediate
            };
            levels.push(HierarchyLevel {
                depth: labels.len() - i,
                label: labels[i].clone(),
                fqdn: format!("{}.", labels[i..].join(".")),
                kind,
            });
        }

        Ok(Self {
            normalized,
            labels,
            levels,
            has_known_sld: sld_index.is_some(),
        })
    }
}

/// Returns the hierarchy levels strictly between `parent` and `zone`.
///
/// `parent` is the previous delegation point (`.` for the root). The result
/// is ordered from the shallowest to the deepest skipped level.
pub fn skipped_levels(parent: &str, zone: &str) -> Vec<String> {
    let parent = normalize(parent);
    let zone = normalize(zone);
    if zone == "." || !(parent == "." || is_strict_subdomain(&zone, &parent)) {
        return Vec::new();
    }

    let labels: Vec<&str> = zone.split('.').collect();
    let parent_depth = if parent == "." {
        0
    } else {
        parent.split('.').count()
    };

    ((parent_depth + 1)..labels.len())
        .map(|depth| labels[labels.len() - depth..].join("."))
        .collect()
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
