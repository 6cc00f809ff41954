//! Edge types and the edge-semantics predicate.
//!
//! This module is the single source of truth for edge-type exclusivity
//! rules; drivers consume [`incompatible_keys`] to build their
//! conditional-insert predicate instead of duplicating the rules.

use std::fmt;

use anyhow::{anyhow, Result};

/// One of the four mutually constrained edge shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    /// (id1, id2) is the only outgoing edge from id1.
    Unique,
    /// (id1, id2) implies the reverse (id2, id1) also holds.
    Bidirectional,
    /// Both `Unique` and `Bidirectional` constraints apply.
    UniqueAndBidirectional,
    /// No uniqueness or bidirectionality constraint.
    Other,
}

impl EdgeType {
    /// Canonical string tag used in workload-spec `edge_types` lines.
    pub fn as_tag(self) -> &'static str {
        match self {
            EdgeType::Unique => "unique",
            EdgeType::Bidirectional => "bidirectional",
            EdgeType::UniqueAndBidirectional => "unique_and_bidirectional",
            EdgeType::Other => "other",
        }
    }

    /// Parse a workload-spec type tag into an [`EdgeType`].
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "unique" => Ok(EdgeType::Unique),
            "bidirectional" => Ok(EdgeType::Bidirectional),
            "unique_and_bidirectional" => Ok(EdgeType::UniqueAndBidirectional),
            "other" => Ok(EdgeType::Other),
            other => Err(anyhow!("unrecognized edge type tag: {other}")),
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// An edge loaded into the key pool: a directed relation between two ids,
/// typed per [`EdgeType`].
#[derive(Debug, Clone)]
pub struct Edge {
    /// The edge's primary endpoint (id1).
    pub primary_key: String,
    /// The edge's remote endpoint (id2).
    pub remote_key: String,
    /// The edge's type.
    pub edge_type: EdgeType,
}

impl Edge {
    /// Construct a new edge.
    pub fn new(primary_key: String, remote_key: String, edge_type: EdgeType) -> Self {
        Self {
            primary_key,
            remote_key,
            edge_type,
        }
    }
}

/// A candidate key pattern returned by [`incompatible_keys`]. Fields left as
/// `None` mean "any value".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    /// Constrains id1 when set.
    pub id1: Option<String>,
    /// Constrains id2 when set.
    pub id2: Option<String>,
    /// Constrains the edge type when set.
    pub edge_type: Option<EdgeType>,
}

impl KeyPattern {
    fn new(id1: Option<&str>, id2: Option<&str>, edge_type: Option<EdgeType>) -> Self {
        Self {
            id1: id1.map(str::to_owned),
            id2: id2.map(str::to_owned),
            edge_type,
        }
    }

    /// Whether a concrete edge matches this pattern.
    pub fn matches(&self, id1: &str, id2: &str, edge_type: EdgeType) -> bool {
        self.id1.as_deref().map_or(true, |v| v == id1)
            && self.id2.as_deref().map_or(true, |v| v == id2)
            && self.edge_type.map_or(true, |t| t == edge_type)
    }
}

/// Returns the set of existing-edge patterns whose presence would make
/// inserting `(id1, id2, edge_type)` violate edge-type exclusivity.
pub fn incompatible_keys(id1: &str, id2: &str, edge_type: EdgeType) -> Vec<KeyPattern> {
    match edge_type {
        EdgeType::Other => vec![
            KeyPattern::new(Some(id1), None, Some(EdgeType::Unique)),
            KeyPattern::new(Some(id1), None, Some(EdgeType::UniqueAndBidirectional)),
            KeyPattern::new(Some(id1), Some(id2), Some(EdgeType::Bidirectional)),
            KeyPattern::new(Some(id2), Some(id1), None),
        ],
        EdgeType::Bidirectional => vec![
            KeyPattern::new(Some(id1), None, Some(EdgeType::Unique)),
            KeyPattern::new(Some(id1), None, Some(EdgeType::UniqueAndBidirectional)),
            KeyPattern::new(Some(id1), Some(id2), Some(EdgeType::Other)),
            KeyPattern::new(Some(id2), Some(id1), Some(EdgeType::Other)),
            KeyPattern::new(Some(id2), Some(id1), Some(EdgeType::Unique)),
        ],
        EdgeType::Unique => vec![
            KeyPattern::new(Some(id1), None, None),
            KeyPattern::new(Some(id2), Some(id1), None),
        ],
        EdgeType::UniqueAndBidirectional => vec![
            KeyPattern::new(Some(id1), None, None),
            KeyPattern::new(Some(id2), Some(id1), Some(EdgeType::Other)),
            KeyPattern::new(Some(id2), Some(id1), Some(EdgeType::Unique)),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_excludes_reverse_and_unique_prefix() {
        let patterns = incompatible_keys("x", "y", EdgeType::Other);
        assert!(patterns
            .iter()
            .any(|p| p.matches("x", "z", EdgeType::Unique)));
        assert!(patterns
            .iter()
            .any(|p| p.matches("x", "y", EdgeType::Bidirectional)));
        assert!(patterns.iter().any(|p| p.matches("y", "x", EdgeType::Other)));
        assert!(!patterns
            .iter()
            .any(|p| p.matches("x", "y", EdgeType::Other)));
    }

    #[test]
    fn bidirectional_excludes_reverse_other_and_unique() {
        let patterns = incompatible_keys("x", "y", EdgeType::Bidirectional);
        assert!(patterns.iter().any(|p| p.matches("x", "y", EdgeType::Other)));
        assert!(patterns.iter().any(|p| p.matches("y", "x", EdgeType::Other)));
        assert!(patterns
            .iter()
            .any(|p| p.matches("y", "x", EdgeType::Unique)));
    }

    #[test]
    fn unique_excludes_any_edge_from_id1_and_any_reverse() {
        let patterns = incompatible_keys("x", "y", EdgeType::Unique);
        assert!(patterns
            .iter()
            .any(|p| p.matches("x", "q", EdgeType::Other)));
        assert!(patterns
            .iter()
            .any(|p| p.matches("y", "x", EdgeType::Bidirectional)));
    }

    #[test]
    fn unique_and_bidirectional_excludes_any_edge_from_id1() {
        let patterns = incompatible_keys("x", "y", EdgeType::UniqueAndBidirectional);
        assert!(patterns
            .iter()
            .any(|p| p.matches("x", "q", EdgeType::Other)));
        assert!(!patterns
            .iter()
            .any(|p| p.matches("y", "x", EdgeType::Bidirectional)));
    }
}
