//! Core domain types for iotag attack graphs.
//!
//! Attack graphs arrive as vertex and arc tables produced by an upstream
//! logic-based reasoner. These types name the pieces every analysis shares.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Node Identity ─────────────────────────────────────────────────

/// Identifier of a node, as assigned by the attack-graph generator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ── Node Kinds ────────────────────────────────────────────────────

/// The closed set of attack-graph node kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A leaf fact: a vulnerability or an environment/configuration fact.
    #[serde(rename = "LEAF")]
    Primitive,
    /// A rule application that needs all of its preconditions.
    #[serde(rename = "AND")]
    And,
    /// A derived fact that needs any one of its preconditions.
    #[serde(rename = "OR")]
    Or,
}

impl NodeKind {
    /// Parse the type code used in vertex tables.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "LEAF" => Some(Self::Primitive),
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }

    /// The type code written in vertex tables.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Primitive => "LEAF",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    pub fn is_derived(&self) -> bool {
        !matches!(self, Self::Primitive)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
