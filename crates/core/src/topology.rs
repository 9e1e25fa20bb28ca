//! Plain data describing the broker connectivity graph.

use serde::{Deserialize, Serialize};
use crate::id::BrokerId;

/// Summary statistics of the connectivity graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of brokers
    pub nodes: usize,
    /// Number of undirected edges
    pub edges: usize,
    /// Mean degree
    pub average_degree: f64,
    /// `edges / (n·(n-1)/2)`
    pub density: f64,
    /// Connected components
    pub components: usize,
    /// Largest degree
    pub max_degree: usize,
}

/// Kind of structural change a tick attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Add a random edge
    AddEdge,
    /// Remove a random edge
    RemoveEdge,
    /// Redraw the weight of a random edge
    Reweight,
}

/// Structural change performed by a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphMutation {
    /// An edge was added with a fresh weight
    EdgeAdded {
        /// First endpoint
        a: BrokerId,
        /// Second endpoint
        b: BrokerId,
        /// New weight
        weight: f64,
    },
    /// An edge and its weight were removed
    EdgeRemoved {
        /// First endpoint
        a: BrokerId,
        /// Second endpoint
        b: BrokerId,
    },
    /// An existing edge got a new weight
    EdgeReweighted {
        /// First endpoint
        a: BrokerId,
        /// Second endpoint
        b: BrokerId,
        /// New weight
        weight: f64,
    },
    /// The drawn mutation had no eligible edge
    Skipped {
        /// Mutation that was attempted
        kind: MutationKind,
    },
}

impl std::fmt::Display for GraphMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EdgeAdded { a, b, weight } => write!(f, "added {a}-{b} ({weight:.2})"),
            Self::EdgeRemoved { a, b } => write!(f, "removed {a}-{b}"),
            Self::EdgeReweighted { a, b, weight } => write!(f, "reweighted {a}-{b} ({weight:.2})"),
            Self::Skipped { kind } => write!(f, "skipped {kind:?}"),
        }
    }
}
