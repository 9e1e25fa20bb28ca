//! Graph errors.

use swarm_core::SwarmError;
use thiserror::Error;

/// Graph result type.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building or maintaining the graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Degree bounds no graph of this size can satisfy
    #[error("degree bounds [{min_neighbors}, {max_neighbors}] cannot be met by {num_brokers} brokers")]
    Unsatisfiable {
        /// Requested minimum degree
        min_neighbors: usize,
        /// Requested maximum degree
        max_neighbors: usize,
        /// Graph size
        num_brokers: usize,
    },

    /// Parameters outside their valid range
    #[error("invalid graph configuration: {0}")]
    InvalidConfig(String),

    /// Adjacency and weights disagree
    #[error("inconsistent graph: {0}")]
    Inconsistent(String),
}

impl From<GraphError> for SwarmError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Unsatisfiable {
                min_neighbors,
                max_neighbors,
                num_brokers,
            } => SwarmError::GraphConstraintUnsatisfiable {
                min_neighbors,
                max_neighbors,
                num_brokers,
            },
            GraphError::InvalidConfig(msg) | GraphError::Inconsistent(msg) => SwarmError::Graph(msg),
        }
    }
}
