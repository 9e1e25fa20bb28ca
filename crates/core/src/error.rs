//! Error taxonomy shared by the broker mesh.

use crate::config::ConfigError;
use crate::id::BrokerId;

/// Result alias for broker-mesh operations.
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Errors surfaced to callers.
///
/// Task failures reported by executors are not errors; they travel as
/// `ExecutionReport { success: false, .. }`.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    /// The broker was asked to place a task with no candidate executors
    #[error("no executor available for {broker}")]
    NoExecutorAvailable {
        /// Broker that had no candidates
        broker: BrokerId,
    },

    /// Every candidate executor refused the task
    #[error("all {attempted} executors of {broker} refused the task")]
    ExecutorsSaturated {
        /// Broker that offered the task
        broker: BrokerId,
        /// Number of executors asked
        attempted: usize,
    },

    /// A parameter vector does not match the executor set it scores
    #[error("{broker}: parameter vector has {actual} components, executor set has {expected}")]
    InvalidParameterDimension {
        /// Offending broker
        broker: BrokerId,
        /// Number of executors
        expected: usize,
        /// Length of the supplied parameter vector
        actual: usize,
    },

    /// Degree bounds cannot be met for this broker count
    #[error("graph constraint unsatisfiable: min_neighbors={min_neighbors}, max_neighbors={max_neighbors}, brokers={num_brokers}")]
    GraphConstraintUnsatisfiable {
        /// Requested minimum degree
        min_neighbors: usize,
        /// Requested maximum degree
        max_neighbors: usize,
        /// Number of brokers
        num_brokers: usize,
    },

    /// No broker with this id
    #[error("unknown broker: {0}")]
    UnknownBroker(BrokerId),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Connectivity graph inconsistency
    #[error("graph error: {0}")]
    Graph(String),
}
