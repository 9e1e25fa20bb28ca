//! Swarm core data models.
//!
//! This crate defines the data structures and boundary contracts shared by
//! the learned, decentralized task-distribution mesh: tasks, execution
//! reports, outcome records, the executor contract, telemetry, configuration
//! and the error taxonomy.

#![warn(missing_docs)]

// Identities
mod id;

// Work
mod task;
mod outcome;
mod executor;

// Graph data
mod topology;

// Configuration, errors and telemetry
pub mod config;
mod error;
pub mod telemetry;

// Re-exports
pub use id::{TaskId, BrokerId, ExecutorId};

pub use task::{Task, TaskKind, DEFAULT_LEVEL};
pub use outcome::{Admission, ExecutionReport, OutcomeRecord};
pub use executor::ExecutorHandle;

pub use topology::{GraphStats, GraphMutation, MutationKind};

pub use config::{SwarmConfig, SpsaConfig, LvpConfig, GraphConfig, SystemConfig, ConfigError};
pub use error::{SwarmError, Result};
pub use telemetry::{
    TelemetryEvent, TelemetryRecord, TelemetrySink,
    TracingSink, MemorySink, NullSink, FanoutSink,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
