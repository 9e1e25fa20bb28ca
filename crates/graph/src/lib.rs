//! Broker topology - degree-bounded connectivity graph, maintenance ticks
//! and neighbor consensus.

#![warn(missing_docs, unused_crate_dependencies)]

mod consensus;
mod error;
mod graph;
mod repair;
mod stats;

pub use consensus::{disagreement, ConsensusReport, Participant};
pub use error::{GraphError, Result};
pub use graph::{ConnectivityGraph, TickReport};
