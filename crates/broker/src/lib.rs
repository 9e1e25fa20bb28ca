//! Broker layer - executor selection, task placement and the coordinating
//! control loop.

#![warn(missing_docs)]

pub mod broker;
pub mod coordinator;
pub mod selector;
pub mod stats;

pub use broker::Broker;
pub use coordinator::{Coordinator, CoordinatorConfig, DispatchPolicy, MaintenanceReport};
pub use selector::{ExecutorSelector, RoundRobinSelector, SelectorKind, SelectorStrategy};
pub use stats::{BrokerStats, BrokerSummary, RunSummary};
