//! Reference executors - simulated and scripted implementations of
//! `ExecutorHandle`, and pools of them.

#![warn(missing_docs, unused_crate_dependencies)]

mod pool;
mod scripted;
mod simulated;

pub use pool::ExecutorPool;
pub use scripted::{ScriptedExecutor, ScriptedStep};
pub use simulated::{ExecutorStats, SimulatedExecutor};
