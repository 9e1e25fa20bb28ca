//! Boundary contract for the units that actually run work.

use async_trait::async_trait;
use crate::id::ExecutorId;
use crate::outcome::{Admission, ExecutionReport};
use crate::task::Task;

/// A capacity-bounded unit that accepts and executes tasks.
///
/// Implementations own their own concurrency; brokers share handles through
/// `Arc<dyn ExecutorHandle>`.
#[async_trait]
pub trait ExecutorHandle: Send + Sync {
    /// Stable identifier.
    fn id(&self) -> &ExecutorId;

    /// Maximum number of concurrent tasks.
    fn capacity(&self) -> usize;

    /// Number of tasks currently running.
    fn current_load(&self) -> usize;

    /// Decide whether to take `task`.
    async fn accept(&self, task: &Task) -> Admission;

    /// Run `task`. Execution failures are reported inside the returned
    /// report, never as an error.
    async fn execute(&self, task: &Task) -> ExecutionReport;

    /// Fraction of free capacity in `[0, 1]`.
    fn availability(&self) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        (capacity.saturating_sub(self.current_load()) as f64 / capacity as f64).clamp(0.0, 1.0)
    }
}
