//! Groups of simulated executors shared between brokers.

use std::sync::Arc;

use swarm_core::{ExecutorHandle, ExecutorId};

use crate::simulated::{ExecutorStats, SimulatedExecutor};

/// A set of simulated executors.
#[derive(Default)]
pub struct ExecutorPool {
    executors: Vec<Arc<SimulatedExecutor>>,
}

impl ExecutorPool {
    /// `count` executors of equal capacity named `{prefix}_{i}`.
    pub fn uniform(prefix: &str, count: usize, capacity: usize, seed: Option<u64>) -> Self {
        Self::with_capacities(prefix, &vec![capacity; count], seed)
    }

    /// One executor per entry of `capacities`, named `{prefix}_{i}`.
    pub fn with_capacities(prefix: &str, capacities: &[usize], seed: Option<u64>) -> Self {
        let executors = capacities
            .iter()
            .enumerate()
            .map(|(i, &capacity)| {
                let seed = seed.map(|s| s ^ (i as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                Arc::new(SimulatedExecutor::new(
                    ExecutorId::new(format!("{prefix}_{i}")),
                    capacity,
                    seed,
                ))
            })
            .collect();
        Self { executors }
    }

    /// Sleep `execution_time * scale` during every execution.
    pub fn with_time_scale(self, scale: f64) -> Self {
        let executors = self
            .executors
            .into_iter()
            .map(|e| match Arc::try_unwrap(e) {
                Ok(exec) => Arc::new(exec.with_time_scale(scale)),
                Err(shared) => shared,
            })
            .collect();
        Self { executors }
    }

    /// Number of executors.
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Iterate over the executors.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SimulatedExecutor>> {
        self.executors.iter()
    }

    /// Type-erased handles for a broker.
    pub fn handles(&self) -> Vec<Arc<dyn ExecutorHandle>> {
        self.executors
            .iter()
            .map(|e| Arc::clone(e) as Arc<dyn ExecutorHandle>)
            .collect()
    }

    /// Per-executor counters, in pool order.
    pub async fn stats(&self) -> Vec<(ExecutorId, ExecutorStats)> {
        let mut all = Vec::with_capacity(self.executors.len());
        for exec in &self.executors {
            all.push((exec.id().clone(), exec.stats().await));
        }
        all
    }
}
