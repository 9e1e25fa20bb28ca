//! Stochastic executor with load-dependent admission and success.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use swarm_core::{Admission, ExecutionReport, ExecutorHandle, ExecutorId, Task};
use tokio::sync::Mutex;
use tracing::debug;

/// Cumulative counters of one executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// Tasks executed
    pub total_tasks: usize,
    /// Tasks that succeeded
    pub successful_tasks: usize,
    /// Sum of execution times
    pub total_time: f64,
    /// Sum of produced units
    pub total_units: u64,
}

impl ExecutorStats {
    /// Success rate in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.successful_tasks as f64 / self.total_tasks as f64
    }

    /// Mean execution time.
    pub fn average_time(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.total_time / self.total_tasks as f64
    }

    /// Mean units per task.
    pub fn average_units(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.total_units as f64 / self.total_tasks as f64
    }
}

struct State {
    rng: StdRng,
    stats: ExecutorStats,
}

/// Executor whose timing, output and success are drawn at random.
///
/// - admission: refused at capacity, otherwise accepted with probability
///   `max(0.1, 1 - load/capacity)`
/// - execution time: `complexity/10 * 2 + U(-0.5, 1.0)`, at least 0.1 s
/// - units: `complexity * 20 + U{10..=100}`
/// - success: probability `0.95 * (1 - load/capacity) + 0.05`
/// - cost: `units * 0.001`
pub struct SimulatedExecutor {
    id: ExecutorId,
    capacity: usize,
    load: AtomicUsize,
    time_scale: Option<f64>,
    state: Mutex<State>,
}

impl SimulatedExecutor {
    /// Create an executor.
    pub fn new(id: ExecutorId, capacity: usize, seed: Option<u64>) -> Self {
        Self {
            id,
            capacity,
            load: AtomicUsize::new(0),
            time_scale: None,
            state: Mutex::new(State {
                rng: seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy),
                stats: ExecutorStats::default(),
            }),
        }
    }

    /// Actually sleep for `execution_time * scale` seconds while executing.
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = (scale > 0.0 && scale.is_finite()).then_some(scale);
        self
    }

    /// Snapshot of the cumulative counters.
    pub async fn stats(&self) -> ExecutorStats {
        self.state.lock().await.stats.clone()
    }

    /// Clear the cumulative counters.
    pub async fn reset_stats(&self) {
        self.state.lock().await.stats = ExecutorStats::default();
    }

    fn utilization(&self, load: usize) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        load as f64 / self.capacity as f64
    }
}

/// Decrements the load when dropped, including on cancellation.
struct LoadGuard<'a>(&'a AtomicUsize);

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutorHandle for SimulatedExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn current_load(&self) -> usize {
        self.load.load(Ordering::SeqCst)
    }

    async fn accept(&self, _task: &Task) -> Admission {
        let load = self.current_load();
        if load >= self.capacity {
            return Admission::Rejected("executor at capacity".to_string());
        }
        let probability = (1.0 - self.utilization(load)).max(0.1);
        if self.state.lock().await.rng.gen::<f64>() < probability {
            Admission::Accepted
        } else {
            Admission::Rejected("rejected due to load".to_string())
        }
    }

    async fn execute(&self, task: &Task) -> ExecutionReport {
        let load = self.load.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = LoadGuard(&self.load);

        let (execution_time, units, success) = {
            let mut state = self.state.lock().await;
            let execution_time = (task.complexity / 10.0 * 2.0 + state.rng.gen_range(-0.5..1.0)).max(0.1);
            let units = (task.complexity * 20.0) as u64 + state.rng.gen_range(10..=100u64);
            let load_factor = (1.0 - self.utilization(load)).max(0.0);
            let success = state.rng.gen::<f64>() < 0.95 * load_factor + 0.05;
            (execution_time, units, success)
        };

        if let Some(scale) = self.time_scale {
            tokio::time::sleep(Duration::from_secs_f64(execution_time * scale)).await;
        }

        {
            let mut state = self.state.lock().await;
            state.stats.total_tasks += 1;
            state.stats.total_time += execution_time;
            state.stats.total_units += units;
            if success {
                state.stats.successful_tasks += 1;
            }
        }

        debug!(
            executor = %self.id,
            task = %task.id,
            success,
            execution_time,
            units,
            "task executed"
        );

        ExecutionReport {
            task_id: task.id,
            executor_id: self.id.clone(),
            success,
            duration_secs: execution_time,
            units,
            cost_estimate: units as f64 * 0.001,
        }
    }
}

impl std::fmt::Display for SimulatedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (load {}/{})", self.id, self.current_load(), self.capacity)
    }
}
