//! Broker and run statistics.

use serde::{Deserialize, Serialize};
use swarm_core::{BrokerId, ExecutorId, OutcomeRecord};

/// Running counters of one broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerStats {
    /// Tasks placed
    pub total_tasks: usize,
    /// Tasks that succeeded
    pub successful_tasks: usize,
    /// Wall-clock seconds spent placing and running tasks
    pub total_time: f64,
    /// Sum of executor-reported execution times
    pub total_execution_time: f64,
    /// Broker load divided by tasks placed
    pub average_load: f64,
}

impl BrokerStats {
    pub(crate) fn record(&mut self, record: &OutcomeRecord, load: f64) {
        self.total_tasks += 1;
        if record.success {
            self.successful_tasks += 1;
        }
        self.total_time += record.duration;
        self.total_execution_time += record.execution_time;
        self.average_load = load / self.total_tasks as f64;
    }

    /// Success rate in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.successful_tasks as f64 / self.total_tasks as f64
    }

    /// Mean executor-reported execution time.
    pub fn average_execution_time(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.total_execution_time / self.total_tasks as f64
    }
}

/// Outcome of processing a workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Strategy used by the brokers
    pub strategy: String,
    /// Tasks submitted
    pub tasks: usize,
    /// Tasks that ran and succeeded
    pub successful: usize,
    /// Tasks that could not be placed
    pub dispatch_errors: usize,
    /// `successful / tasks`
    pub success_rate: f64,
    /// Mean executor-reported execution time of placed tasks
    pub mean_execution_time: f64,
    /// Sample variance of tasks executed per executor
    pub executor_load_variance: f64,
    /// Tasks executed per executor
    pub executor_tasks: Vec<(ExecutorId, usize)>,
    /// Per-broker counters and final load
    pub brokers: Vec<BrokerSummary>,
    /// Maintenance rounds run
    pub maintenance_rounds: usize,
}

/// Per-broker slice of a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSummary {
    /// Broker
    pub broker: BrokerId,
    /// Counters
    pub stats: BrokerStats,
    /// Load after the run
    pub load: f64,
    /// SPSA steps applied
    pub updates: usize,
    /// Parameters after the run, if the broker learns
    pub parameters: Option<Vec<f64>>,
}

/// Sample variance; 0 for fewer than two values.
pub(crate) fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Strategy:            {}", self.strategy)?;
        writeln!(f, "Tasks:               {} ({} unplaced)", self.tasks, self.dispatch_errors)?;
        writeln!(f, "Success rate:        {:.1}%", self.success_rate * 100.0)?;
        writeln!(f, "Mean execution time: {:.3}s", self.mean_execution_time)?;
        writeln!(f, "Executor variance:   {:.3}", self.executor_load_variance)?;
        writeln!(f, "Maintenance rounds:  {}", self.maintenance_rounds)?;
        for broker in &self.brokers {
            write!(
                f,
                "  {}: {} tasks, {:.1}% success, load {:.3}, {} updates",
                broker.broker,
                broker.stats.total_tasks,
                broker.stats.success_rate() * 100.0,
                broker.load,
                broker.updates
            )?;
            if let Some(theta) = &broker.parameters {
                let rendered: Vec<String> = theta.iter().map(|t| format!("{t:.3}")).collect();
                write!(f, ", theta [{}]", rendered.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
