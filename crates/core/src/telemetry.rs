//! Telemetry events emitted by the broker mesh and the sinks that receive them.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::id::{BrokerId, ExecutorId, TaskId};
use crate::topology::{GraphMutation, GraphStats};
use crate::Time;

/// Something worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A task finished (successfully or not)
    TaskCompleted {
        /// Broker that placed it
        broker: BrokerId,
        /// Executor that ran it
        executor: ExecutorId,
        /// Task
        task: TaskId,
        /// Outcome
        success: bool,
        /// Execution time reported by the executor
        execution_time: f64,
        /// Wall-clock time spent by the broker
        duration: f64,
    },

    /// An executor refused a task
    TaskRejected {
        /// Broker that offered it
        broker: BrokerId,
        /// Executor that refused
        executor: ExecutorId,
        /// Refusal reason
        reason: String,
    },

    /// A broker ran an SPSA update
    ParametersUpdated {
        /// Broker
        broker: BrokerId,
        /// Parameter vector after the update
        theta: Vec<f64>,
        /// Loss at `theta + beta·delta`
        loss_plus: f64,
        /// Loss at `theta - beta·delta`
        loss_minus: f64,
        /// Loss of the observed outcome window
        observed_loss: f64,
        /// Number of updates this broker has run
        update: usize,
    },

    /// The connectivity graph ticked
    GraphTicked {
        /// Structural change, if any was attempted
        mutation: Option<GraphMutation>,
        /// Statistics after the tick
        stats: GraphStats,
    },

    /// A consensus round was applied
    ConsensusApplied {
        /// Brokers whose parameters moved
        participants: usize,
        /// Largest correction norm
        max_correction: f64,
        /// Sum of squared distances to the mean parameter vector, after the round
        disagreement: f64,
    },

    /// Loads after a balancing round
    LoadBalanced {
        /// Load per broker
        loads: Vec<(BrokerId, f64)>,
    },
}

/// A telemetry event with the time it was emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// When
    pub timestamp: Time,
    /// What
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

impl TelemetryRecord {
    /// Stamp an event with the current time.
    pub fn now(event: TelemetryEvent) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event,
        }
    }
}

/// Receiver of telemetry.
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: TelemetryEvent);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Renders events as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::TaskCompleted { broker, executor, task, success, execution_time, .. } => {
                debug!(%broker, %executor, %task, success, execution_time, "task completed");
            }
            TelemetryEvent::TaskRejected { broker, executor, reason } => {
                warn!(%broker, %executor, %reason, "task rejected");
            }
            TelemetryEvent::ParametersUpdated { broker, theta, observed_loss, update, .. } => {
                info!(%broker, update, observed_loss, ?theta, "parameters updated");
            }
            TelemetryEvent::GraphTicked { mutation, stats } => {
                let mutation = mutation.map(|m| m.to_string()).unwrap_or_else(|| "none".to_string());
                info!(%mutation, edges = stats.edges, average_degree = stats.average_degree, density = stats.density, "graph ticked");
            }
            TelemetryEvent::ConsensusApplied { participants, max_correction, disagreement } => {
                info!(participants, max_correction, disagreement, "consensus applied");
            }
            TelemetryEvent::LoadBalanced { loads } => {
                debug!(?loads, "loads balanced");
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything collected so far.
    pub fn records(&self) -> Vec<TelemetryRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Collected events, without timestamps.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.records().into_iter().map(|r| r.event).collect()
    }

    /// Number of collected events.
    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: TelemetryEvent) {
        let record = TelemetryRecord::now(event);
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Forwards each event to several sinks.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl TelemetrySink for FanoutSink {
    fn emit(&self, event: TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
