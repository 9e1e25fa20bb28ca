//! A scheduling vertex: learned selector, load estimate and executor set.

use std::sync::Arc;
use std::time::Instant;

use swarm_core::{
    BrokerId, ExecutorHandle, OutcomeRecord, Result, SpsaConfig, SwarmError, Task, TelemetryEvent,
    TelemetrySink, TracingSink,
};
use swarm_graph::Participant;
use swarm_learning::{LoadBalancer, SpsaOptimizer, UpdateOutcome};
use tracing::{debug, warn};

use crate::selector::{ExecutorSelector, RoundRobinSelector, SelectorKind, SelectorStrategy};
use crate::stats::BrokerStats;

/// Load added per second of executor-reported execution time.
const LOAD_PER_SECOND: f64 = 0.1;

/// Places tasks on its executors and learns from the outcomes.
pub struct Broker {
    id: BrokerId,
    executors: Vec<Arc<dyn ExecutorHandle>>,
    selector: Box<dyn ExecutorSelector>,
    balancer: LoadBalancer,
    load: f64,
    stats: BrokerStats,
    updates: usize,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Broker {
    /// Create a broker around an explicit selector.
    ///
    /// Fails with `InvalidParameterDimension` when the selector's parameter
    /// vector does not have one component per executor.
    pub fn new(
        id: BrokerId,
        executors: Vec<Arc<dyn ExecutorHandle>>,
        selector: Box<dyn ExecutorSelector>,
    ) -> Result<Self> {
        if let Some(theta) = selector.parameters() {
            if theta.len() != executors.len() {
                return Err(SwarmError::InvalidParameterDimension {
                    broker: id,
                    expected: executors.len(),
                    actual: theta.len(),
                });
            }
        }
        Ok(Self {
            id,
            executors,
            selector,
            balancer: LoadBalancer::default(),
            load: 0.0,
            stats: BrokerStats::default(),
            updates: 0,
            telemetry: Arc::new(TracingSink),
        })
    }

    /// Broker with a freshly initialized SPSA policy over `executors`.
    pub fn spsa(id: BrokerId, executors: Vec<Arc<dyn ExecutorHandle>>, config: SpsaConfig, seed: Option<u64>) -> Self {
        let optimizer = SpsaOptimizer::new(id, executors.len(), config, seed);
        Self::unchecked(id, executors, SelectorStrategy::Spsa(optimizer))
    }

    /// Broker with an SPSA policy starting from `theta`.
    pub fn with_parameters(
        id: BrokerId,
        executors: Vec<Arc<dyn ExecutorHandle>>,
        theta: Vec<f64>,
        config: SpsaConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        let optimizer = SpsaOptimizer::with_parameters(id, theta, config, seed);
        Self::new(id, executors, Box::new(SelectorStrategy::Spsa(optimizer)))
    }

    /// Broker cycling through `executors`.
    pub fn round_robin(id: BrokerId, executors: Vec<Arc<dyn ExecutorHandle>>) -> Self {
        Self::unchecked(id, executors, SelectorStrategy::RoundRobin(RoundRobinSelector::new()))
    }

    /// Broker using the given strategy kind.
    pub fn from_kind(
        kind: SelectorKind,
        id: BrokerId,
        executors: Vec<Arc<dyn ExecutorHandle>>,
        config: SpsaConfig,
        seed: Option<u64>,
    ) -> Self {
        match kind {
            SelectorKind::Spsa => Self::spsa(id, executors, config, seed),
            SelectorKind::RoundRobin => Self::round_robin(id, executors),
        }
    }

    fn unchecked(id: BrokerId, executors: Vec<Arc<dyn ExecutorHandle>>, strategy: SelectorStrategy) -> Self {
        Self {
            id,
            executors,
            selector: Box::new(strategy),
            balancer: LoadBalancer::default(),
            load: 0.0,
            stats: BrokerStats::default(),
            updates: 0,
            telemetry: Arc::new(TracingSink),
        }
    }

    /// Set the load-balancing coefficients.
    pub fn with_balancer(mut self, balancer: LoadBalancer) -> Self {
        self.balancer = balancer;
        self
    }

    /// Set the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub(crate) fn set_telemetry(&mut self, telemetry: Arc<dyn TelemetrySink>) {
        self.telemetry = telemetry;
    }

    /// Identifier.
    pub fn id(&self) -> BrokerId {
        self.id
    }

    /// Executors this broker places work on.
    pub fn executors(&self) -> &[Arc<dyn ExecutorHandle>] {
        &self.executors
    }

    /// Name of the selection strategy.
    pub fn strategy(&self) -> &'static str {
        self.selector.name()
    }

    /// Current parameters, if the strategy learns.
    pub fn parameters(&self) -> Option<&[f64]> {
        self.selector.parameters()
    }

    /// Current load estimate.
    pub fn load(&self) -> f64 {
        self.load
    }

    /// Overwrite the load estimate (clamped at 0).
    pub fn set_load(&mut self, load: f64) {
        self.load = if load.is_finite() { load.max(0.0) } else { 0.0 };
    }

    /// Running counters.
    pub fn stats(&self) -> &BrokerStats {
        &self.stats
    }

    /// SPSA steps applied so far.
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// The executor this broker would try first for `task`.
    pub fn select_executor(&mut self, task: &Task) -> Result<Arc<dyn ExecutorHandle>> {
        let order = self.selector.rank(task, self.executors.len());
        order
            .first()
            .and_then(|&i| self.executors.get(i))
            .cloned()
            .ok_or(SwarmError::NoExecutorAvailable { broker: self.id })
    }

    /// Place `task`, run it and learn from the outcome.
    ///
    /// Candidates are offered the task in ranked order until one admits it.
    /// A failed execution is returned as an ordinary record with
    /// `success: false`.
    pub async fn process_task(&mut self, task: Task) -> Result<OutcomeRecord> {
        let start = Instant::now();

        if self.executors.is_empty() {
            return Err(SwarmError::NoExecutorAvailable { broker: self.id });
        }

        let order = self.selector.rank(&task, self.executors.len());
        let mut chosen = None;
        for &i in &order {
            let Some(executor) = self.executors.get(i) else {
                continue;
            };
            let admission = executor.accept(&task).await;
            if admission.is_accepted() {
                chosen = Some(Arc::clone(executor));
                break;
            }
            self.telemetry.emit(TelemetryEvent::TaskRejected {
                broker: self.id,
                executor: executor.id().clone(),
                reason: admission.reason().to_string(),
            });
        }

        let Some(executor) = chosen else {
            warn!(broker = %self.id, task = %task.id, "every executor refused the task");
            return Err(SwarmError::ExecutorsSaturated {
                broker: self.id,
                attempted: order.len(),
            });
        };

        debug!(broker = %self.id, task = %task.id, executor = %executor.id(), "placing task");
        let report = executor.execute(&task).await;
        let record = OutcomeRecord::from_report(task, &report, start.elapsed().as_secs_f64());

        self.load += record.execution_time * LOAD_PER_SECOND;
        self.stats.record(&record, self.load);

        self.telemetry.emit(TelemetryEvent::TaskCompleted {
            broker: self.id,
            executor: record.executor.clone(),
            task: record.task.id,
            success: record.success,
            execution_time: record.execution_time,
            duration: record.duration,
        });

        self.record_outcome(record.clone());
        Ok(record)
    }

    /// Feed an outcome to the selector; reports any SPSA step it triggers.
    pub fn record_outcome(&mut self, record: OutcomeRecord) -> Option<UpdateOutcome> {
        let outcome = self.selector.observe(record)?;
        if let UpdateOutcome::Applied(report) = &outcome {
            self.updates += 1;
            self.telemetry.emit(TelemetryEvent::ParametersUpdated {
                broker: self.id,
                theta: report.theta.clone(),
                loss_plus: report.loss_plus,
                loss_minus: report.loss_minus,
                observed_loss: report.window.observed_loss,
                update: report.update,
            });
        }
        Some(outcome)
    }

    /// Move the load estimate toward the neighbors' average.
    pub fn balance_load(&mut self, neighbor_loads: &[f64]) -> f64 {
        self.load = self.balancer.correct(self.load, neighbor_loads);
        self.load
    }
}

impl Participant for Broker {
    fn participant_id(&self) -> BrokerId {
        self.id
    }

    fn parameters(&self) -> Option<&[f64]> {
        self.selector.parameters()
    }

    fn set_parameters(&mut self, theta: Vec<f64>) {
        self.selector.set_parameters(theta);
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("id", &self.id)
            .field("strategy", &self.selector.name())
            .field("executors", &self.executors.len())
            .field("load", &self.load)
            .field("stats", &self.stats)
            .finish()
    }
}
