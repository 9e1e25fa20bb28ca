//! The control loop - dispatch, periodic maintenance and run summaries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swarm_core::{
    BrokerId, ConfigError, ExecutorHandle, ExecutorId, LvpConfig, OutcomeRecord, Result, SwarmConfig, SwarmError,
    Task, TelemetryEvent, TelemetrySink, TracingSink,
};
use swarm_graph::{ConnectivityGraph, ConsensusReport, TickReport};
use swarm_learning::LoadBalancer;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::selector::SelectorKind;
use crate::stats::{sample_variance, BrokerSummary, RunSummary};

const GRAPH_SEED_SALT: u64 = 1;
const BROKER_SEED_SALT: u64 = 100;

/// How submitted tasks are assigned to brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Brokers in turn
    #[default]
    RoundRobin,
    /// Broker with the lowest load estimate; ties go to the lowest id
    LeastLoaded,
}

/// Configuration for the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Consensus step size
    pub gamma_consensus: f64,
    /// Tasks between maintenance rounds (0 = never automatically)
    pub maintenance_interval: usize,
    /// Broker assignment
    pub dispatch: DispatchPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            gamma_consensus: 0.02,
            maintenance_interval: 10,
            dispatch: DispatchPolicy::default(),
        }
    }
}

/// Result of one maintenance round.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceReport {
    /// Ordinal of this round (1-based)
    pub round: usize,
    /// Graph tick
    pub tick: TickReport,
    /// Consensus round
    pub consensus: ConsensusReport,
    /// Loads after balancing
    pub loads: Vec<(BrokerId, f64)>,
}

/// Owns the brokers and their connectivity graph.
///
/// ```text
/// submit → broker.process_task → (every N tasks) tick → consensus → balance
/// ```
///
/// Every operation takes `&mut self`, so scoring never observes a partially
/// applied consensus round.
pub struct Coordinator {
    brokers: Vec<Broker>,
    graph: ConnectivityGraph,
    config: CoordinatorConfig,
    telemetry: Arc<dyn TelemetrySink>,
    submitted: usize,
    next_broker: usize,
    rounds: usize,
    executor_tasks: BTreeMap<ExecutorId, usize>,
}

impl Coordinator {
    /// Create a coordinator. Broker `i` must be graph node `i`.
    pub fn new(brokers: Vec<Broker>, graph: ConnectivityGraph) -> Result<Self> {
        if brokers.is_empty() {
            return Err(ConfigError::Invalid("a coordinator needs at least one broker".to_string()).into());
        }
        if brokers.len() != graph.node_count() {
            return Err(SwarmError::Graph(format!(
                "{} brokers but the graph has {} nodes",
                brokers.len(),
                graph.node_count()
            )));
        }
        if let Some((i, broker)) = brokers.iter().enumerate().find(|(i, b)| b.id().index() != *i) {
            return Err(SwarmError::Graph(format!("broker at position {i} has id {}", broker.id())));
        }

        let mut executor_tasks = BTreeMap::new();
        for broker in &brokers {
            for executor in broker.executors() {
                executor_tasks.insert(executor.id().clone(), 0);
            }
        }

        Ok(Self {
            brokers,
            graph,
            config: CoordinatorConfig::default(),
            telemetry: Arc::new(TracingSink),
            submitted: 0,
            next_broker: 0,
            rounds: 0,
            executor_tasks,
        })
    }

    /// Build a deployment from configuration: `num_brokers` brokers of the
    /// given kind sharing `executors`, over a random connectivity graph.
    pub fn from_config(
        config: &SwarmConfig,
        executors: Vec<Arc<dyn ExecutorHandle>>,
        kind: SelectorKind,
    ) -> Result<Self> {
        config.validate()?;

        let num_brokers = config.system.num_brokers;
        let graph = ConnectivityGraph::new(
            num_brokers,
            config.graph.clone(),
            config.component_seed(GRAPH_SEED_SALT),
        )?;

        let balancer = LoadBalancer::from(&config.lvp);
        let brokers = (0..num_brokers)
            .map(|i| {
                let seed = config.component_seed(BROKER_SEED_SALT + i as u64);
                Broker::from_kind(kind, BrokerId(i), executors.clone(), config.spsa.clone(), seed)
                    .with_balancer(balancer)
            })
            .collect();

        info!(
            brokers = num_brokers,
            executors = executors.len(),
            strategy = %kind,
            edges = graph.edge_count(),
            "coordinator ready"
        );

        Ok(Self::new(brokers, graph)?.with_config(CoordinatorConfig {
            gamma_consensus: config.spsa.gamma_consensus,
            maintenance_interval: config.system.maintenance_interval,
            dispatch: DispatchPolicy::default(),
        }))
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the dispatch policy.
    pub fn with_dispatch(mut self, dispatch: DispatchPolicy) -> Self {
        self.config.dispatch = dispatch;
        self
    }

    /// Set the telemetry sink for the coordinator and every broker.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        for broker in &mut self.brokers {
            broker.set_telemetry(Arc::clone(&telemetry));
        }
        self.telemetry = telemetry;
        self
    }

    /// Replace every broker's load-balancing coefficients.
    pub fn with_lvp(mut self, lvp: &LvpConfig) -> Self {
        let balancer = LoadBalancer::from(lvp);
        self.brokers = self.brokers.into_iter().map(|b| b.with_balancer(balancer)).collect();
        self
    }

    /// Brokers, indexed by id.
    pub fn brokers(&self) -> &[Broker] {
        &self.brokers
    }

    /// A broker by id.
    pub fn broker(&self, id: BrokerId) -> Result<&Broker> {
        self.brokers.get(id.index()).ok_or(SwarmError::UnknownBroker(id))
    }

    /// Connectivity graph.
    pub fn graph(&self) -> &ConnectivityGraph {
        &self.graph
    }

    /// Tasks submitted so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Maintenance rounds run so far.
    pub fn maintenance_rounds(&self) -> usize {
        self.rounds
    }

    fn next_target(&mut self) -> BrokerId {
        match self.config.dispatch {
            DispatchPolicy::RoundRobin => {
                let target = self.next_broker % self.brokers.len();
                self.next_broker = target + 1;
                BrokerId(target)
            }
            DispatchPolicy::LeastLoaded => self
                .brokers
                .iter()
                .min_by(|a, b| a.load().total_cmp(&b.load()).then(a.id().cmp(&b.id())))
                .map(Broker::id)
                .unwrap_or(BrokerId(0)),
        }
    }

    /// Dispatch `task` to a broker chosen by the dispatch policy.
    pub async fn submit(&mut self, task: Task) -> Result<OutcomeRecord> {
        let target = self.next_target();
        self.submit_to(target, task).await
    }

    /// Dispatch `task` to a specific broker.
    ///
    /// Counts toward the maintenance cadence even when placement fails. A
    /// failed maintenance round is logged and does not discard the task's
    /// outcome.
    pub async fn submit_to(&mut self, broker: BrokerId, task: Task) -> Result<OutcomeRecord> {
        let target = self
            .brokers
            .get_mut(broker.index())
            .ok_or(SwarmError::UnknownBroker(broker))?;

        let result = target.process_task(task).await;
        self.submitted += 1;

        if let Ok(record) = &result {
            *self.executor_tasks.entry(record.executor.clone()).or_insert(0) += 1;
        }

        let interval = self.config.maintenance_interval;
        if interval > 0 && self.submitted % interval == 0 {
            if let Err(e) = self.run_maintenance() {
                error!("maintenance after task {} failed: {}", self.submitted, e);
            }
        }
        result
    }

    /// Tick the graph, run a consensus round and rebalance loads.
    ///
    /// Load balancing reads a snapshot of every broker's load taken before
    /// any broker is corrected.
    pub fn run_maintenance(&mut self) -> Result<MaintenanceReport> {
        let tick = self.graph.tick()?;
        self.telemetry.emit(TelemetryEvent::GraphTicked {
            mutation: tick.mutation.clone(),
            stats: tick.stats.clone(),
        });

        let consensus = self
            .graph
            .consensus_update(&mut self.brokers, self.config.gamma_consensus);
        self.telemetry.emit(TelemetryEvent::ConsensusApplied {
            participants: consensus.participants,
            max_correction: consensus.max_correction,
            disagreement: consensus.disagreement_after,
        });

        let snapshot: Vec<f64> = self.brokers.iter().map(Broker::load).collect();
        let mut loads = Vec::with_capacity(self.brokers.len());
        for broker in &mut self.brokers {
            let neighbor_loads: Vec<f64> = self
                .graph
                .neighbors(broker.id())
                .iter()
                .filter_map(|j| snapshot.get(j.index()).copied())
                .collect();
            loads.push((broker.id(), broker.balance_load(&neighbor_loads)));
        }
        self.telemetry.emit(TelemetryEvent::LoadBalanced { loads: loads.clone() });

        self.rounds += 1;
        debug!(round = self.rounds, edges = tick.stats.edges, "maintenance round complete");

        Ok(MaintenanceReport {
            round: self.rounds,
            tick,
            consensus,
            loads,
        })
    }

    /// Process a workload and summarize it.
    ///
    /// Placement failures are counted, not raised; graph failures abort the
    /// run.
    pub async fn run(&mut self, tasks: Vec<Task>) -> Result<RunSummary> {
        let total = tasks.len();
        let mut successful = 0usize;
        let mut dispatch_errors = 0usize;
        let mut execution_time = 0.0;
        let mut placed = 0usize;

        for task in tasks {
            match self.submit(task).await {
                Ok(record) => {
                    placed += 1;
                    execution_time += record.execution_time;
                    if record.success {
                        successful += 1;
                    }
                }
                Err(e @ (SwarmError::NoExecutorAvailable { .. } | SwarmError::ExecutorsSaturated { .. })) => {
                    warn!("task not placed: {}", e);
                    dispatch_errors += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self.summary(total, successful, dispatch_errors, placed, execution_time))
    }

    fn summary(
        &self,
        tasks: usize,
        successful: usize,
        dispatch_errors: usize,
        placed: usize,
        execution_time: f64,
    ) -> RunSummary {
        let executor_tasks: Vec<(ExecutorId, usize)> =
            self.executor_tasks.iter().map(|(id, n)| (id.clone(), *n)).collect();
        let counts: Vec<f64> = executor_tasks.iter().map(|(_, n)| *n as f64).collect();

        RunSummary {
            strategy: self
                .brokers
                .first()
                .map(|b| b.strategy().to_string())
                .unwrap_or_default(),
            tasks,
            successful,
            dispatch_errors,
            success_rate: if tasks > 0 { successful as f64 / tasks as f64 } else { 0.0 },
            mean_execution_time: if placed > 0 { execution_time / placed as f64 } else { 0.0 },
            executor_load_variance: sample_variance(&counts),
            executor_tasks,
            brokers: self
                .brokers
                .iter()
                .map(|b| BrokerSummary {
                    broker: b.id(),
                    stats: b.stats().clone(),
                    load: b.load(),
                    updates: b.updates(),
                    parameters: b.parameters().map(<[f64]>::to_vec),
                })
                .collect(),
            maintenance_rounds: self.rounds,
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("brokers", &self.brokers)
            .field("edges", &self.graph.edge_count())
            .field("submitted", &self.submitted)
            .field("rounds", &self.rounds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{GraphConfig, MemorySink};
    use swarm_executor::{ExecutorPool, ScriptedExecutor};

    fn seeded_config(seed: u64) -> SwarmConfig {
        let mut config = SwarmConfig::default();
        config.system.seed = Some(seed);
        config
    }

    fn workload(n: usize) -> Vec<Task> {
        (0..n)
            .map(|i| {
                Task::new(format!("task {i}"))
                    .with_priority(5.0 + (i % 3) as f64 - 1.0)
                    .with_complexity(4.0 + (i % 5) as f64)
            })
            .collect()
    }

    #[test]
    fn test_cold_start_every_broker_selects() {
        let executors = ExecutorPool::uniform("executor", 4, 10, Some(3)).handles();
        let mut coordinator = Coordinator::from_config(&seeded_config(3), executors.clone(), SelectorKind::Spsa).unwrap();
        assert_eq!(coordinator.brokers().len(), 3);
        for broker in &mut coordinator.brokers {
            assert_eq!(broker.parameters().map(<[f64]>::len), Some(4));
            let chosen = broker.select_executor(&Task::new("hello")).unwrap();
            assert!(executors.iter().any(|e| e.id() == chosen.id()));
        }
    }

    #[tokio::test]
    async fn test_run_triggers_maintenance() {
        let sink = MemorySink::new();
        let executors = ExecutorPool::with_capacities("executor", &[8, 10, 12, 9], Some(5)).handles();
        let mut coordinator = Coordinator::from_config(&seeded_config(5), executors, SelectorKind::Spsa)
            .unwrap()
            .with_telemetry(Arc::new(sink.clone()));

        let summary = coordinator.run(workload(30)).await.unwrap();
        assert_eq!(summary.tasks, 30);
        assert_eq!(summary.dispatch_errors, 0);
        assert_eq!(summary.maintenance_rounds, 3);
        assert_eq!(summary.executor_tasks.iter().map(|(_, n)| n).sum::<usize>(), 30);
        assert_eq!(summary.brokers.iter().map(|b| b.stats.total_tasks).sum::<usize>(), 30);
        assert!(summary.mean_execution_time > 0.0);

        let events = sink.events();
        let ticks = events.iter().filter(|e| matches!(e, TelemetryEvent::GraphTicked { .. })).count();
        let completed = events.iter().filter(|e| matches!(e, TelemetryEvent::TaskCompleted { .. })).count();
        assert_eq!(ticks, 3);
        assert_eq!(completed, 30);
    }

    #[tokio::test]
    async fn test_round_robin_dispatch_spreads_tasks() {
        let executors = ExecutorPool::uniform("executor", 4, 10, Some(2)).handles();
        let mut coordinator = Coordinator::from_config(&seeded_config(2), executors, SelectorKind::RoundRobin).unwrap();
        let summary = coordinator.run(workload(12)).await.unwrap();
        for broker in &summary.brokers {
            assert_eq!(broker.stats.total_tasks, 4);
            assert!(broker.parameters.is_none());
        }
        assert_eq!(summary.strategy, "round_robin");
    }

    #[tokio::test]
    async fn test_least_loaded_dispatch() {
        let executors: Vec<Arc<dyn ExecutorHandle>> =
            vec![Arc::new(ScriptedExecutor::new(ExecutorId::new("e"), 10))];
        let mut coordinator = Coordinator::from_config(&seeded_config(1), executors, SelectorKind::RoundRobin)
            .unwrap()
            .with_config(CoordinatorConfig {
                maintenance_interval: 0,
                dispatch: DispatchPolicy::LeastLoaded,
                ..Default::default()
            });

        // each scripted run takes 1s and adds 0.1 load
        for _ in 0..4 {
            coordinator.submit(Task::new("x")).await.unwrap();
        }
        let placed: Vec<usize> = coordinator.brokers().iter().map(|b| b.stats().total_tasks).collect();
        assert_eq!(placed, vec![2, 1, 1]);
        assert_eq!(coordinator.maintenance_rounds(), 0);
    }

    #[tokio::test]
    async fn test_unknown_broker() {
        let executors = ExecutorPool::uniform("executor", 2, 10, Some(1)).handles();
        let mut coordinator = Coordinator::from_config(&seeded_config(1), executors, SelectorKind::Spsa).unwrap();
        let err = coordinator.submit_to(BrokerId(9), Task::new("x")).await.unwrap_err();
        assert!(matches!(err, SwarmError::UnknownBroker(id) if id == BrokerId(9)));
        assert!(coordinator.broker(BrokerId(9)).is_err());
    }

    #[test]
    fn test_maintenance_pulls_parameters_together() {
        let executors = ExecutorPool::uniform("executor", 4, 10, Some(8)).handles();
        let mut config = seeded_config(8);
        config.graph = GraphConfig::default().with_edge_probability(1.0).with_degree_bounds(2, 5);
        config.graph.mutation_probability = 0.0;
        config.spsa.gamma_consensus = 0.1;
        let mut coordinator = Coordinator::from_config(&config, executors, SelectorKind::Spsa).unwrap();

        let first = coordinator.run_maintenance().unwrap();
        assert_eq!(first.consensus.participants, 3);
        let mut previous = first.consensus.disagreement_after;
        assert!(previous < first.consensus.disagreement_before);
        for _ in 0..20 {
            let report = coordinator.run_maintenance().unwrap();
            assert!(report.consensus.disagreement_after < previous);
            previous = report.consensus.disagreement_after;
        }
        assert_eq!(coordinator.maintenance_rounds(), 21);
    }

    #[test]
    fn test_maintenance_balances_from_snapshot() {
        let executors = ExecutorPool::uniform("executor", 2, 10, Some(4)).handles();
        let mut config = seeded_config(4);
        config.graph = GraphConfig::default().with_edge_probability(1.0);
        config.graph.mutation_probability = 0.0;
        let mut coordinator = Coordinator::from_config(&config, executors, SelectorKind::RoundRobin).unwrap();
        coordinator.brokers[0].set_load(3.0);

        let report = coordinator.run_maintenance().unwrap();
        // triangle: broker 0 sees [0, 0], brokers 1 and 2 see [3, 0]
        assert!((report.loads[0].1 - (3.0 - 0.1 * 0.15 * 3.0)).abs() < 1e-12);
        assert!((report.loads[1].1 - 0.1 * 0.15 * 1.5).abs() < 1e-12);
        assert!((report.loads[2].1 - report.loads[1].1).abs() < 1e-12);
        assert_eq!(report.consensus.participants, 0);
    }

    #[test]
    fn test_mismatched_graph_is_rejected() {
        let graph = ConnectivityGraph::from_edges(2, &[(0, 1)], GraphConfig::default(), Some(1)).unwrap();
        let brokers = vec![Broker::round_robin(BrokerId(0), Vec::new())];
        assert!(Coordinator::new(brokers, graph).is_err());

        let graph = ConnectivityGraph::from_edges(1, &[], GraphConfig::default(), Some(1)).unwrap();
        assert!(Coordinator::new(Vec::new(), graph).is_err());
    }

    #[tokio::test]
    async fn test_failed_maintenance_keeps_outcome() {
        let executor: Arc<dyn ExecutorHandle> = Arc::new(ScriptedExecutor::new(ExecutorId::new("e"), 10));
        let brokers = vec![
            Broker::round_robin(BrokerId(0), vec![executor.clone()]),
            Broker::round_robin(BrokerId(1), vec![executor]),
        ];
        let config = GraphConfig {
            weight_decay: f64::INFINITY,
            mutation_probability: 0.0,
            ..GraphConfig::default()
        };
        let graph = ConnectivityGraph::from_edges(2, &[(0, 1)], config, Some(1)).unwrap();
        let mut coordinator = Coordinator::new(brokers, graph).unwrap().with_config(CoordinatorConfig {
            maintenance_interval: 1,
            ..Default::default()
        });

        let record = coordinator.submit_to(BrokerId(0), Task::new("x")).await.unwrap();
        assert!(record.success);
        assert_eq!(coordinator.submitted(), 1);
        assert_eq!(coordinator.maintenance_rounds(), 0);
    }

    #[test]
    fn test_coordinator_debug() {
        let executors = ExecutorPool::uniform("executor", 2, 10, Some(1)).handles();
        let coordinator = Coordinator::from_config(&seeded_config(1), executors, SelectorKind::RoundRobin).unwrap();
        let rendered = format!("{coordinator:?}");
        assert!(rendered.starts_with("Coordinator"));
        assert!(rendered.contains("submitted: 0"));
    }

    #[test]
    fn test_unsatisfiable_graph_is_fatal() {
        let executors = ExecutorPool::uniform("executor", 2, 10, Some(1)).handles();
        let mut config = seeded_config(1);
        config.system.num_brokers = 2;
        config.graph = config.graph.with_degree_bounds(2, 5);
        let err = Coordinator::from_config(&config, executors, SelectorKind::Spsa).unwrap_err();
        assert!(matches!(err, SwarmError::GraphConstraintUnsatisfiable { num_brokers: 2, .. }));
    }
}
