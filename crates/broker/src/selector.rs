//! Executor selection strategies.

use serde::{Deserialize, Serialize};
use swarm_core::{OutcomeRecord, Task};
use swarm_learning::{SpsaOptimizer, UpdateOutcome};

/// Strategy for ordering a broker's executors for a task.
pub trait ExecutorSelector: Send {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Candidate indices in preference order. Every index in
    /// `0..candidates` appears exactly once.
    fn rank(&mut self, task: &Task, candidates: usize) -> Vec<usize>;

    /// Learn from a completed task.
    fn observe(&mut self, record: OutcomeRecord) -> Option<UpdateOutcome>;

    /// Learned parameters, if the strategy has any.
    fn parameters(&self) -> Option<&[f64]>;

    /// Overwrite the learned parameters. Ignored by strategies without any.
    fn set_parameters(&mut self, theta: Vec<f64>);
}

impl ExecutorSelector for SpsaOptimizer {
    fn name(&self) -> &'static str {
        "spsa"
    }

    fn rank(&mut self, task: &Task, candidates: usize) -> Vec<usize> {
        SpsaOptimizer::rank(self, task, candidates)
            .into_iter()
            .map(|(i, _)| i)
            .collect()
    }

    fn observe(&mut self, record: OutcomeRecord) -> Option<UpdateOutcome> {
        self.record_outcome(record)
    }

    fn parameters(&self) -> Option<&[f64]> {
        Some(SpsaOptimizer::parameters(self))
    }

    fn set_parameters(&mut self, theta: Vec<f64>) {
        SpsaOptimizer::set_parameters(self, theta)
    }
}

/// Cycles through executors regardless of outcomes.
#[derive(Debug, Clone, Default)]
pub struct RoundRobinSelector {
    next: usize,
}

impl RoundRobinSelector {
    /// Create a selector starting at the first executor.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutorSelector for RoundRobinSelector {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn rank(&mut self, _task: &Task, candidates: usize) -> Vec<usize> {
        if candidates == 0 {
            return Vec::new();
        }
        let start = self.next % candidates;
        self.next = (start + 1) % candidates;
        (0..candidates).map(|i| (start + i) % candidates).collect()
    }

    fn observe(&mut self, _record: OutcomeRecord) -> Option<UpdateOutcome> {
        None
    }

    fn parameters(&self) -> Option<&[f64]> {
        None
    }

    fn set_parameters(&mut self, _theta: Vec<f64>) {}
}

/// Selector strategies available.
#[derive(Debug)]
pub enum SelectorStrategy {
    /// Learned SPSA policy
    Spsa(SpsaOptimizer),
    /// Fixed rotation
    RoundRobin(RoundRobinSelector),
}

impl ExecutorSelector for SelectorStrategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Spsa(s) => s.name(),
            Self::RoundRobin(s) => s.name(),
        }
    }

    fn rank(&mut self, task: &Task, candidates: usize) -> Vec<usize> {
        match self {
            Self::Spsa(s) => ExecutorSelector::rank(s, task, candidates),
            Self::RoundRobin(s) => s.rank(task, candidates),
        }
    }

    fn observe(&mut self, record: OutcomeRecord) -> Option<UpdateOutcome> {
        match self {
            Self::Spsa(s) => s.observe(record),
            Self::RoundRobin(s) => s.observe(record),
        }
    }

    fn parameters(&self) -> Option<&[f64]> {
        match self {
            Self::Spsa(s) => ExecutorSelector::parameters(s),
            Self::RoundRobin(s) => s.parameters(),
        }
    }

    fn set_parameters(&mut self, theta: Vec<f64>) {
        match self {
            Self::Spsa(s) => ExecutorSelector::set_parameters(s, theta),
            Self::RoundRobin(s) => s.set_parameters(theta),
        }
    }
}

/// Which strategy a deployment's brokers use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// [`SelectorStrategy::Spsa`]
    #[default]
    Spsa,
    /// [`SelectorStrategy::RoundRobin`]
    RoundRobin,
}

impl std::fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spsa => write!(f, "SPSA"),
            Self::RoundRobin => write!(f, "Round Robin"),
        }
    }
}
