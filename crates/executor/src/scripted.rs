//! Deterministic executor replaying fixed answers.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use swarm_core::{Admission, ExecutionReport, ExecutorHandle, ExecutorId, Task};

/// One scripted execution result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedStep {
    /// Whether the run succeeds
    pub success: bool,
    /// Reported execution time
    pub execution_time: f64,
}

impl ScriptedStep {
    /// A successful run.
    pub fn success(execution_time: f64) -> Self {
        Self {
            success: true,
            execution_time,
        }
    }

    /// A failed run.
    pub fn failure(execution_time: f64) -> Self {
        Self {
            success: false,
            execution_time,
        }
    }
}

/// Executor that cycles through scripted admissions and results.
///
/// With no admissions scripted every offer is accepted; with no steps every
/// run succeeds in one second.
pub struct ScriptedExecutor {
    id: ExecutorId,
    capacity: usize,
    admissions: Vec<bool>,
    steps: Vec<ScriptedStep>,
    offers: AtomicUsize,
    runs: AtomicUsize,
}

impl ScriptedExecutor {
    /// Create an executor accepting everything.
    pub fn new(id: ExecutorId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            admissions: Vec::new(),
            steps: Vec::new(),
            offers: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }

    /// Answers to successive offers, repeated cyclically.
    pub fn with_admissions(mut self, admissions: Vec<bool>) -> Self {
        self.admissions = admissions;
        self
    }

    /// Results of successive runs, repeated cyclically.
    pub fn with_steps(mut self, steps: Vec<ScriptedStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Offers received so far.
    pub fn offers(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    /// Runs performed so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutorHandle for ScriptedExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn current_load(&self) -> usize {
        0
    }

    async fn accept(&self, _task: &Task) -> Admission {
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        if self.admissions.is_empty() || self.admissions[n % self.admissions.len()] {
            Admission::Accepted
        } else {
            Admission::Rejected("scripted refusal".to_string())
        }
    }

    async fn execute(&self, task: &Task) -> ExecutionReport {
        let n = self.runs.fetch_add(1, Ordering::SeqCst);
        let step = if self.steps.is_empty() {
            ScriptedStep::success(1.0)
        } else {
            self.steps[n % self.steps.len()]
        };
        ExecutionReport {
            task_id: task.id,
            executor_id: self.id.clone(),
            success: step.success,
            duration_secs: step.execution_time,
            units: 0,
            cost_estimate: 0.0,
        }
    }
}
