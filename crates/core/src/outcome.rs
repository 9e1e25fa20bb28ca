//! Execution results and the outcome records the learner consumes.

use serde::{Deserialize, Serialize};
use crate::id::{ExecutorId, TaskId};
use crate::task::Task;
use crate::Time;

/// Answer of an executor when a task is offered to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    /// The executor takes the task
    Accepted,
    /// The executor refuses the task
    Rejected(String),
}

impl Admission {
    /// Whether the task was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Human-readable reason.
    pub fn reason(&self) -> &str {
        match self {
            Self::Accepted => "Task accepted",
            Self::Rejected(reason) => reason,
        }
    }
}

/// What an executor reports after running a task.
///
/// Failures are reported here with `success: false`; they are never raised
/// as errors so that they reach the learner as ordinary loss signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Task that ran
    pub task_id: TaskId,

    /// Executor that ran it
    pub executor_id: ExecutorId,

    /// Whether it succeeded
    pub success: bool,

    /// Execution time in seconds
    pub duration_secs: f64,

    /// Tokens (or other work units) produced
    pub units: u64,

    /// Estimated cost
    pub cost_estimate: f64,
}

impl ExecutionReport {
    /// Report a failed execution that produced nothing.
    pub fn failed(task_id: TaskId, executor_id: ExecutorId, duration_secs: f64) -> Self {
        Self {
            task_id,
            executor_id,
            success: false,
            duration_secs,
            units: 0,
            cost_estimate: 0.0,
        }
    }
}

/// A completed task as remembered by a broker's learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Snapshot of the task
    pub task: Task,

    /// Executor that ran it
    pub executor: ExecutorId,

    /// Whether it succeeded
    pub success: bool,

    /// Wall-clock time the broker spent on the task (seconds)
    pub duration: f64,

    /// Execution time reported by the executor (seconds)
    pub execution_time: f64,

    /// When the outcome was recorded
    pub recorded_at: Time,
}

impl OutcomeRecord {
    /// Build a record from an execution report.
    pub fn from_report(task: Task, report: &ExecutionReport, duration: f64) -> Self {
        Self {
            task,
            executor: report.executor_id.clone(),
            success: report.success,
            duration,
            execution_time: report.duration_secs,
            recorded_at: chrono::Utc::now(),
        }
    }

    /// Per-record loss: `execution_time / 5 + (0 if success else 1)`.
    pub fn loss(&self) -> f64 {
        let failure = if self.success { 0.0 } else { 1.0 };
        self.execution_time / 5.0 + failure
    }
}
