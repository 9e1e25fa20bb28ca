//! Bounded outcome history.

use std::collections::VecDeque;
use swarm_core::OutcomeRecord;

const PREALLOCATED: usize = 1024;

/// Fixed-capacity ring buffer of outcome records.
///
/// Keeps a running count of everything ever recorded so update cadence is
/// independent of how much is retained.
#[derive(Debug, Clone)]
pub struct OutcomeHistory {
    records: VecDeque<OutcomeRecord>,
    capacity: usize,
    total_recorded: usize,
}

impl OutcomeHistory {
    /// Create a history retaining at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(PREALLOCATED)),
            capacity,
            total_recorded: 0,
        }
    }

    /// Append a record, evicting the oldest when full.
    pub fn push(&mut self, record: OutcomeRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.total_recorded += 1;
    }

    /// Records currently retained.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Retention limit.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records ever pushed.
    pub fn total_recorded(&self) -> usize {
        self.total_recorded
    }

    /// The most recent `size` records, oldest first. `None` if fewer are
    /// retained.
    pub fn window(&self, size: usize) -> Option<impl Iterator<Item = &OutcomeRecord>> {
        if size == 0 || self.records.len() < size {
            return None;
        }
        Some(self.records.iter().skip(self.records.len() - size))
    }

    /// Statistics of the most recent `size` records.
    pub fn window_stats(&self, size: usize) -> Option<WindowStats> {
        self.window(size).map(WindowStats::from_records)
    }

    /// Iterate over every retained record, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &OutcomeRecord> {
        self.records.iter()
    }
}

/// Summary of an outcome window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStats {
    /// Records in the window
    pub samples: usize,
    /// Mean executor-reported execution time
    pub mean_execution_time: f64,
    /// Fraction of failed records
    pub failure_rate: f64,
    /// Mean of `execution_time/5 + (0 if success else 1)`
    pub observed_loss: f64,
}

impl WindowStats {
    /// Summarize records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OutcomeRecord>) -> Self {
        let mut samples = 0usize;
        let mut time = 0.0;
        let mut failures = 0usize;
        let mut loss = 0.0;
        for record in records {
            samples += 1;
            time += record.execution_time;
            loss += record.loss();
            if !record.success {
                failures += 1;
            }
        }
        if samples == 0 {
            return Self::default();
        }
        let n = samples as f64;
        Self {
            samples,
            mean_execution_time: time / n,
            failure_rate: failures as f64 / n,
            observed_loss: loss / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{ExecutionReport, ExecutorId, Task};

    fn record(success: bool, execution_time: f64) -> OutcomeRecord {
        let task = Task::new("task");
        let report = ExecutionReport {
            task_id: task.id,
            executor_id: ExecutorId::new("executor_0"),
            success,
            duration_secs: execution_time,
            units: 0,
            cost_estimate: 0.0,
        };
        OutcomeRecord::from_report(task, &report, 0.0)
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut history = OutcomeHistory::with_capacity(3);
        for t in 1..=5 {
            history.push(record(true, t as f64));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.total_recorded(), 5);
        let times: Vec<f64> = history.iter().map(|r| r.execution_time).collect();
        assert_eq!(times, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_large_capacity_allocates_lazily() {
        let mut history = OutcomeHistory::with_capacity(usize::MAX);
        assert_eq!(history.capacity(), usize::MAX);
        assert!(history.records.capacity() < 4 * PREALLOCATED);
        history.push(record(true, 1.0));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_window_requires_enough_records() {
        let mut history = OutcomeHistory::with_capacity(10);
        history.push(record(true, 1.0));
        assert!(history.window(2).is_none());
        assert!(history.window(0).is_none());
        history.push(record(false, 2.0));
        assert_eq!(history.window(2).map(|w| w.count()), Some(2));
    }

    #[test]
    fn test_window_stats() {
        let mut history = OutcomeHistory::with_capacity(10);
        history.push(record(true, 10.0));
        history.push(record(true, 1.0));
        history.push(record(false, 3.0));

        let stats = history.window_stats(2).unwrap();
        assert_eq!(stats.samples, 2);
        assert!((stats.mean_execution_time - 2.0).abs() < 1e-12);
        assert!((stats.failure_rate - 0.5).abs() < 1e-12);
        // (0.2 + 0) and (0.6 + 1)
        assert!((stats.observed_loss - 0.9).abs() < 1e-12);
    }
}
