//! Synthetic workloads.

use clap::ValueEnum;
use swarm_core::{Task, TaskKind};

/// Prompt, kind, base priority, base complexity.
const TEMPLATES: [(&str, TaskKind, f64, f64); 8] = [
    ("Solve mathematical equation", TaskKind::Math, 5.0, 6.0),
    ("Write Python code", TaskKind::Code, 6.0, 7.0),
    ("Analyze data trends", TaskKind::Analysis, 7.0, 8.0),
    ("Create creative content", TaskKind::Creative, 4.0, 5.0),
    ("Explain technical concept", TaskKind::Explanation, 5.0, 6.0),
    ("Optimize system performance", TaskKind::Optimization, 8.0, 9.0),
    ("Research topic", TaskKind::Research, 6.0, 7.0),
    ("Plan project timeline", TaskKind::Planning, 5.0, 6.0),
];

/// Named workload sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkloadSize {
    /// 10 tasks
    Small,
    /// 25 tasks
    Medium,
    /// 50 tasks
    Large,
}

impl WorkloadSize {
    pub fn task_count(self) -> usize {
        match self {
            Self::Small => 10,
            Self::Medium => 25,
            Self::Large => 50,
        }
    }
}

/// `count` tasks cycling through the templates, with priority and
/// complexity varied by -1, 0, +1.
pub fn generate(count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| {
            let (prompt, kind, priority, complexity) = TEMPLATES[i % TEMPLATES.len()];
            let shift = (i % 3) as f64 - 1.0;
            Task::new(format!("{prompt} #{}", i + 1))
                .with_kind(kind)
                .with_priority(priority + shift)
                .with_complexity(complexity + shift)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(generate(WorkloadSize::Small.task_count()).len(), 10);
        assert_eq!(generate(WorkloadSize::Large.task_count()).len(), 50);
    }

    #[test]
    fn test_template_variation() {
        let tasks = generate(9);
        assert_eq!(tasks[0].prompt, "Solve mathematical equation #1");
        assert_eq!(tasks[0].priority, 4.0);
        assert_eq!(tasks[1].complexity, 7.0);
        assert_eq!(tasks[2].priority, 8.0);
        assert_eq!(tasks[8].kind, TaskKind::Math);
        assert_eq!(tasks[8].complexity, 7.0);
    }
}
