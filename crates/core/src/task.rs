//! Task model - the unit of work routed through the broker mesh.

use serde::{Deserialize, Serialize};
use crate::id::TaskId;
use crate::Time;

/// Priority and complexity assumed when a caller does not set them.
pub const DEFAULT_LEVEL: f64 = 5.0;

/// A unit of work offered to a broker.
///
/// The core only reads `priority`, `complexity` and `payload_length`; the
/// payload itself is opaque and handed to executors untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Prompt / payload handed to the executor
    pub prompt: String,

    /// Priority, conventionally 0-10
    pub priority: f64,

    /// Complexity, conventionally 0-10
    pub complexity: f64,

    /// Payload length signal (characters of the prompt unless overridden)
    pub payload_length: usize,

    /// Classification label
    pub kind: TaskKind,

    /// Creation timestamp
    pub created_at: Time,
}

impl Task {
    /// Create a new task with default priority and complexity.
    pub fn new(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        Self {
            id: TaskId::new(),
            payload_length: prompt.chars().count(),
            prompt,
            priority: DEFAULT_LEVEL,
            complexity: DEFAULT_LEVEL,
            kind: TaskKind::General,
            created_at: chrono::Utc::now(),
        }
    }

    /// Set priority. Negative or non-finite values are coerced.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = sanitize_level(priority);
        self
    }

    /// Set complexity. Negative or non-finite values are coerced.
    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = sanitize_level(complexity);
        self
    }

    /// Override the payload length signal.
    pub fn with_payload_length(mut self, payload_length: usize) -> Self {
        self.payload_length = payload_length;
        self
    }

    /// Set the classification label.
    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Keep priority/complexity finite and non-negative.
fn sanitize_level(value: f64) -> f64 {
    if !value.is_finite() {
        DEFAULT_LEVEL
    } else {
        value.max(0.0)
    }
}

/// Coarse classification label of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Mathematical problem
    Math,
    /// Code generation
    Code,
    /// Data analysis
    Analysis,
    /// Creative writing
    Creative,
    /// Explanation of a concept
    Explanation,
    /// Performance optimization
    Optimization,
    /// Research
    Research,
    /// Planning
    Planning,
    /// Anything else
    #[default]
    General,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Math => "math",
            Self::Code => "code",
            Self::Analysis => "analysis",
            Self::Creative => "creative",
            Self::Explanation => "explanation",
            Self::Optimization => "optimization",
            Self::Research => "research",
            Self::Planning => "planning",
            Self::General => "general",
        };
        f.write_str(name)
    }
}
