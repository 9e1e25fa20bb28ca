//! Task → numeric feature vector.

use rand::Rng;
use swarm_core::Task;

/// Feature vector consumed by the scorer; one component per parameter.
pub type FeatureVector = Vec<f64>;

/// Number of components derived from the task itself.
pub const TASK_SIGNALS: usize = 3;

/// How components beyond the task signals are filled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FillerPolicy {
    /// Zeros; scoring is a pure function of the task
    #[default]
    Zero,
    /// Uniform noise in `[-amplitude, amplitude]`, drawn from the caller's
    /// generator on every call
    Noise {
        /// Half-width of the noise interval
        amplitude: f64,
    },
}

/// Turns a task into a fixed-length feature vector.
///
/// Components 0-2 are `priority/10`, `complexity/10` and
/// `min(payload_length/1000, 1)`, each clamped to `[0, 1]`. When the
/// dimension is smaller than three the leading signals are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureExtractor {
    dimension: usize,
    filler: FillerPolicy,
}

impl FeatureExtractor {
    /// Create an extractor producing `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            filler: FillerPolicy::Zero,
        }
    }

    /// Set the filler policy.
    pub fn with_filler(mut self, filler: FillerPolicy) -> Self {
        self.filler = filler;
        self
    }

    /// Output length.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The deterministic task signals.
    pub fn task_signals(task: &Task) -> [f64; TASK_SIGNALS] {
        [
            (task.priority / 10.0).clamp(0.0, 1.0),
            (task.complexity / 10.0).clamp(0.0, 1.0),
            (task.payload_length as f64 / 1000.0).min(1.0),
        ]
    }

    /// Extract features for `task`.
    pub fn extract<R: Rng + ?Sized>(&self, task: &Task, rng: &mut R) -> FeatureVector {
        let signals = Self::task_signals(task);
        let mut features = vec![0.0; self.dimension];
        for (slot, signal) in features.iter_mut().zip(signals) {
            *slot = signal;
        }

        if let FillerPolicy::Noise { amplitude } = self.filler {
            if amplitude > 0.0 {
                for slot in features.iter_mut().skip(TASK_SIGNALS) {
                    *slot = rng.gen_range(-amplitude..=amplitude);
                }
            }
        }

        features
    }
}
