//! Learning layer - per-broker SPSA policy and LVP load correction.

#![warn(missing_docs, unused_crate_dependencies)]

mod features;
mod history;
mod loss;
mod lvp;
mod spsa;

pub use features::{FeatureExtractor, FeatureVector, FillerPolicy, TASK_SIGNALS};
pub use history::{OutcomeHistory, WindowStats};
pub use loss::{LossModel, QuadraticSurrogate, ObservedCost};
pub use lvp::LoadBalancer;
pub use spsa::{SpsaOptimizer, UpdateOutcome, UpdateReport};
