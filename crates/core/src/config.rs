//! Configuration for the optimizer, the load balancer and the broker graph.
//!
//! Every section is `#[serde(default)]`, so a JSON document only needs the
//! keys it wants to override:
//!
//! ```json
//! { "spsa": { "alpha": 0.02 }, "graph": { "max_neighbors": 4 } }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of its valid range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// SPSA learner parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpsaConfig {
    /// Learning rate (alpha)
    pub alpha: f64,
    /// Perturbation size (beta)
    pub beta: f64,
    /// Consensus coefficient
    pub gamma_consensus: f64,
    /// Number of outcomes between parameter updates (W)
    pub update_frequency: usize,
    /// Parameters are clipped to `[-theta_bound, theta_bound]` after each update
    pub theta_bound: f64,
    /// Initial parameters are drawn from `[-init_range, init_range]`
    pub init_range: f64,
    /// History capacity as a multiple of `update_frequency`
    pub history_windows: usize,
    /// Amplitude of the exploration jitter added to scores
    pub jitter: f64,
}

impl Default for SpsaConfig {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            beta: 0.1,
            gamma_consensus: 0.02,
            update_frequency: 10,
            theta_bound: 2.0,
            init_range: 0.5,
            history_windows: 4,
            jitter: 0.1,
        }
    }
}

impl SpsaConfig {
    /// Set the update window.
    pub fn with_update_frequency(mut self, window: usize) -> Self {
        self.update_frequency = window;
        self
    }

    /// Set the exploration jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Maximum number of outcomes retained by a broker.
    pub fn history_capacity(&self) -> usize {
        self.update_frequency.max(1).saturating_mul(self.history_windows.max(1))
    }
}

/// Load Vector Protocol coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LvpConfig {
    /// Neighbor interaction coefficient
    pub h: f64,
    /// Local damping coefficient
    pub gamma: f64,
    /// Fraction of the adjustment applied per balancing tick
    pub step: f64,
}

impl Default for LvpConfig {
    fn default() -> Self {
        Self {
            h: 0.1,
            gamma: 0.05,
            step: 0.1,
        }
    }
}

/// Broker connectivity graph parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Probability of each initial edge
    pub edge_probability: f64,
    /// Minimum neighbors per broker (best effort)
    pub min_neighbors: usize,
    /// Maximum neighbors per broker
    pub max_neighbors: usize,
    /// Multiplicative weight decay per tick
    pub weight_decay: f64,
    /// Probability that a tick performs a structural mutation
    pub mutation_probability: f64,
    /// Lower bound for randomly drawn weights
    pub reweight_min: f64,
    /// Upper bound for randomly drawn weights
    pub reweight_max: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            edge_probability: 0.3,
            min_neighbors: 2,
            max_neighbors: 5,
            weight_decay: 0.95,
            mutation_probability: 0.1,
            reweight_min: 0.1,
            reweight_max: 1.0,
        }
    }
}

impl GraphConfig {
    /// Set the initial edge probability.
    pub fn with_edge_probability(mut self, p: f64) -> Self {
        self.edge_probability = p;
        self
    }

    /// Set the degree bounds.
    pub fn with_degree_bounds(mut self, min_neighbors: usize, max_neighbors: usize) -> Self {
        self.min_neighbors = min_neighbors;
        self.max_neighbors = max_neighbors;
        self
    }
}

/// Sizing and cadence of a whole deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Number of brokers
    pub num_brokers: usize,
    /// Number of executors in the shared pool
    pub num_executors: usize,
    /// Concurrent task capacity of each executor
    pub executor_capacity: usize,
    /// Tasks between two maintenance rounds (tick, consensus, balancing)
    pub maintenance_interval: usize,
    /// Seed for every random source; `None` uses entropy
    pub seed: Option<u64>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_brokers: 3,
            num_executors: 4,
            executor_capacity: 10,
            maintenance_interval: 10,
            seed: None,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// SPSA learner
    pub spsa: SpsaConfig,
    /// Load balancing
    pub lvp: LvpConfig,
    /// Connectivity graph
    pub graph: GraphConfig,
    /// Deployment sizing
    pub system: SystemConfig,
}

impl SwarmConfig {
    /// Load and validate configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON rendering.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path.as_ref(), self.to_json_pretty()?)?;
        Ok(())
    }

    /// Derive a component seed from the system seed.
    ///
    /// Returns `None` when the deployment is unseeded.
    pub fn component_seed(&self, salt: u64) -> Option<u64> {
        self.system
            .seed
            .map(|seed| seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let spsa = &self.spsa;
        non_negative("spsa.alpha", spsa.alpha)?;
        non_negative("spsa.gamma_consensus", spsa.gamma_consensus)?;
        non_negative("spsa.init_range", spsa.init_range)?;
        non_negative("spsa.jitter", spsa.jitter)?;
        if !(spsa.beta.is_finite() && spsa.beta > 0.0) {
            return Err(invalid(format!("spsa.beta must be > 0, got {}", spsa.beta)));
        }
        if !(spsa.theta_bound.is_finite() && spsa.theta_bound > 0.0) {
            return Err(invalid(format!("spsa.theta_bound must be > 0, got {}", spsa.theta_bound)));
        }
        if spsa.update_frequency == 0 {
            return Err(invalid("spsa.update_frequency must be at least 1"));
        }

        non_negative("lvp.h", self.lvp.h)?;
        non_negative("lvp.gamma", self.lvp.gamma)?;
        non_negative("lvp.step", self.lvp.step)?;

        let graph = &self.graph;
        probability("graph.edge_probability", graph.edge_probability)?;
        probability("graph.mutation_probability", graph.mutation_probability)?;
        probability("graph.weight_decay", graph.weight_decay)?;
        non_negative("graph.reweight_min", graph.reweight_min)?;
        non_negative("graph.reweight_max", graph.reweight_max)?;
        if graph.reweight_min > graph.reweight_max {
            return Err(invalid(format!(
                "graph.reweight_min ({}) exceeds graph.reweight_max ({})",
                graph.reweight_min, graph.reweight_max
            )));
        }
        if graph.min_neighbors > graph.max_neighbors {
            return Err(invalid(format!(
                "graph.min_neighbors ({}) exceeds graph.max_neighbors ({})",
                graph.min_neighbors, graph.max_neighbors
            )));
        }

        if self.system.maintenance_interval == 0 {
            return Err(invalid("system.maintenance_interval must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite and non-negative, got {value}")))
    }
}

fn probability(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must lie in [0, 1], got {value}")))
    }
}
