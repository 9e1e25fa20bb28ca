//! Loss models evaluated at perturbed parameter vectors.
//!
//! SPSA never replays recorded outcomes at the perturbed points; it asks a
//! [`LossModel`] what the loss would be there. The recorded window only
//! supplies statistics the model may use.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::history::WindowStats;

/// Stochastic loss evaluated at a parameter vector.
pub trait LossModel: Send {
    /// Loss at `theta`, given statistics of the recent outcome window.
    fn evaluate(&mut self, theta: &[f64], window: &WindowStats) -> f64;
}

impl<F> LossModel for F
where
    F: FnMut(&[f64], &WindowStats) -> f64 + Send,
{
    fn evaluate(&mut self, theta: &[f64], window: &WindowStats) -> f64 {
        self(theta, window)
    }
}

fn squared_norm(theta: &[f64]) -> f64 {
    theta.iter().map(|t| t * t).sum()
}

/// Quadratic penalty plus uniform noise: `scale·‖θ‖² + U(0, noise)`.
///
/// Ignores the outcome window; it stands in until real cost feedback is
/// wired up.
#[derive(Debug, Clone)]
pub struct QuadraticSurrogate {
    scale: f64,
    noise: f64,
    rng: StdRng,
}

impl QuadraticSurrogate {
    /// Surrogate with scale 0.1 and noise 0.1.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            scale: 0.1,
            noise: 0.1,
            rng: seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy),
        }
    }

    /// Set the penalty scale.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set the noise amplitude (0 makes the surrogate deterministic).
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(0.0);
        self
    }
}

impl LossModel for QuadraticSurrogate {
    fn evaluate(&mut self, theta: &[f64], _window: &WindowStats) -> f64 {
        let noise = if self.noise > 0.0 {
            self.rng.gen_range(0.0..self.noise)
        } else {
            0.0
        };
        squared_norm(theta) * self.scale + noise
    }
}

/// Observed window loss plus an L2 penalty: `observed + scale·‖θ‖²`.
///
/// Deterministic; the observed term is constant across the two
/// perturbations, so only the penalty drives the gradient while the window
/// shifts the reported level.
#[derive(Debug, Clone, Copy)]
pub struct ObservedCost {
    scale: f64,
}

impl ObservedCost {
    /// Create with the given penalty scale.
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl Default for ObservedCost {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl LossModel for ObservedCost {
    fn evaluate(&mut self, theta: &[f64], window: &WindowStats) -> f64 {
        window.observed_loss + self.scale * squared_norm(theta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surrogate_bounds() {
        let mut model = QuadraticSurrogate::new(Some(3));
        let window = WindowStats::default();
        for _ in 0..100 {
            let loss = model.evaluate(&[1.0, -2.0], &window);
            assert!((0.5..0.6).contains(&loss));
        }
    }

    #[test]
    fn test_surrogate_without_noise_is_deterministic() {
        let mut model = QuadraticSurrogate::new(None).with_noise(0.0).with_scale(1.0);
        let window = WindowStats::default();
        assert_eq!(model.evaluate(&[3.0, 4.0], &window), 25.0);
    }

    #[test]
    fn test_observed_cost_uses_window() {
        let mut model = ObservedCost::default();
        let window = WindowStats {
            samples: 10,
            mean_execution_time: 2.0,
            failure_rate: 0.1,
            observed_loss: 0.5,
        };
        assert!((model.evaluate(&[1.0, 1.0], &window) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_closure_is_a_loss_model() {
        let mut calls = 0usize;
        let mut model = |theta: &[f64], _: &WindowStats| {
            calls += 1;
            theta.iter().sum::<f64>()
        };
        assert_eq!(LossModel::evaluate(&mut model, &[1.0, 2.0], &WindowStats::default()), 3.0);
        drop(model);
        assert_eq!(calls, 1);
    }
}
