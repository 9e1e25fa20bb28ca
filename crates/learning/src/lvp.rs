//! Load Vector Protocol: local load correction toward the neighborhood mean.

use swarm_core::LvpConfig;

/// Nudges a broker's load estimate toward its neighbors' average.
///
/// ```text
/// diff       = self − mean(neighbors)
/// adjustment = −(h + γ)·diff
/// new        = max(0, self + step·adjustment)
/// ```
///
/// Call once per balancing tick, not per task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadBalancer {
    h: f64,
    gamma: f64,
    step: f64,
}

impl LoadBalancer {
    /// Create from explicit coefficients.
    pub fn new(h: f64, gamma: f64, step: f64) -> Self {
        Self { h, gamma, step }
    }

    /// Neighbor interaction coefficient.
    pub fn h(&self) -> f64 {
        self.h
    }

    /// Local damping coefficient.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Corrected load for a broker.
    pub fn correct(&self, self_load: f64, neighbor_loads: &[f64]) -> f64 {
        if neighbor_loads.is_empty() {
            return self_load;
        }
        let avg = neighbor_loads.iter().sum::<f64>() / neighbor_loads.len() as f64;
        let diff = self_load - avg;
        let adjustment = -(self.h + self.gamma) * diff;
        (self_load + self.step * adjustment).max(0.0)
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::from(&LvpConfig::default())
    }
}

impl From<&LvpConfig> for LoadBalancer {
    fn from(config: &LvpConfig) -> Self {
        Self::new(config.h, config.gamma, config.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_neighbors_keeps_load() {
        let lb = LoadBalancer::default();
        assert_eq!(lb.correct(3.5, &[]), 3.5);
    }

    #[test]
    fn test_moves_toward_neighborhood_average() {
        let lb = LoadBalancer::default();
        // diff = 2, adjustment = -0.3, new = 4 - 0.03
        assert!((lb.correct(4.0, &[1.0, 3.0]) - 3.97).abs() < 1e-12);
        // below average: pulled up
        assert!(lb.correct(1.0, &[5.0]) > 1.0);
        // at average: unchanged
        assert_eq!(lb.correct(2.0, &[2.0, 2.0]), 2.0);
    }

    #[test]
    fn test_never_negative() {
        let lb = LoadBalancer::new(50.0, 50.0, 1.0);
        let loads = [0.0, 0.5, 1.0, 10.0, 1e6];
        for &own in &loads {
            for &other in &loads {
                assert!(lb.correct(own, &[other]) >= 0.0);
                assert!(lb.correct(own, &[other, 0.0, 3.0]) >= 0.0);
            }
        }
        assert!(LoadBalancer::default().correct(0.0, &[0.0]) >= 0.0);
    }

    #[test]
    fn test_repeated_balancing_converges_pairwise() {
        let lb = LoadBalancer::default();
        let (mut a, mut b) = (10.0, 0.0);
        for _ in 0..2000 {
            let (na, nb) = (lb.correct(a, &[b]), lb.correct(b, &[a]));
            a = na;
            b = nb;
        }
        assert!((a - b).abs() < 1e-6);
    }
}
