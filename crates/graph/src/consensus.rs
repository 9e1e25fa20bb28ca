//! Neighbor consensus over broker parameters.
//!
//! ```text
//! θ_i ← θ_i + γ · Σ_{j ∈ N(i)} b_ij · (θ_j − θ_i)
//! ```
//!
//! All corrections are computed from a snapshot taken before any write, so
//! the result does not depend on participant order.

use std::collections::HashMap;

use swarm_core::BrokerId;
use tracing::debug;

use crate::graph::ConnectivityGraph;

/// Anything holding a parameter vector that takes part in consensus.
pub trait Participant {
    /// Graph node of this participant.
    fn participant_id(&self) -> BrokerId;

    /// Current parameters, or `None` if it has no learnable policy.
    fn parameters(&self) -> Option<&[f64]>;

    /// Overwrite the parameters.
    fn set_parameters(&mut self, theta: Vec<f64>);
}

/// Summary of one consensus round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsensusReport {
    /// Participants whose parameters were rewritten
    pub participants: usize,
    /// Largest L2 norm of a single correction
    pub max_correction: f64,
    /// Disagreement before the round
    pub disagreement_before: f64,
    /// Disagreement after the round
    pub disagreement_after: f64,
}

impl ConnectivityGraph {
    /// Apply one consensus round with step `gamma`.
    ///
    /// Participants without parameters are skipped, and neighbors whose
    /// vector has a different length contribute nothing.
    pub fn consensus_update<P: Participant>(&self, participants: &mut [P], gamma: f64) -> ConsensusReport {
        let snapshot: HashMap<BrokerId, Vec<f64>> = participants
            .iter()
            .filter_map(|p| p.parameters().map(|theta| (p.participant_id(), theta.to_vec())))
            .collect();
        let disagreement_before = disagreement(participants);

        let mut updates: Vec<(usize, Vec<f64>, f64)> = Vec::new();
        for (pos, participant) in participants.iter().enumerate() {
            let id = participant.participant_id();
            let Some(own) = snapshot.get(&id) else {
                continue;
            };
            let neighbors = self.neighbors(id);
            if neighbors.is_empty() {
                continue;
            }

            let mut correction = vec![0.0; own.len()];
            for &j in neighbors {
                let Some(other) = snapshot.get(&j) else {
                    continue;
                };
                if other.len() != own.len() {
                    continue;
                }
                let w = self.weight(id, j);
                for ((c, t_j), t_i) in correction.iter_mut().zip(other).zip(own) {
                    *c += w * (t_j - t_i);
                }
            }

            let theta: Vec<f64> = own.iter().zip(&correction).map(|(t, c)| t + gamma * c).collect();
            let norm = correction.iter().map(|c| (gamma * c).powi(2)).sum::<f64>().sqrt();
            updates.push((pos, theta, norm));
        }

        let mut report = ConsensusReport {
            participants: updates.len(),
            disagreement_before,
            ..Default::default()
        };
        for (pos, theta, norm) in updates {
            participants[pos].set_parameters(theta);
            report.max_correction = report.max_correction.max(norm);
        }
        report.disagreement_after = disagreement(participants);

        debug!(
            participants = report.participants,
            max_correction = report.max_correction,
            disagreement = report.disagreement_after,
            "consensus round applied"
        );
        report
    }
}

/// Sum of squared distances from the mean parameter vector.
///
/// Only participants whose dimension matches the first one with parameters
/// are counted.
pub fn disagreement<P: Participant>(participants: &[P]) -> f64 {
    let vectors: Vec<&[f64]> = participants.iter().filter_map(Participant::parameters).collect();
    let Some(dim) = vectors.first().map(|v| v.len()) else {
        return 0.0;
    };
    let vectors: Vec<&[f64]> = vectors.into_iter().filter(|v| v.len() == dim).collect();
    let n = vectors.len() as f64;

    let mut mean = vec![0.0; dim];
    for v in &vectors {
        for (m, x) in mean.iter_mut().zip(v.iter()) {
            *m += x / n;
        }
    }
    vectors
        .iter()
        .map(|v| v.iter().zip(&mean).map(|(x, m)| (x - m).powi(2)).sum::<f64>())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::GraphConfig;

    struct Node {
        id: BrokerId,
        theta: Option<Vec<f64>>,
    }

    impl Participant for Node {
        fn participant_id(&self) -> BrokerId {
            self.id
        }

        fn parameters(&self) -> Option<&[f64]> {
            self.theta.as_deref()
        }

        fn set_parameters(&mut self, theta: Vec<f64>) {
            self.theta = Some(theta);
        }
    }

    fn node(id: usize, theta: &[f64]) -> Node {
        Node {
            id: BrokerId(id),
            theta: Some(theta.to_vec()),
        }
    }

    fn ring(n: usize) -> ConnectivityGraph {
        let edges: Vec<(usize, usize)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        ConnectivityGraph::from_edges(n, &edges, GraphConfig::default(), Some(1)).unwrap()
    }

    fn spread_nodes(n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| node(i, &[i as f64, (n - i) as f64 * 0.5, if i % 2 == 0 { 1.0 } else { -1.0 }]))
            .collect()
    }

    #[test]
    fn test_disagreement_strictly_decreases() {
        let graph = ring(6);
        let mut nodes = spread_nodes(6);
        let mut previous = disagreement(&nodes);
        assert!(previous > 0.0);
        for _ in 0..50 {
            let report = graph.consensus_update(&mut nodes, 0.02);
            assert_eq!(report.participants, 6);
            assert!(report.disagreement_after < previous);
            previous = report.disagreement_after;
        }
    }

    #[test]
    fn test_symmetric_weights_preserve_mean() {
        let graph = ring(5);
        let mut nodes = spread_nodes(5);
        let sum_before: f64 = nodes.iter().map(|n| n.theta.as_ref().unwrap()[0]).sum();
        graph.consensus_update(&mut nodes, 0.02);
        let sum_after: f64 = nodes.iter().map(|n| n.theta.as_ref().unwrap()[0]).sum();
        assert!((sum_before - sum_after).abs() < 1e-9);
    }

    #[test]
    fn test_single_step_values() {
        // path 0-1: both degree 1, weight 1
        let graph = ConnectivityGraph::from_edges(2, &[(0, 1)], GraphConfig::default(), Some(1)).unwrap();
        let mut nodes = vec![node(0, &[0.0]), node(1, &[1.0])];
        let report = graph.consensus_update(&mut nodes, 0.1);
        assert!((nodes[0].theta.as_ref().unwrap()[0] - 0.1).abs() < 1e-12);
        assert!((nodes[1].theta.as_ref().unwrap()[0] - 0.9).abs() < 1e-12);
        assert!((report.max_correction - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_order_independent() {
        let graph = ring(4);
        let mut forward = spread_nodes(4);
        let mut backward = spread_nodes(4);
        backward.reverse();
        graph.consensus_update(&mut forward, 0.05);
        graph.consensus_update(&mut backward, 0.05);
        backward.reverse();
        for (a, b) in forward.iter().zip(&backward) {
            assert_eq!(a.theta, b.theta);
        }
    }

    #[test]
    fn test_participants_without_parameters_are_skipped() {
        let graph = ring(3);
        let mut nodes = vec![
            node(0, &[1.0, 1.0]),
            Node {
                id: BrokerId(1),
                theta: None,
            },
            node(2, &[3.0, 3.0]),
        ];
        let report = graph.consensus_update(&mut nodes, 0.1);
        assert_eq!(report.participants, 2);
        assert!(nodes[1].theta.is_none());
        // 0 and 2 are adjacent on the ring: weight 0.5
        assert_eq!(nodes[0].theta.as_deref(), Some(&[1.1, 1.1][..]));
    }

    #[test]
    fn test_mismatched_dimension_contributes_nothing() {
        let graph = ring(3);
        let mut nodes = vec![node(0, &[1.0, 1.0]), node(1, &[5.0]), node(2, &[1.0, 1.0])];
        graph.consensus_update(&mut nodes, 0.1);
        assert_eq!(nodes[0].theta.as_deref(), Some(&[1.0, 1.0][..]));
        assert_eq!(nodes[1].theta.as_deref(), Some(&[5.0][..]));
    }

    #[test]
    fn test_isolated_participant_unchanged() {
        let graph = ConnectivityGraph::from_edges(3, &[(0, 1)], GraphConfig::default(), Some(1)).unwrap();
        let mut nodes = spread_nodes(3);
        let before = nodes[2].theta.clone();
        let report = graph.consensus_update(&mut nodes, 0.1);
        assert_eq!(nodes[2].theta, before);
        assert_eq!(report.participants, 2);
    }
}
