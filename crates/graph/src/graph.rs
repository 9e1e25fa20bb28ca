//! Broker connectivity graph.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use swarm_core::{BrokerId, GraphConfig, GraphMutation, GraphStats, MutationKind};
use tracing::{debug, error};

use crate::error::{GraphError, Result};
use crate::stats::count_components;

/// Result of one maintenance tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Structural change attempted this tick, if any
    pub mutation: Option<GraphMutation>,
    /// Statistics after the tick
    pub stats: GraphStats,
}

/// Undirected, weighted broker adjacency with degree bounds.
///
/// Weights are stored once per undirected edge under the ordered key
/// `(min, max)`, so `weight(i, j) == weight(j, i)` holds structurally and a
/// weight can only exist for a live edge.
#[derive(Debug, Clone)]
pub struct ConnectivityGraph {
    pub(crate) neighbors: Vec<Vec<BrokerId>>,
    pub(crate) weights: BTreeMap<(usize, usize), f64>,
    pub(crate) config: GraphConfig,
    pub(crate) rng: StdRng,
    pub(crate) under_connected: Vec<BrokerId>,
}

fn key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl ConnectivityGraph {
    /// Build a random graph over `num_brokers` brokers.
    ///
    /// Each pair is connected with probability `edge_probability` (never
    /// pushing a node past `max_neighbors`), under-connected nodes are
    /// repaired toward `min_neighbors`, and every edge gets weight
    /// `2 / (deg(i) + deg(j))`.
    pub fn new(num_brokers: usize, config: GraphConfig, seed: Option<u64>) -> Result<Self> {
        check_bounds(num_brokers, &config)?;

        let mut graph = Self::empty(num_brokers, config, seed);
        let p = graph.config.edge_probability;
        let max = graph.config.max_neighbors;
        for i in 0..num_brokers {
            for j in (i + 1)..num_brokers {
                if graph.rng.gen_bool(p) && graph.degree_of(i) < max && graph.degree_of(j) < max {
                    graph.add_edge(i, j, 0.0);
                }
            }
        }

        graph.repair();
        graph.initialize_weights();
        graph.validate()?;

        debug!(
            brokers = num_brokers,
            edges = graph.edge_count(),
            "connectivity graph constructed"
        );
        Ok(graph)
    }

    /// Build a graph with a fixed edge list and degree-normalized weights.
    ///
    /// No repair is performed; nodes below `min_neighbors` are reported by
    /// [`under_connected`](Self::under_connected).
    pub fn from_edges(
        num_brokers: usize,
        edges: &[(usize, usize)],
        config: GraphConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        check_probabilities(&config)?;
        if config.min_neighbors > config.max_neighbors {
            return Err(GraphError::Unsatisfiable {
                min_neighbors: config.min_neighbors,
                max_neighbors: config.max_neighbors,
                num_brokers,
            });
        }

        let mut graph = Self::empty(num_brokers, config, seed);
        for &(a, b) in edges {
            if a >= num_brokers || b >= num_brokers {
                return Err(GraphError::Inconsistent(format!(
                    "edge ({a}, {b}) references a broker outside 0..{num_brokers}"
                )));
            }
            if a == b {
                return Err(GraphError::Inconsistent(format!("self-loop on broker_{a}")));
            }
            if graph.has_edge_idx(a, b) {
                return Err(GraphError::Inconsistent(format!("duplicate edge ({a}, {b})")));
            }
            graph.add_edge(a, b, 0.0);
        }

        graph.initialize_weights();
        graph.refresh_under_connected();
        graph.validate()?;
        Ok(graph)
    }

    fn empty(num_brokers: usize, config: GraphConfig, seed: Option<u64>) -> Self {
        Self {
            neighbors: vec![Vec::new(); num_brokers],
            weights: BTreeMap::new(),
            config,
            rng: seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy),
            under_connected: Vec::new(),
        }
    }

    /// Number of brokers.
    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.weights.len()
    }

    /// Graph parameters.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Neighbors of `broker`, in the order the edges were created.
    pub fn neighbors(&self, broker: BrokerId) -> &[BrokerId] {
        self.neighbors.get(broker.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Degree of `broker` (0 for unknown brokers).
    pub fn degree(&self, broker: BrokerId) -> usize {
        self.degree_of(broker.index())
    }

    /// Weight of edge `(a, b)`; 0 when there is no such edge.
    pub fn weight(&self, a: BrokerId, b: BrokerId) -> f64 {
        self.weights.get(&key(a.index(), b.index())).copied().unwrap_or(0.0)
    }

    /// Whether `a` and `b` are adjacent.
    pub fn has_edge(&self, a: BrokerId, b: BrokerId) -> bool {
        self.has_edge_idx(a.index(), b.index())
    }

    /// Every edge once, as `(low, high, weight)`.
    pub fn edges(&self) -> impl Iterator<Item = (BrokerId, BrokerId, f64)> + '_ {
        self.weights.iter().map(|(&(a, b), &w)| (BrokerId(a), BrokerId(b), w))
    }

    /// Brokers left below `min_neighbors` because no assignment was found.
    pub fn under_connected(&self) -> &[BrokerId] {
        &self.under_connected
    }

    /// Current statistics.
    pub fn stats(&self) -> GraphStats {
        let nodes = self.node_count();
        let edges = self.edge_count();
        let average_degree = if nodes > 0 {
            2.0 * edges as f64 / nodes as f64
        } else {
            0.0
        };
        let density = if nodes > 1 {
            edges as f64 / (nodes as f64 * (nodes as f64 - 1.0) / 2.0)
        } else {
            0.0
        };
        GraphStats {
            nodes,
            edges,
            average_degree,
            density,
            components: count_components(nodes, self.weights.keys().copied()),
            max_degree: self.neighbors.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    /// Periodic maintenance: decay every weight, then with probability
    /// `mutation_probability` add, remove or reweight one random edge.
    pub fn tick(&mut self) -> Result<TickReport> {
        let decay = self.config.weight_decay;
        for weight in self.weights.values_mut() {
            *weight *= decay;
        }

        let mutation = if self.rng.gen_bool(self.config.mutation_probability) {
            Some(self.mutate())
        } else {
            None
        };

        if let Err(e) = self.validate() {
            error!("graph inconsistent after tick: {}", e);
            return Err(e);
        }

        Ok(TickReport {
            mutation,
            stats: self.stats(),
        })
    }

    fn mutate(&mut self) -> GraphMutation {
        let kinds = [MutationKind::AddEdge, MutationKind::RemoveEdge, MutationKind::Reweight];
        let kind = kinds[self.rng.gen_range(0..kinds.len())];
        let applied = match kind {
            MutationKind::AddEdge => self.add_random_edge(),
            MutationKind::RemoveEdge => self.remove_random_edge(),
            MutationKind::Reweight => self.reweight_random_edge(),
        };
        applied.unwrap_or(GraphMutation::Skipped { kind })
    }

    fn add_random_edge(&mut self) -> Option<GraphMutation> {
        let max = self.config.max_neighbors;
        let n = self.node_count();
        let mut candidates = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if !self.has_edge_idx(i, j) && self.degree_of(i) < max && self.degree_of(j) < max {
                    candidates.push((i, j));
                }
            }
        }
        let &(a, b) = candidates.choose(&mut self.rng)?;
        let weight = self.draw_weight();
        self.add_edge(a, b, weight);
        Some(GraphMutation::EdgeAdded {
            a: BrokerId(a),
            b: BrokerId(b),
            weight,
        })
    }

    fn remove_random_edge(&mut self) -> Option<GraphMutation> {
        let min = self.config.min_neighbors;
        let candidates: Vec<(usize, usize)> = self
            .weights
            .keys()
            .copied()
            .filter(|&(a, b)| self.degree_of(a) > min && self.degree_of(b) > min)
            .collect();
        let &(a, b) = candidates.choose(&mut self.rng)?;
        self.remove_edge(a, b);
        Some(GraphMutation::EdgeRemoved {
            a: BrokerId(a),
            b: BrokerId(b),
        })
    }

    fn reweight_random_edge(&mut self) -> Option<GraphMutation> {
        let edges: Vec<(usize, usize)> = self.weights.keys().copied().collect();
        let &(a, b) = edges.choose(&mut self.rng)?;
        let weight = self.draw_weight();
        self.weights.insert((a, b), weight);
        Some(GraphMutation::EdgeReweighted {
            a: BrokerId(a),
            b: BrokerId(b),
            weight,
        })
    }

    fn draw_weight(&mut self) -> f64 {
        let (lo, hi) = (self.config.reweight_min, self.config.reweight_max);
        if hi > lo && lo.is_finite() && hi.is_finite() {
            self.rng.gen_range(lo..=hi)
        } else if lo.is_finite() {
            lo
        } else {
            0.0
        }
    }

    /// `b_ij = 2 / (deg(i) + deg(j))`, or 0 if both degrees are zero.
    fn initialize_weights(&mut self) {
        let degrees: Vec<usize> = self.neighbors.iter().map(Vec::len).collect();
        for (&(a, b), weight) in self.weights.iter_mut() {
            let total = degrees[a] + degrees[b];
            *weight = if total > 0 { 2.0 / total as f64 } else { 0.0 };
        }
    }

    pub(crate) fn degree_of(&self, index: usize) -> usize {
        self.neighbors.get(index).map_or(0, Vec::len)
    }

    pub(crate) fn has_edge_idx(&self, a: usize, b: usize) -> bool {
        self.weights.contains_key(&key(a, b))
    }

    pub(crate) fn add_edge(&mut self, a: usize, b: usize, weight: f64) {
        if a == b || self.has_edge_idx(a, b) {
            return;
        }
        self.neighbors[a].push(BrokerId(b));
        self.neighbors[b].push(BrokerId(a));
        self.weights.insert(key(a, b), weight);
    }

    /// Removes the edge and its weight together.
    pub(crate) fn remove_edge(&mut self, a: usize, b: usize) {
        if self.weights.remove(&key(a, b)).is_none() {
            return;
        }
        self.neighbors[a].retain(|n| n.index() != b);
        self.neighbors[b].retain(|n| n.index() != a);
    }

    pub(crate) fn refresh_under_connected(&mut self) {
        let min = self.config.min_neighbors;
        self.under_connected = (0..self.node_count())
            .filter(|&i| self.degree_of(i) < min)
            .map(BrokerId)
            .collect();
    }

    /// Check adjacency/weight consistency and the degree ceiling.
    pub fn validate(&self) -> Result<()> {
        let n = self.node_count();
        let max = self.config.max_neighbors;
        let mut half_edges = 0usize;

        for (i, list) in self.neighbors.iter().enumerate() {
            if list.len() > max {
                return Err(GraphError::Inconsistent(format!(
                    "broker_{i} has degree {} above max_neighbors {max}",
                    list.len()
                )));
            }
            for (pos, &j) in list.iter().enumerate() {
                let j = j.index();
                if j >= n {
                    return Err(GraphError::Inconsistent(format!("broker_{i} lists unknown neighbor {j}")));
                }
                if j == i {
                    return Err(GraphError::Inconsistent(format!("self-loop on broker_{i}")));
                }
                if list[..pos].iter().any(|k| k.index() == j) {
                    return Err(GraphError::Inconsistent(format!("broker_{i} lists broker_{j} twice")));
                }
                if !self.neighbors[j].iter().any(|k| k.index() == i) {
                    return Err(GraphError::Inconsistent(format!("edge {i}->{j} is not symmetric")));
                }
                if !self.weights.contains_key(&key(i, j)) {
                    return Err(GraphError::Inconsistent(format!("edge ({i}, {j}) has no weight")));
                }
                half_edges += 1;
            }
        }

        if half_edges != 2 * self.weights.len() {
            return Err(GraphError::Inconsistent(format!(
                "{} weights stored for {} edges",
                self.weights.len(),
                half_edges / 2
            )));
        }
        if let Some((&(a, b), w)) = self.weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(GraphError::Inconsistent(format!("edge ({a}, {b}) has weight {w}")));
        }
        Ok(())
    }
}

impl std::fmt::Display for ConnectivityGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== BROKER CONNECTIVITY GRAPH ===")?;
        for i in 0..self.node_count() {
            let id = BrokerId(i);
            let rendered: Vec<String> = self
                .neighbors(id)
                .iter()
                .map(|&j| format!("{}({:.2})", j.index(), self.weight(id, j)))
                .collect();
            if rendered.is_empty() {
                writeln!(f, "{id}: no neighbors")?;
            } else {
                writeln!(f, "{id}: {}", rendered.join(", "))?;
            }
        }
        let stats = self.stats();
        write!(
            f,
            "Stats: {} edges, density {:.2}, average degree {:.2}",
            stats.edges, stats.density, stats.average_degree
        )
    }
}

/// Reject degree bounds no graph over `num_brokers` nodes can satisfy.
fn check_bounds(num_brokers: usize, config: &GraphConfig) -> Result<()> {
    check_probabilities(config)?;
    let impossible = config.min_neighbors > config.max_neighbors
        || (num_brokers >= 2 && config.min_neighbors > num_brokers - 1);
    if impossible {
        return Err(GraphError::Unsatisfiable {
            min_neighbors: config.min_neighbors,
            max_neighbors: config.max_neighbors,
            num_brokers,
        });
    }
    Ok(())
}

fn check_probabilities(config: &GraphConfig) -> Result<()> {
    for (name, p) in [
        ("edge_probability", config.edge_probability),
        ("mutation_probability", config.mutation_probability),
    ] {
        if !(0.0..=1.0).contains(&p) {
            return Err(GraphError::InvalidConfig(format!("{name} must lie in [0, 1], got {p}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GraphConfig {
        GraphConfig::default()
    }

    fn assert_symmetric(graph: &ConnectivityGraph) {
        for i in 0..graph.node_count() {
            for &j in graph.neighbors(BrokerId(i)) {
                assert_eq!(graph.weight(BrokerId(i), j), graph.weight(j, BrokerId(i)));
                assert!(graph.neighbors(j).contains(&BrokerId(i)));
            }
        }
    }

    #[test]
    fn test_repair_only_graph_is_two_regular() {
        let config = config().with_edge_probability(0.0).with_degree_bounds(2, 5);
        for seed in 0..50 {
            let graph = ConnectivityGraph::new(5, config.clone(), Some(seed)).unwrap();
            for i in 0..5 {
                assert_eq!(graph.degree(BrokerId(i)), 2, "seed {seed}, broker {i}");
            }
            assert_eq!(graph.edge_count(), 5);
            assert!(graph.under_connected().is_empty());
        }
    }

    #[test]
    fn test_degree_bounds_after_construction() {
        for n in 3..16 {
            for seed in 0..10 {
                let graph = ConnectivityGraph::new(n, config(), Some(seed * 31 + n as u64)).unwrap();
                graph.validate().unwrap();
                for i in 0..n {
                    let id = BrokerId(i);
                    assert!(graph.degree(id) <= 5);
                    assert!(graph.degree(id) >= 2 || graph.under_connected().contains(&id));
                }
            }
        }
    }

    #[test]
    fn test_dense_initial_graph_respects_max_degree() {
        let config = config().with_edge_probability(1.0).with_degree_bounds(2, 4);
        let graph = ConnectivityGraph::new(20, config, Some(3)).unwrap();
        assert!(graph.stats().max_degree <= 4);
        graph.validate().unwrap();
    }

    #[test]
    fn test_initial_weights_are_degree_normalized() {
        // path 0-1-2 plus pendant 3 on 1: deg = [1, 3, 1, 1]
        let graph = ConnectivityGraph::from_edges(4, &[(0, 1), (1, 2), (1, 3)], config(), Some(1)).unwrap();
        assert_eq!(graph.weight(BrokerId(0), BrokerId(1)), 0.5);
        assert_eq!(graph.weight(BrokerId(1), BrokerId(0)), 0.5);
        assert_eq!(graph.weight(BrokerId(0), BrokerId(2)), 0.0);
        assert_symmetric(&graph);
        assert_eq!(graph.under_connected(), &[BrokerId(0), BrokerId(2), BrokerId(3)]);
    }

    #[test]
    fn test_from_edges_rejects_bad_input() {
        assert!(ConnectivityGraph::from_edges(3, &[(0, 3)], config(), None).is_err());
        assert!(ConnectivityGraph::from_edges(3, &[(1, 1)], config(), None).is_err());
        assert!(ConnectivityGraph::from_edges(3, &[(0, 1), (1, 0)], config(), None).is_err());
        let tight = config().with_degree_bounds(0, 1);
        assert!(ConnectivityGraph::from_edges(3, &[(0, 1), (0, 2)], tight, None).is_err());
    }

    #[test]
    fn test_unsatisfiable_bounds_are_fatal() {
        let err = ConnectivityGraph::new(3, config().with_degree_bounds(3, 5), Some(1)).unwrap_err();
        assert!(matches!(err, GraphError::Unsatisfiable { num_brokers: 3, .. }));
        assert!(ConnectivityGraph::new(5, config().with_degree_bounds(4, 3), Some(1)).is_err());
        // a lone broker needs no neighbors
        let single = ConnectivityGraph::new(1, config(), Some(1)).unwrap();
        assert_eq!(single.edge_count(), 0);
    }

    #[test]
    fn test_probabilities_are_checked() {
        let err = ConnectivityGraph::new(4, config().with_edge_probability(1.5), Some(1)).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfig(_)));
        let mut bad = config();
        bad.mutation_probability = f64::NAN;
        assert!(ConnectivityGraph::from_edges(2, &[(0, 1)], bad, None).is_err());
    }

    #[test]
    fn test_tick_decays_weights() {
        let mut config = config();
        config.mutation_probability = 0.0;
        let mut graph = ConnectivityGraph::from_edges(3, &[(0, 1), (1, 2), (0, 2)], config, Some(1)).unwrap();
        let report = graph.tick().unwrap();
        assert!(report.mutation.is_none());
        assert!((graph.weight(BrokerId(0), BrokerId(1)) - 0.5 * 0.95).abs() < 1e-12);
        assert_eq!(report.stats.edges, 3);
    }

    #[test]
    fn test_invariants_hold_under_mutation() {
        let mut config = config();
        config.mutation_probability = 1.0;
        for seed in 0..8 {
            let mut graph = ConnectivityGraph::new(10, config.clone(), Some(seed)).unwrap();
            let min_before: Vec<usize> = (0..10).map(|i| graph.degree(BrokerId(i))).collect();
            for _ in 0..300 {
                let report = graph.tick().unwrap();
                assert!(report.mutation.is_some());
                assert_symmetric(&graph);
                for i in 0..10 {
                    let degree = graph.degree(BrokerId(i));
                    assert!(degree <= 5);
                    // removals never push a node below the minimum
                    assert!(degree >= 2.min(min_before[i]));
                }
                assert_eq!(report.stats.edges, graph.edge_count());
            }
        }
    }

    #[test]
    fn test_reweight_stays_in_range() {
        let mut config = config();
        config.mutation_probability = 1.0;
        config.weight_decay = 1.0;
        let mut graph = ConnectivityGraph::from_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0)], config, Some(5)).unwrap();
        for _ in 0..200 {
            if let Some(GraphMutation::EdgeReweighted { weight, .. } | GraphMutation::EdgeAdded { weight, .. }) =
                graph.tick().unwrap().mutation
            {
                assert!((0.1..=1.0).contains(&weight));
            }
        }
    }

    #[test]
    fn test_infinite_reweight_bound_falls_back() {
        let mut config = config();
        config.mutation_probability = 1.0;
        config.weight_decay = 1.0;
        config.reweight_max = f64::INFINITY;
        let mut graph = ConnectivityGraph::from_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0)], config, Some(9)).unwrap();
        for _ in 0..100 {
            if let Some(GraphMutation::EdgeReweighted { weight, .. } | GraphMutation::EdgeAdded { weight, .. }) =
                graph.tick().unwrap().mutation
            {
                assert_eq!(weight, 0.1);
            }
        }
    }

    #[test]
    fn test_remove_edge_drops_weight() {
        let mut graph = ConnectivityGraph::from_edges(3, &[(0, 1), (1, 2)], config(), Some(1)).unwrap();
        graph.remove_edge(1, 0);
        assert!(!graph.has_edge(BrokerId(0), BrokerId(1)));
        assert_eq!(graph.weight(BrokerId(0), BrokerId(1)), 0.0);
        assert_eq!(graph.edge_count(), 1);
        graph.validate().unwrap();
    }

    #[test]
    fn test_stats() {
        let graph = ConnectivityGraph::from_edges(5, &[(0, 1), (1, 2), (0, 2), (3, 4)], config(), Some(1)).unwrap();
        let stats = graph.stats();
        assert_eq!(stats.nodes, 5);
        assert_eq!(stats.edges, 4);
        assert!((stats.average_degree - 1.6).abs() < 1e-12);
        assert!((stats.density - 0.4).abs() < 1e-12);
        assert_eq!(stats.components, 2);
        assert_eq!(stats.max_degree, 2);
    }

    #[test]
    fn test_display_lists_every_broker() {
        let graph = ConnectivityGraph::from_edges(3, &[(0, 1)], config(), Some(1)).unwrap();
        let rendered = graph.to_string();
        assert!(rendered.contains("broker_0: 1(1.00)"));
        assert!(rendered.contains("broker_2: no neighbors"));
        assert!(rendered.contains("Stats: 1 edges"));
    }
}
