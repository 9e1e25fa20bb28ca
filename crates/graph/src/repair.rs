//! Minimum-degree repair.
//!
//! Runs after random construction, in three passes:
//!
//! 1. connect under-connected brokers to each other;
//! 2. degree-preserving edge switches: break an edge `(u, v)` elsewhere in
//!    the graph and reattach both ends to under-connected brokers, which
//!    leaves `u` and `v` at their degree while the deficient side gains;
//! 3. connect what is still short to any broker below `max_neighbors`.
//!
//! Brokers still short after pass 3 are recorded as under-connected.

use rand::seq::SliceRandom;
use tracing::warn;

use crate::graph::ConnectivityGraph;

impl ConnectivityGraph {
    pub(crate) fn repair(&mut self) {
        let n = self.node_count();
        let min = self.config.min_neighbors;

        for i in 0..n {
            while self.degree_of(i) < min {
                let candidates: Vec<usize> = (0..n)
                    .filter(|&j| j != i && !self.has_edge_idx(i, j) && self.degree_of(j) < min)
                    .collect();
                match candidates.choose(&mut self.rng) {
                    Some(&j) => self.add_edge(i, j, 0.0),
                    None => break,
                }
            }
        }

        self.switch_edges();

        let max = self.config.max_neighbors;
        for i in 0..n {
            while self.degree_of(i) < min {
                let candidates: Vec<usize> = (0..n)
                    .filter(|&j| j != i && !self.has_edge_idx(i, j) && self.degree_of(j) < max)
                    .collect();
                match candidates.choose(&mut self.rng) {
                    Some(&j) => self.add_edge(i, j, 0.0),
                    None => break,
                }
            }
        }

        self.refresh_under_connected();
        if !self.under_connected.is_empty() {
            warn!(
                brokers = ?self.under_connected,
                min_neighbors = min,
                "could not reach minimum degree for every broker"
            );
        }
    }

    fn switch_edges(&mut self) {
        let n = self.node_count();
        let min = self.config.min_neighbors;

        loop {
            let deficient: Vec<usize> = (0..n).filter(|&i| self.degree_of(i) < min).collect();
            if deficient.is_empty() {
                return;
            }

            let mut progressed = false;
            for &i in &deficient {
                if self.degree_of(i) >= min {
                    continue;
                }
                if min - self.degree_of(i) >= 2 && self.switch_single(i) {
                    progressed = true;
                    continue;
                }
                for &k in &deficient {
                    if k == i || self.degree_of(k) >= min || self.degree_of(i) >= min {
                        continue;
                    }
                    if !self.has_edge_idx(i, k) {
                        self.add_edge(i, k, 0.0);
                        progressed = true;
                    } else if self.switch_pair(i, k) {
                        progressed = true;
                    }
                }
            }

            // every step closes two units of deficit, so this terminates
            if !progressed {
                return;
            }
        }
    }

    /// Replace some `(u, v)` with `(i, u)` and `(i, v)`.
    fn switch_single(&mut self, i: usize) -> bool {
        let candidates: Vec<(usize, usize)> = self
            .weights
            .keys()
            .copied()
            .filter(|&(u, v)| u != i && v != i && !self.has_edge_idx(i, u) && !self.has_edge_idx(i, v))
            .collect();
        let Some(&(u, v)) = candidates.choose(&mut self.rng) else {
            return false;
        };
        self.remove_edge(u, v);
        self.add_edge(i, u, 0.0);
        self.add_edge(i, v, 0.0);
        true
    }

    /// Replace some `(u, v)` with `(i, u)` and `(k, v)`.
    fn switch_pair(&mut self, i: usize, k: usize) -> bool {
        let fits = |g: &Self, u: usize, v: usize| {
            u != i && v != k && !g.has_edge_idx(i, u) && !g.has_edge_idx(k, v)
        };
        let candidates: Vec<(usize, usize)> = self
            .weights
            .keys()
            .flat_map(|&(a, b)| [(a, b), (b, a)])
            .filter(|&(u, v)| fits(self, u, v))
            .collect();
        let Some(&(u, v)) = candidates.choose(&mut self.rng) else {
            return false;
        };
        self.remove_edge(u, v);
        self.add_edge(i, u, 0.0);
        self.add_edge(k, v, 0.0);
        true
    }
}
