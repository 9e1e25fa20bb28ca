//! Per-broker SPSA learner.
//!
//! Scores executors with a linear policy `score = features · θ + jitter` and
//! improves `θ` with two-point simultaneous perturbation stochastic
//! approximation every `update_frequency` outcomes:
//!
//! ```text
//! δ ~ {−1, +1}^D
//! ĝ = (L(θ + βδ) − L(θ − βδ)) / (2β) · δ
//! θ ← clip(θ − α·ĝ, −bound, bound)
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use swarm_core::{BrokerId, OutcomeRecord, SpsaConfig, SwarmError, Task};
use tracing::{debug, warn};

use crate::features::{FeatureExtractor, FeatureVector, FillerPolicy};
use crate::history::{OutcomeHistory, WindowStats};
use crate::loss::{LossModel, QuadraticSurrogate};

/// Result of a completed SPSA step.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    /// Parameters after the step
    pub theta: Vec<f64>,
    /// Perturbation signs
    pub delta: Vec<f64>,
    /// Approximated gradient
    pub gradient: Vec<f64>,
    /// Loss at `θ + βδ`
    pub loss_plus: f64,
    /// Loss at `θ − βδ`
    pub loss_minus: f64,
    /// Statistics of the window that triggered the step
    pub window: WindowStats,
    /// Ordinal of this step (1-based)
    pub update: usize,
}

/// What `update()` did.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Parameters were updated
    Applied(UpdateReport),
    /// Fewer than `update_frequency` outcomes recorded; nothing changed
    InsufficientHistory {
        /// Records retained
        have: usize,
        /// Records required
        need: usize,
    },
    /// The loss model returned a non-finite value; nothing changed
    NonFiniteLoss {
        /// Loss at `θ + βδ`
        loss_plus: f64,
        /// Loss at `θ − βδ`
        loss_minus: f64,
    },
}

impl UpdateOutcome {
    /// The report, if the step was applied.
    pub fn applied(self) -> Option<UpdateReport> {
        match self {
            Self::Applied(report) => Some(report),
            _ => None,
        }
    }
}

/// SPSA learner owned by one broker.
pub struct SpsaOptimizer {
    owner: BrokerId,
    theta: Vec<f64>,
    config: SpsaConfig,
    extractor: FeatureExtractor,
    history: OutcomeHistory,
    loss: Box<dyn LossModel>,
    rng: StdRng,
    updates: usize,
}

impl SpsaOptimizer {
    /// Create a learner with `dimension` parameters drawn uniformly from
    /// `[-init_range, init_range]`.
    pub fn new(owner: BrokerId, dimension: usize, config: SpsaConfig, seed: Option<u64>) -> Self {
        let mut rng = seeded(seed);
        let range = config.init_range;
        let theta = (0..dimension)
            .map(|_| if range > 0.0 && range.is_finite() { rng.gen_range(-range..=range) } else { 0.0 })
            .collect();
        Self::build(owner, theta, config, rng)
    }

    /// Create a learner starting from explicit parameters.
    pub fn with_parameters(owner: BrokerId, theta: Vec<f64>, config: SpsaConfig, seed: Option<u64>) -> Self {
        Self::build(owner, theta, config, seeded(seed))
    }

    fn build(owner: BrokerId, theta: Vec<f64>, config: SpsaConfig, mut rng: StdRng) -> Self {
        let loss_seed = rng.gen();
        Self {
            owner,
            extractor: FeatureExtractor::new(theta.len()),
            history: OutcomeHistory::with_capacity(config.history_capacity()),
            loss: Box::new(QuadraticSurrogate::new(Some(loss_seed))),
            theta,
            config,
            rng,
            updates: 0,
        }
    }

    /// Replace the loss model.
    pub fn with_loss_model(mut self, loss: Box<dyn LossModel>) -> Self {
        self.loss = loss;
        self
    }

    /// Set how feature components beyond the task signals are filled.
    pub fn with_filler(mut self, filler: FillerPolicy) -> Self {
        self.extractor = self.extractor.with_filler(filler);
        self
    }

    /// Broker owning this learner.
    pub fn owner(&self) -> BrokerId {
        self.owner
    }

    /// Current parameters.
    pub fn parameters(&self) -> &[f64] {
        &self.theta
    }

    /// Overwrite the parameters (consensus step). Not clipped.
    pub fn set_parameters(&mut self, theta: Vec<f64>) {
        if theta.len() != self.theta.len() {
            warn!(
                broker = %self.owner,
                expected = self.theta.len(),
                actual = theta.len(),
                "ignoring parameter vector of wrong dimension"
            );
            return;
        }
        self.theta = theta;
    }

    /// Parameter dimension.
    pub fn dimension(&self) -> usize {
        self.theta.len()
    }

    /// Configuration in use.
    pub fn config(&self) -> &SpsaConfig {
        &self.config
    }

    /// Outcome history.
    pub fn history(&self) -> &OutcomeHistory {
        &self.history
    }

    /// Number of applied SPSA steps.
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Extract features for `task`.
    pub fn features(&mut self, task: &Task) -> FeatureVector {
        self.extractor.extract(task, &mut self.rng)
    }

    /// Jitter-free score: `features · θ`.
    pub fn base_score(&self, features: &[f64]) -> f64 {
        features.iter().zip(&self.theta).map(|(f, t)| f * t).sum()
    }

    /// Score with exploration jitter in `[-jitter, jitter]`.
    pub fn score(&mut self, features: &[f64]) -> f64 {
        let base = self.base_score(features);
        let jitter = self.config.jitter;
        if jitter > 0.0 && jitter.is_finite() {
            base + self.rng.gen_range(-jitter..=jitter)
        } else {
            base
        }
    }

    /// Score `candidates` candidates for `task`, each with a freshly
    /// extracted feature vector. Returns `(index, score)` best first; ties
    /// keep presentation order.
    pub fn rank(&mut self, task: &Task, candidates: usize) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = (0..candidates)
            .map(|i| {
                let features = self.features(task);
                (i, self.score(&features))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }

    /// Pick the best-scoring candidate.
    pub fn select_executor<'a, E>(&mut self, task: &Task, candidates: &'a [E]) -> Result<&'a E, SwarmError> {
        let ranking = self.rank(task, candidates.len());
        ranking
            .first()
            .and_then(|(i, _)| candidates.get(*i))
            .ok_or(SwarmError::NoExecutorAvailable { broker: self.owner })
    }

    /// Remember an outcome; runs `update()` whenever the number of outcomes
    /// recorded reaches a multiple of `update_frequency`.
    pub fn record_outcome(&mut self, record: OutcomeRecord) -> Option<UpdateOutcome> {
        self.history.push(record);
        let window = self.config.update_frequency.max(1);
        if self.history.total_recorded() % window == 0 {
            Some(self.update())
        } else {
            None
        }
    }

    /// One SPSA step over the most recent window.
    pub fn update(&mut self) -> UpdateOutcome {
        let need = self.config.update_frequency.max(1);
        let Some(window) = self.history.window_stats(need) else {
            debug!(broker = %self.owner, have = self.history.len(), need, "not enough history for update");
            return UpdateOutcome::InsufficientHistory {
                have: self.history.len(),
                need,
            };
        };

        let beta = self.config.beta;
        let delta: Vec<f64> = (0..self.theta.len())
            .map(|_| if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 })
            .collect();
        let theta_plus: Vec<f64> = self.theta.iter().zip(&delta).map(|(t, d)| t + beta * d).collect();
        let theta_minus: Vec<f64> = self.theta.iter().zip(&delta).map(|(t, d)| t - beta * d).collect();

        let loss_plus = self.loss.evaluate(&theta_plus, &window);
        let loss_minus = self.loss.evaluate(&theta_minus, &window);
        let scale = (loss_plus - loss_minus) / (2.0 * beta);
        if !scale.is_finite() {
            warn!(broker = %self.owner, loss_plus, loss_minus, "non-finite loss, skipping update");
            return UpdateOutcome::NonFiniteLoss { loss_plus, loss_minus };
        }

        // 1/δ_i = δ_i for δ_i ∈ {−1, +1}
        let gradient: Vec<f64> = delta.iter().map(|d| scale * d).collect();
        let bound = self.config.theta_bound;
        let alpha = self.config.alpha;
        for (t, g) in self.theta.iter_mut().zip(&gradient) {
            *t = (*t - alpha * g).clamp(-bound, bound);
        }
        self.updates += 1;

        debug!(
            broker = %self.owner,
            update = self.updates,
            loss_plus,
            loss_minus,
            observed_loss = window.observed_loss,
            "spsa step applied"
        );

        UpdateOutcome::Applied(UpdateReport {
            theta: self.theta.clone(),
            delta,
            gradient,
            loss_plus,
            loss_minus,
            window,
            update: self.updates,
        })
    }
}

impl std::fmt::Debug for SpsaOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpsaOptimizer")
            .field("owner", &self.owner)
            .field("theta", &self.theta)
            .field("history", &self.history.len())
            .field("updates", &self.updates)
            .finish()
    }
}

fn seeded(seed: Option<u64>) -> StdRng {
    seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::ObservedCost;
    use swarm_core::{ExecutionReport, ExecutorId};

    fn record(success: bool, execution_time: f64) -> OutcomeRecord {
        let task = Task::new("task").with_priority(6.0).with_complexity(4.0);
        let report = ExecutionReport {
            task_id: task.id,
            executor_id: ExecutorId::new("executor_0"),
            success,
            duration_secs: execution_time,
            units: 0,
            cost_estimate: 0.0,
        };
        OutcomeRecord::from_report(task, &report, 0.0)
    }

    fn mixed_window() -> Vec<OutcomeRecord> {
        (0..10)
            .map(|i| record(i % 3 != 0, 0.5 + 0.25 * i as f64))
            .collect()
    }

    fn norm(v: &[f64]) -> f64 {
        v.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    #[test]
    fn test_initial_parameters_in_range() {
        let opt = SpsaOptimizer::new(BrokerId(0), 8, SpsaConfig::default(), Some(11));
        assert_eq!(opt.dimension(), 8);
        assert!(opt.parameters().iter().all(|t| (-0.5..=0.5).contains(t)));
    }

    #[test]
    fn test_base_score_is_reproducible() {
        let mut opt = SpsaOptimizer::with_parameters(
            BrokerId(0),
            vec![0.5, -1.0, 2.0, 0.25],
            SpsaConfig::default(),
            Some(1),
        );
        let features = vec![0.7, 0.6, 0.25, 0.0];
        let expected = 0.7 * 0.5 - 0.6 + 0.25 * 2.0;
        assert_eq!(opt.base_score(&features), expected);
        assert_eq!(opt.base_score(&features), opt.base_score(&features));

        for _ in 0..50 {
            let score = opt.score(&features);
            assert!((score - expected).abs() <= 0.1 + 1e-12);
        }
    }

    #[test]
    fn test_zero_filler_features_are_deterministic() {
        let mut opt = SpsaOptimizer::new(BrokerId(0), 4, SpsaConfig::default(), Some(5));
        let task = Task::new("Solve the equation").with_priority(7.0).with_complexity(6.0);
        assert_eq!(opt.features(&task), opt.features(&task));
    }

    #[test]
    fn test_select_on_empty_candidates_fails() {
        let mut opt = SpsaOptimizer::new(BrokerId(4), 0, SpsaConfig::default(), Some(1));
        let candidates: Vec<&str> = Vec::new();
        let err = opt.select_executor(&Task::new("x"), &candidates).unwrap_err();
        assert!(matches!(err, SwarmError::NoExecutorAvailable { broker } if broker == BrokerId(4)));
    }

    #[test]
    fn test_ties_keep_presentation_order() {
        let config = SpsaConfig::default().with_jitter(0.0);
        let mut opt = SpsaOptimizer::with_parameters(BrokerId(0), vec![0.1; 4], config, Some(1));
        let candidates = ["a", "b", "c", "d"];
        let task = Task::new("x");
        assert_eq!(*opt.select_executor(&task, &candidates).unwrap(), "a");
        let ranking: Vec<usize> = opt.rank(&task, 4).into_iter().map(|(i, _)| i).collect();
        assert_eq!(ranking, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_select_returns_a_candidate() {
        let mut opt = SpsaOptimizer::new(BrokerId(0), 4, SpsaConfig::default(), Some(21));
        let candidates = ["e0", "e1", "e2", "e3"];
        for _ in 0..20 {
            let chosen = opt.select_executor(&Task::new("x"), &candidates).unwrap();
            assert!(candidates.contains(chosen));
        }
    }

    #[test]
    fn test_update_is_noop_below_window() {
        for window in [1usize, 10, 100] {
            let config = SpsaConfig::default().with_update_frequency(window);
            let mut opt = SpsaOptimizer::new(BrokerId(0), 4, config, Some(window as u64));
            for _ in 0..window - 1 {
                opt.history.push(record(true, 1.0));
            }
            let before = opt.parameters().to_vec();
            let outcome = opt.update();
            assert_eq!(
                outcome,
                UpdateOutcome::InsufficientHistory { have: window - 1, need: window }
            );
            assert_eq!(opt.parameters(), before.as_slice());
            assert_eq!(opt.updates(), 0);
        }
    }

    #[test]
    fn test_exact_window_triggers_one_update() {
        let mut opt = SpsaOptimizer::with_parameters(
            BrokerId(0),
            vec![0.3, -0.2, 0.15, 0.45],
            SpsaConfig::default(),
            Some(8),
        );
        let before = opt.parameters().to_vec();

        let mut triggered = 0;
        for record in mixed_window() {
            if let Some(outcome) = opt.record_outcome(record) {
                assert!(matches!(outcome, UpdateOutcome::Applied(_)));
                triggered += 1;
            }
        }

        assert_eq!(triggered, 1);
        assert_eq!(opt.updates(), 1);
        assert_ne!(opt.parameters(), before.as_slice());
    }

    #[test]
    fn test_update_follows_penalty_gradient() {
        let mut opt = SpsaOptimizer::with_parameters(
            BrokerId(0),
            vec![0.3, -0.2, 0.15, 0.45],
            SpsaConfig::default(),
            Some(2),
        )
        .with_loss_model(Box::new(ObservedCost::default()));

        let before = opt.parameters().to_vec();
        let mut report = None;
        for record in mixed_window() {
            if let Some(outcome) = opt.record_outcome(record) {
                report = outcome.applied();
            }
        }
        let report = report.expect("window of 10 triggers an update");

        // For L = c + 0.1‖θ‖²: (L+ − L−)/(2β) = 0.2 (θ·δ)
        let dot: f64 = before.iter().zip(&report.delta).map(|(t, d)| t * d).sum();
        for ((b, a), d) in before.iter().zip(opt.parameters()).zip(&report.delta) {
            let expected = b - 0.01 * 0.2 * dot * d;
            assert!((a - expected).abs() < 1e-9);
        }
        assert!(norm(opt.parameters()) < norm(&before));
        assert!((report.window.observed_loss - WindowStats::from_records(&mixed_window()).observed_loss).abs() < 1e-12);
    }

    #[test]
    fn test_parameters_stay_clipped() {
        let mut config = SpsaConfig::default().with_update_frequency(1);
        config.alpha = 50.0;
        for seed in 0..20u64 {
            let start: Vec<f64> = (0..5).map(|i| if (seed + i) % 2 == 0 { 1.99 } else { -1.99 }).collect();
            let mut opt = SpsaOptimizer::with_parameters(BrokerId(0), start, config.clone(), Some(seed))
                .with_loss_model(Box::new(|theta: &[f64], _: &WindowStats| {
                    theta.iter().map(|t| t * 1000.0).sum::<f64>()
                }));
            for i in 0..10 {
                opt.record_outcome(record(i % 2 == 0, 2.0));
                assert!(opt.parameters().iter().all(|t| (-2.0..=2.0).contains(t)));
            }
        }
    }

    #[test]
    fn test_non_finite_loss_leaves_parameters() {
        let mut opt = SpsaOptimizer::with_parameters(
            BrokerId(0),
            vec![0.1, 0.2],
            SpsaConfig::default().with_update_frequency(1),
            Some(3),
        )
        .with_loss_model(Box::new(|_: &[f64], _: &WindowStats| f64::NAN));
        let outcome = opt.record_outcome(record(true, 1.0)).unwrap();
        assert!(matches!(outcome, UpdateOutcome::NonFiniteLoss { .. }));
        assert_eq!(opt.parameters(), &[0.1, 0.2]);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = SpsaConfig::default().with_update_frequency(5);
        let mut opt = SpsaOptimizer::new(BrokerId(0), 3, config, Some(4));
        for _ in 0..100 {
            opt.record_outcome(record(true, 1.0));
        }
        assert_eq!(opt.history().len(), 20);
        assert_eq!(opt.history().total_recorded(), 100);
        assert_eq!(opt.updates(), 20);
    }

    #[test]
    fn test_large_window_builds() {
        let config = SpsaConfig::default().with_update_frequency(1 << 40);
        assert_eq!(config.history_capacity(), 1 << 42);
        let mut opt = SpsaOptimizer::new(BrokerId(0), 4, config, Some(1));
        opt.record_outcome(record(true, 1.0));
        assert_eq!(opt.history().len(), 1);
        assert_eq!(opt.updates(), 0);
    }

    #[test]
    fn test_infinite_ranges_do_not_panic() {
        let mut config = SpsaConfig::default().with_jitter(f64::INFINITY);
        config.init_range = f64::INFINITY;
        let mut opt = SpsaOptimizer::new(BrokerId(0), 4, config, Some(2));
        assert_eq!(opt.parameters(), &[0.0; 4]);
        assert_eq!(opt.score(&[1.0, 1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_set_parameters_rejects_wrong_dimension() {
        let mut opt = SpsaOptimizer::with_parameters(BrokerId(0), vec![0.0; 3], SpsaConfig::default(), Some(1));
        opt.set_parameters(vec![1.0; 2]);
        assert_eq!(opt.parameters(), &[0.0; 3]);
        opt.set_parameters(vec![5.0, 5.0, 5.0]);
        assert_eq!(opt.parameters(), &[5.0; 3]);
    }
}
