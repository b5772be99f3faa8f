//! Model training: outcome classifier + goal-count regressors over the
//! 8-column feature table, with a deterministic stratified split and run
//! tracking through the model registry.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::FeatureRow;
use crate::registry::{ArtifactSet, ModelRegistry, RunMetrics};
use crate::utils::normalize_probabilities;

pub type GoalRegressor = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Maps outcome labels to class indices. The mapping is whatever order the
/// fit assigns (sorted distinct labels); it is persisted with the model and
/// decoding always goes through it, never through a positional assumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(|l| l.to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn transform(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }

    pub fn inverse_transform(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(|c| c.as_str())
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Random-forest outcome classifier with per-class probability estimates.
///
/// One indicator forest per class: each forest regresses the 0/1 membership
/// of its class, so its output is that class's vote share. Probabilities are
/// the clamped vote shares normalized to sum to 1; the predicted class is the
/// argmax, which matches how forest classifiers derive hard labels from
/// votes.
#[derive(Serialize, Deserialize)]
pub struct OutcomeClassifier {
    forests: Vec<GoalRegressor>,
}

impl OutcomeClassifier {
    pub fn fit(
        x: &DenseMatrix<f64>,
        y: &[usize],
        n_classes: usize,
        n_trees: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut forests = Vec::with_capacity(n_classes);
        for class in 0..n_classes {
            let indicator: Vec<f64> = y
                .iter()
                .map(|&label| if label == class { 1.0 } else { 0.0 })
                .collect();
            let params = RandomForestRegressorParameters::default()
                .with_n_trees(n_trees)
                .with_seed(seed.wrapping_add(class as u64));
            let forest = RandomForestRegressor::fit(x, &indicator, params)
                .map_err(|e| AppError::Model(e.to_string()))?;
            forests.push(forest);
        }
        Ok(Self { forests })
    }

    pub fn n_classes(&self) -> usize {
        self.forests.len()
    }

    /// Per-sample probabilities, one entry per class, non-negative and
    /// summing to 1.0.
    pub fn predict_proba(&self, x: &DenseMatrix<f64>) -> Result<Vec<Vec<f64>>> {
        let mut votes_per_class = Vec::with_capacity(self.forests.len());
        for forest in &self.forests {
            let votes = forest
                .predict(x)
                .map_err(|e| AppError::Model(e.to_string()))?;
            votes_per_class.push(votes);
        }
        let n_samples = votes_per_class.first().map_or(0, |v| v.len());
        let mut result = Vec::with_capacity(n_samples);
        for sample in 0..n_samples {
            let raw: Vec<f64> = votes_per_class
                .iter()
                .map(|votes| votes[sample].clamp(0.0, 1.0))
                .collect();
            result.push(normalize_probabilities(raw));
        }
        Ok(result)
    }

    /// Hard labels: argmax of the per-class probabilities. Ties resolve to
    /// the lower class index.
    pub fn predict(&self, x: &DenseMatrix<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.iter().map(|p| argmax(p)).collect())
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Deterministic stratified split: per class, a seeded permutation of that
/// class's row indices, the head going to test. Classes with a single row
/// stay in train (nothing sensible to hold out). Index lists come back
/// sorted, so both sides keep the feature table's chronological order.
pub fn stratified_split(y: &[usize], test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &class) in y.iter().enumerate() {
        by_class.entry(class).or_default().push(i);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (class, mut indices) in by_class {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(class as u64));
        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_test = if n < 2 {
            0
        } else {
            (((n as f64) * test_ratio).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

pub fn accuracy(truth: &[usize], pred: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(pred).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

/// F1 per class, weighted by class support.
pub fn weighted_f1(truth: &[usize], pred: &[usize], n_classes: usize) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mut score = 0.0;
    for class in 0..n_classes {
        let tp = truth
            .iter()
            .zip(pred)
            .filter(|(t, p)| **t == class && **p == class)
            .count() as f64;
        let fp = truth
            .iter()
            .zip(pred)
            .filter(|(t, p)| **t != class && **p == class)
            .count() as f64;
        let fne = truth
            .iter()
            .zip(pred)
            .filter(|(t, p)| **t == class && **p != class)
            .count() as f64;
        let support = tp + fne;
        if support == 0.0 {
            continue;
        }
        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = tp / support;
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        score += f1 * support / truth.len() as f64;
    }
    score
}

pub fn mean_absolute_error(truth: &[f64], pred: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    truth
        .iter()
        .zip(pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / truth.len() as f64
}

/// Fit the full artifact set on the feature table and persist it as a new
/// registry run. Returns the recorded run metrics.
///
/// An empty feature table is a reported condition (`TrainingDataEmpty`), not
/// a process failure: the orchestrating pipeline skips the step and moves on.
pub fn train(features: &[FeatureRow], config: &Config, registry: &ModelRegistry) -> Result<RunMetrics> {
    if features.is_empty() {
        return Err(AppError::TrainingDataEmpty);
    }

    let encoder = LabelEncoder::fit(features.iter().map(|r| r.full_time_result.as_str()));
    let y: Vec<usize> = features
        .iter()
        .map(|r| {
            encoder
                .transform(&r.full_time_result)
                .ok_or_else(|| AppError::Model(format!("unencodable label {}", r.full_time_result)))
        })
        .collect::<Result<_>>()?;

    let (train_idx, test_idx) = stratified_split(&y, config.test_ratio, config.split_seed);
    if train_idx.is_empty() || test_idx.is_empty() {
        // Too few rows to hold anything out; treat like an empty table.
        return Err(AppError::TrainingDataEmpty);
    }

    let matrix = |idx: &[usize]| -> Result<DenseMatrix<f64>> {
        let rows: Vec<Vec<f64>> = idx.iter().map(|&i| features[i].feature_vector()).collect();
        DenseMatrix::from_2d_vec(&rows).map_err(|e| AppError::Model(e.to_string()))
    };
    let x_train = matrix(&train_idx)?;
    let x_test = matrix(&test_idx)?;
    let y_train: Vec<usize> = train_idx.iter().map(|&i| y[i]).collect();
    let y_test: Vec<usize> = test_idx.iter().map(|&i| y[i]).collect();

    tracing::info!(
        "Training outcome classifier on {} rows ({} held out), {} classes",
        train_idx.len(),
        test_idx.len(),
        encoder.len()
    );
    let outcome = OutcomeClassifier::fit(
        &x_train,
        &y_train,
        encoder.len(),
        config.n_trees,
        config.split_seed,
    )?;

    let goal_regressor = |target: &dyn Fn(&FeatureRow) -> f64, seed: u64| -> Result<GoalRegressor> {
        let targets: Vec<f64> = train_idx.iter().map(|&i| target(&features[i])).collect();
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(config.n_trees)
            .with_seed(seed);
        RandomForestRegressor::fit(&x_train, &targets, params)
            .map_err(|e| AppError::Model(e.to_string()))
    };
    let home_goals = goal_regressor(&|r| r.full_time_home_goals as f64, config.split_seed)?;
    let away_goals = goal_regressor(&|r| r.full_time_away_goals as f64, config.split_seed + 1)?;

    // Held-out metrics.
    let pred = outcome.predict(&x_test)?;
    let acc = accuracy(&y_test, &pred);
    let f1 = weighted_f1(&y_test, &pred, encoder.len());
    let home_truth: Vec<f64> = test_idx
        .iter()
        .map(|&i| features[i].full_time_home_goals as f64)
        .collect();
    let away_truth: Vec<f64> = test_idx
        .iter()
        .map(|&i| features[i].full_time_away_goals as f64)
        .collect();
    let home_pred = home_goals
        .predict(&x_test)
        .map_err(|e| AppError::Model(e.to_string()))?;
    let away_pred = away_goals
        .predict(&x_test)
        .map_err(|e| AppError::Model(e.to_string()))?;

    let metrics = RunMetrics {
        run_id: uuid::Uuid::new_v4().to_string(),
        model_version: config.model_version.clone(),
        n_trees: config.n_trees,
        accuracy: acc,
        f1_weighted: f1,
        home_goals_mae: mean_absolute_error(&home_truth, &home_pred),
        away_goals_mae: mean_absolute_error(&away_truth, &away_pred),
        n_train: train_idx.len(),
        n_test: test_idx.len(),
        trained_at: chrono::Utc::now(),
    };
    tracing::info!(
        "Run {}: accuracy {:.3}, weighted F1 {:.3}, goal MAE {:.2}/{:.2}",
        metrics.run_id,
        metrics.accuracy,
        metrics.f1_weighted,
        metrics.home_goals_mae,
        metrics.away_goals_mae
    );

    let artifacts = ArtifactSet {
        metrics: metrics.clone(),
        encoder,
        outcome,
        home_goals,
        away_goals,
    };
    registry.save_run(&artifacts)?;
    Ok(metrics)
}
