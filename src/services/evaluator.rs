//! Continuous model evaluation.
//!
//! On a fixed interval: load the latest artifact set, recompute the
//! deterministic stratified split over the current feature table, score the
//! held-out rows and publish the result as gauges. Any failure in a cycle is
//! logged and retried on the next tick; the loop itself never dies. A
//! rollback check compares the previous run's recorded accuracy against the
//! freshly measured one and raises a signal gauge when the drop exceeds the
//! configured threshold. Acting on that signal (redeploying an older run) is
//! the deployment layer's job, not ours.

use std::time::Duration;

use prometheus::{Encoder, Gauge, IntGauge, Registry as MetricsRegistry, TextEncoder};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::registry::ModelRegistry;
use crate::services::features::read_feature_table;
use crate::services::trainer::{accuracy, stratified_split, weighted_f1};
use smartcore::linalg::basic::matrix::DenseMatrix;

#[derive(Debug, Clone)]
pub struct EvalSnapshot {
    pub run_id: String,
    pub accuracy: f64,
    pub f1_weighted: f64,
    pub previous_accuracy: Option<f64>,
    pub rollback_signalled: bool,
}

pub struct EvalGauges {
    registry: MetricsRegistry,
    accuracy: Gauge,
    f1: Gauge,
    rollback: IntGauge,
}

impl EvalGauges {
    pub fn new() -> Result<Self> {
        let registry = MetricsRegistry::new();
        let accuracy = Gauge::new("model_accuracy", "Current model accuracy")?;
        let f1 = Gauge::new("model_f1_score", "Current model F1 score (weighted)")?;
        let rollback = IntGauge::new(
            "model_rollback_signal",
            "1 when accuracy regressed past the rollback threshold",
        )?;
        registry.register(Box::new(accuracy.clone()))?;
        registry.register(Box::new(f1.clone()))?;
        registry.register(Box::new(rollback.clone()))?;
        Ok(Self {
            registry,
            accuracy,
            f1,
            rollback,
        })
    }

    pub fn publish(&self, snapshot: &EvalSnapshot) {
        self.accuracy.set(snapshot.accuracy);
        self.f1.set(snapshot.f1_weighted);
        self.rollback
            .set(if snapshot.rollback_signalled { 1 } else { 0 });
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Whether the measured accuracy regressed far enough from the previous
/// deployment's recorded accuracy to warrant a rollback.
pub fn should_roll_back(previous: f64, current: f64, threshold: f64) -> bool {
    previous - current > threshold
}

pub struct ContinuousEvaluator {
    config: Config,
    model_registry: ModelRegistry,
}

impl ContinuousEvaluator {
    pub fn new(config: Config) -> Self {
        let model_registry = ModelRegistry::new(&config.registry_dir);
        Self {
            config,
            model_registry,
        }
    }

    /// One evaluation cycle. Errors bubble up to the loop, which logs and
    /// waits for the next tick.
    pub fn evaluate_once(&self) -> Result<EvalSnapshot> {
        let artifacts = self.model_registry.load_latest()?;
        let rows = read_feature_table(&self.config.features_path)?;
        if rows.is_empty() {
            return Err(AppError::TrainingDataEmpty);
        }

        // Encode with the persisted mapping; rows whose label the model has
        // never seen cannot be scored and are skipped.
        let mut x_rows = Vec::new();
        let mut y = Vec::new();
        let mut unknown = 0usize;
        for row in &rows {
            match artifacts.encoder.transform(&row.full_time_result) {
                Some(class) => {
                    x_rows.push(row.feature_vector());
                    y.push(class);
                }
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            tracing::warn!(
                "{} rows carry labels unknown to run {}, excluded from evaluation",
                unknown,
                artifacts.run_id()
            );
        }

        let (_, test_idx) = stratified_split(&y, self.config.test_ratio, self.config.split_seed);
        if test_idx.is_empty() {
            return Err(AppError::TrainingDataEmpty);
        }
        let test_rows: Vec<Vec<f64>> = test_idx.iter().map(|&i| x_rows[i].clone()).collect();
        let y_test: Vec<usize> = test_idx.iter().map(|&i| y[i]).collect();
        let x_test =
            DenseMatrix::from_2d_vec(&test_rows).map_err(|e| AppError::Model(e.to_string()))?;
        let pred = artifacts.outcome.predict(&x_test)?;

        let current_accuracy = accuracy(&y_test, &pred);
        let f1 = weighted_f1(&y_test, &pred, artifacts.encoder.len());

        let previous_accuracy = match self.model_registry.previous_run_id()? {
            Some(run_id) => Some(self.model_registry.load_metrics(&run_id)?.accuracy),
            None => None,
        };
        let rollback_signalled = previous_accuracy.map_or(false, |previous| {
            should_roll_back(previous, current_accuracy, self.config.rollback_threshold)
        });

        Ok(EvalSnapshot {
            run_id: artifacts.run_id().to_string(),
            accuracy: current_accuracy,
            f1_weighted: f1,
            previous_accuracy,
            rollback_signalled,
        })
    }

    /// The evaluation loop. Runs until the process exits; per-cycle failures
    /// are logged and retried on the next interval.
    pub async fn run(&self, gauges: &EvalGauges) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.eval_interval_secs));
        loop {
            interval.tick().await;
            match self.evaluate_once() {
                Ok(snapshot) => {
                    gauges.publish(&snapshot);
                    tracing::info!(
                        "Evaluated run {}: accuracy {:.3}, weighted F1 {:.3}",
                        snapshot.run_id,
                        snapshot.accuracy,
                        snapshot.f1_weighted
                    );
                    if snapshot.rollback_signalled {
                        tracing::warn!(
                            "Accuracy drop detected ({:.3} -> {:.3}), rollback recommended",
                            snapshot.previous_accuracy.unwrap_or(f64::NAN),
                            snapshot.accuracy
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("Evaluation cycle failed, retrying next interval: {}", e);
                }
            }
        }
    }
}

/// Recorded-metrics rollback check for the CLI: compares the two most recent
/// runs without rescoring anything.
pub fn rollback_check(registry: &ModelRegistry, threshold: f64) -> Result<Option<bool>> {
    let runs = registry.list_runs()?;
    match (runs.first(), runs.get(1)) {
        (Some(current), Some(previous)) => Ok(Some(should_roll_back(
            previous.accuracy,
            current.accuracy,
            threshold,
        ))),
        _ => Ok(None),
    }
}
