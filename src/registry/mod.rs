//! Filesystem-backed model run registry.
//!
//! Each training run gets its own directory of artifacts, staged under a
//! hidden name and renamed into place when complete, then advertised through
//! a `LATEST` pointer file that is itself replaced atomically. Readers
//! therefore see either the previous run set or the full new one, never a
//! partial write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::services::trainer::{GoalRegressor, LabelEncoder, OutcomeClassifier};
use crate::utils::atomic_write;

const OUTCOME_MODEL_FILE: &str = "outcome_model.json";
const HOME_GOALS_MODEL_FILE: &str = "home_goals_model.json";
const AWAY_GOALS_MODEL_FILE: &str = "away_goals_model.json";
const ENCODER_FILE: &str = "label_encoder.json";
const METRICS_FILE: &str = "metrics.json";
const LATEST_FILE: &str = "LATEST";

/// Metrics recorded with every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub model_version: String,
    pub n_trees: usize,
    pub accuracy: f64,
    pub f1_weighted: f64,
    pub home_goals_mae: f64,
    pub away_goals_mae: f64,
    pub n_train: usize,
    pub n_test: usize,
    pub trained_at: DateTime<Utc>,
}

/// Everything needed to serve predictions: the fitted classifier, the label
/// encoder it was trained against, both goal regressors and the recorded
/// metrics. Immutable once loaded.
pub struct ArtifactSet {
    pub metrics: RunMetrics,
    pub encoder: LabelEncoder,
    pub outcome: OutcomeClassifier,
    pub home_goals: GoalRegressor,
    pub away_goals: GoalRegressor,
}

impl ArtifactSet {
    pub fn run_id(&self) -> &str {
        &self.metrics.run_id
    }
}

pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Persist a run. The run directory is staged first and renamed into
    /// place, then `LATEST` is repointed.
    pub fn save_run(&self, artifacts: &ArtifactSet) -> Result<()> {
        let run_id = artifacts.run_id().to_string();
        let staging = self.root.join(format!(".staging-{}", run_id));
        fs::create_dir_all(&staging)?;

        fs::write(
            staging.join(OUTCOME_MODEL_FILE),
            serde_json::to_vec(&artifacts.outcome)?,
        )?;
        fs::write(
            staging.join(HOME_GOALS_MODEL_FILE),
            serde_json::to_vec(&artifacts.home_goals)?,
        )?;
        fs::write(
            staging.join(AWAY_GOALS_MODEL_FILE),
            serde_json::to_vec(&artifacts.away_goals)?,
        )?;
        fs::write(
            staging.join(ENCODER_FILE),
            serde_json::to_vec(&artifacts.encoder)?,
        )?;
        fs::write(
            staging.join(METRICS_FILE),
            serde_json::to_vec_pretty(&artifacts.metrics)?,
        )?;

        fs::rename(&staging, self.root.join(&run_id))?;
        atomic_write(&self.root.join(LATEST_FILE), run_id.as_bytes())?;
        tracing::info!("Registered model run {} in {:?}", run_id, self.root);
        Ok(())
    }

    pub fn latest_run_id(&self) -> Result<Option<String>> {
        let pointer = self.root.join(LATEST_FILE);
        if !pointer.exists() {
            return Ok(None);
        }
        let run_id = fs::read_to_string(pointer)?.trim().to_string();
        if run_id.is_empty() || !self.root.join(&run_id).is_dir() {
            return Ok(None);
        }
        Ok(Some(run_id))
    }

    /// All recorded runs, newest first.
    pub fn list_runs(&self) -> Result<Vec<RunMetrics>> {
        let mut runs = Vec::new();
        if !self.root.is_dir() {
            return Ok(runs);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !entry.path().is_dir() || name.starts_with('.') {
                continue;
            }
            match self.load_metrics(&name) {
                Ok(metrics) => runs.push(metrics),
                Err(e) => tracing::warn!("Skipping unreadable run {}: {}", name, e),
            }
        }
        runs.sort_by(|a, b| b.trained_at.cmp(&a.trained_at));
        Ok(runs)
    }

    /// The run that was current before the latest one, if any. Its recorded
    /// accuracy is the baseline for the rollback check.
    pub fn previous_run_id(&self) -> Result<Option<String>> {
        Ok(self.list_runs()?.into_iter().nth(1).map(|m| m.run_id))
    }

    pub fn load_metrics(&self, run_id: &str) -> Result<RunMetrics> {
        let bytes = fs::read(self.root.join(run_id).join(METRICS_FILE))
            .map_err(|e| AppError::ArtifactLoad(format!("run {}: {}", run_id, e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::ArtifactLoad(format!("run {}: {}", run_id, e)))
    }

    pub fn load_run(&self, run_id: &str) -> Result<ArtifactSet> {
        let dir = self.root.join(run_id);
        let read = |file: &str| -> Result<Vec<u8>> {
            fs::read(dir.join(file))
                .map_err(|e| AppError::ArtifactLoad(format!("run {}: {}: {}", run_id, file, e)))
        };
        let parse_err =
            |file: &str, e: serde_json::Error| AppError::ArtifactLoad(format!("run {}: {}: {}", run_id, file, e));

        let metrics: RunMetrics = serde_json::from_slice(&read(METRICS_FILE)?)
            .map_err(|e| parse_err(METRICS_FILE, e))?;
        let encoder: LabelEncoder = serde_json::from_slice(&read(ENCODER_FILE)?)
            .map_err(|e| parse_err(ENCODER_FILE, e))?;
        let outcome: OutcomeClassifier = serde_json::from_slice(&read(OUTCOME_MODEL_FILE)?)
            .map_err(|e| parse_err(OUTCOME_MODEL_FILE, e))?;
        let home_goals: GoalRegressor = serde_json::from_slice(&read(HOME_GOALS_MODEL_FILE)?)
            .map_err(|e| parse_err(HOME_GOALS_MODEL_FILE, e))?;
        let away_goals: GoalRegressor = serde_json::from_slice(&read(AWAY_GOALS_MODEL_FILE)?)
            .map_err(|e| parse_err(AWAY_GOALS_MODEL_FILE, e))?;

        Ok(ArtifactSet {
            metrics,
            encoder,
            outcome,
            home_goals,
            away_goals,
        })
    }

    /// Load the currently published run.
    pub fn load_latest(&self) -> Result<ArtifactSet> {
        match self.latest_run_id()? {
            Some(run_id) => self.load_run(&run_id),
            None => Err(AppError::ArtifactLoad(format!(
                "no published run under {:?}",
                self.root
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::trainer;
    use smartcore::linalg::basic::matrix::DenseMatrix;

    fn temp_registry() -> (PathBuf, Config, ModelRegistry) {
        let dir = std::env::temp_dir().join(format!("goalforge-registry-{}", uuid::Uuid::new_v4()));
        let mut config = Config::from_env();
        config.registry_dir = dir.join("registry");
        config.n_trees = 10;
        let registry = ModelRegistry::new(&config.registry_dir);
        (dir, config, registry)
    }

    #[test]
    fn empty_registry_has_no_runs() {
        let (dir, _, registry) = temp_registry();
        assert!(registry.latest_run_id().unwrap().is_none());
        assert!(registry.list_runs().unwrap().is_empty());
        assert!(matches!(
            registry.load_latest(),
            Err(AppError::ArtifactLoad(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn saved_run_round_trips_to_an_equivalent_predictor() {
        let (dir, config, registry) = temp_registry();
        let features = trainer::tests::synthetic_features(60);
        let metrics = trainer::train(&features, &config, &registry).unwrap();

        let restored = registry.load_latest().unwrap();
        assert_eq!(restored.run_id(), metrics.run_id);
        assert_eq!(restored.metrics.model_version, config.model_version);

        // The deserialized models must predict identically to freshly usable
        // ones over the full table.
        let rows: Vec<Vec<f64>> = features.iter().map(|r| r.feature_vector()).collect();
        let x = DenseMatrix::from_2d_vec(&rows).unwrap();
        let labels = restored.outcome.predict(&x).unwrap();
        assert_eq!(labels.len(), features.len());
        for probs in restored.outcome.predict_proba(&x).unwrap() {
            let sum: f64 = probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
        assert!(restored.encoder.inverse_transform(labels[0]).is_some());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn latest_pointer_follows_newest_run_and_previous_is_kept() {
        let (dir, config, registry) = temp_registry();
        let features = trainer::tests::synthetic_features(60);
        let first = trainer::train(&features, &config, &registry).unwrap();
        let second = trainer::train(&features, &config, &registry).unwrap();

        assert_eq!(
            registry.latest_run_id().unwrap().as_deref(),
            Some(second.run_id.as_str())
        );
        assert_eq!(
            registry.previous_run_id().unwrap().as_deref(),
            Some(first.run_id.as_str())
        );
        assert_eq!(registry.list_runs().unwrap().len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
