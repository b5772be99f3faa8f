//! Serving-side prediction over the loaded artifact set.
//!
//! The artifact set is immutable once loaded; the only mutation point is the
//! swap inside [`ModelStore`], which installs a fully loaded and validated
//! set before any request can observe it. Request handlers share the store
//! read-only, so concurrent predictions need no further locking.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{AppError, Result};
use crate::models::{
    FeatureRow, MatchFeatures, MatchVerdict, OutcomePrediction, ScorelinePrediction,
};
use crate::registry::{ArtifactSet, ModelRegistry};
use crate::utils::{closest_team_name, round_half_up};

/// Holds the currently active artifact set behind an atomic swap. Replaces
/// ambient global model state: handlers receive this explicitly.
pub struct ModelStore {
    inner: RwLock<Option<Arc<ArtifactSet>>>,
}

impl ModelStore {
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<Arc<ArtifactSet>> {
        self.inner.read().expect("model store lock poisoned").clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().expect("model store lock poisoned").is_some()
    }

    /// Install a new artifact set. In-flight readers keep the Arc they
    /// already cloned; new readers see the new set.
    pub fn swap(&self, artifacts: ArtifactSet) {
        *self.inner.write().expect("model store lock poisoned") = Some(Arc::new(artifacts));
    }

    /// Load the latest published run and swap it in. On failure the active
    /// set is left untouched.
    pub fn reload(&self, registry: &ModelRegistry) -> Result<String> {
        let artifacts = registry.load_latest()?;
        let run_id = artifacts.run_id().to_string();
        self.swap(artifacts);
        tracing::info!("Activated model run {}", run_id);
        Ok(run_id)
    }
}

/// The outcome of comparing rounded goal counts. Exact integer tie is the
/// only draw condition.
pub fn verdict(home_goals: i64, away_goals: i64) -> MatchVerdict {
    match home_goals.cmp(&away_goals) {
        std::cmp::Ordering::Greater => MatchVerdict::HomeWin,
        std::cmp::Ordering::Less => MatchVerdict::AwayWin,
        std::cmp::Ordering::Equal => MatchVerdict::Draw,
    }
}

pub struct PredictionService {
    models: Arc<ModelStore>,
    /// Materialized feature table, date ascending. The team-name path reads
    /// the last stored rolling-stat rows rather than recomputing windows.
    stats: RwLock<Vec<FeatureRow>>,
}

impl PredictionService {
    pub fn new(models: Arc<ModelStore>) -> Self {
        Self {
            models,
            stats: RwLock::new(Vec::new()),
        }
    }

    pub fn models(&self) -> &Arc<ModelStore> {
        &self.models
    }

    pub fn refresh_stats(&self, mut rows: Vec<FeatureRow>) {
        rows.sort_by_key(|r| r.date);
        *self.stats.write().expect("stats lock poisoned") = rows;
    }

    /// Sorted distinct team names across both sides of the feature table.
    pub fn team_names(&self) -> Vec<String> {
        let stats = self.stats.read().expect("stats lock poisoned");
        let mut names: Vec<String> = stats
            .iter()
            .flat_map(|r| [r.home_team.clone(), r.away_team.clone()])
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn artifacts(&self) -> Result<Arc<ArtifactSet>> {
        self.models.current().ok_or(AppError::ModelUnavailable)
    }

    /// Classification path: decoded outcome label plus per-label
    /// probabilities summing to 1.0.
    pub fn predict_outcome(&self, features: &MatchFeatures) -> Result<OutcomePrediction> {
        Ok(self
            .predict_outcome_batch(std::slice::from_ref(features))?
            .remove(0))
    }

    /// Batch classification: responses in request order, same length.
    pub fn predict_outcome_batch(
        &self,
        batch: &[MatchFeatures],
    ) -> Result<Vec<OutcomePrediction>> {
        let artifacts = self.artifacts()?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<Vec<f64>> = batch.iter().map(|m| m.to_vector()).collect();
        let x = DenseMatrix::from_2d_vec(&rows).map_err(|e| AppError::Model(e.to_string()))?;
        let proba = artifacts.outcome.predict_proba(&x)?;

        let mut predictions = Vec::with_capacity(batch.len());
        for sample in proba {
            let mut probabilities = BTreeMap::new();
            let mut best = 0;
            for (class, p) in sample.iter().enumerate() {
                let label = artifacts
                    .encoder
                    .inverse_transform(class)
                    .ok_or_else(|| AppError::Model(format!("no label for class {}", class)))?;
                probabilities.insert(label.to_string(), *p);
                if *p > sample[best] {
                    best = class;
                }
            }
            let predicted_outcome = artifacts
                .encoder
                .inverse_transform(best)
                .ok_or_else(|| AppError::Model(format!("no label for class {}", best)))?
                .to_string();
            predictions.push(OutcomePrediction {
                predicted_outcome,
                probabilities,
            });
        }
        Ok(predictions)
    }

    /// Team-name path: regress both goal counts from the sides' last
    /// materialized rolling-stat rows and compare the rounded scoreline.
    pub fn predict_matchup(&self, team_a: &str, team_b: &str) -> Result<ScorelinePrediction> {
        let artifacts = self.artifacts()?;
        let (home_row, away_row) = {
            let stats = self.stats.read().expect("stats lock poisoned");
            let home_row = stats
                .iter()
                .rev()
                .find(|r| r.home_team == team_a)
                .cloned()
                .ok_or_else(|| self.stats_not_found(&stats, team_a, "home"))?;
            let away_row = stats
                .iter()
                .rev()
                .find(|r| r.away_team == team_b)
                .cloned()
                .ok_or_else(|| self.stats_not_found(&stats, team_b, "away"))?;
            (home_row, away_row)
        };

        let features = MatchFeatures::from_rows(&home_row, &away_row);
        let x = DenseMatrix::from_2d_vec(&vec![features.to_vector()])
            .map_err(|e| AppError::Model(e.to_string()))?;
        let home_pred = artifacts
            .home_goals
            .predict(&x)
            .map_err(|e| AppError::Model(e.to_string()))?;
        let away_pred = artifacts
            .away_goals
            .predict(&x)
            .map_err(|e| AppError::Model(e.to_string()))?;

        let predicted_home_goals = round_half_up(home_pred[0]).max(0);
        let predicted_away_goals = round_half_up(away_pred[0]).max(0);
        Ok(ScorelinePrediction {
            home_team: team_a.to_string(),
            away_team: team_b.to_string(),
            predicted_home_goals,
            predicted_away_goals,
            outcome: verdict(predicted_home_goals, predicted_away_goals),
        })
    }

    fn stats_not_found(&self, stats: &[FeatureRow], team: &str, side: &str) -> AppError {
        let names: Vec<&str> = stats
            .iter()
            .flat_map(|r| [r.home_team.as_str(), r.away_team.as_str()])
            .collect();
        let message = match closest_team_name(team, names) {
            Some(suggestion) => format!(
                "no {} stats found for '{}', did you mean '{}'?",
                side, team, suggestion
            ),
            None => format!("no {} stats found for '{}'", side, team),
        };
        AppError::StatsNotFound(message)
    }
}
