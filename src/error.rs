use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

use crate::models::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed source data. Fatal to the pipeline run, not the process.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// The engineered feature set was empty. Reported, the training step is skipped.
    #[error("no feature rows available to train on")]
    TrainingDataEmpty,

    /// No artifact set is loaded. The serving layer degrades to 503.
    #[error("model not loaded, ensure the training pipeline has run successfully")]
    ModelUnavailable,

    /// Per-request user error: a team has no materialized rolling stats.
    #[error("{0}")]
    StatsNotFound(String),

    /// Artifacts exist but could not be read back. Retried on the next cycle.
    #[error("failed to load artifacts: {0}")]
    ArtifactLoad(String),

    /// Model fitting or scoring failed inside smartcore.
    #[error("model error: {0}")]
    Model(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::ModelUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::StatsNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::TrainingDataEmpty | AppError::Ingestion(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            // User-facing responses never carry internal detail.
            _ => {
                tracing::error!("internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
