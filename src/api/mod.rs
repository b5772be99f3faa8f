use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{ApiResponse, BatchRequest, BatchResponse, MatchFeatures, OutcomePrediction};
use crate::registry::ModelRegistry;
use crate::services::features::read_feature_table;
use crate::services::predictor::{ModelStore, PredictionService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub registry: Arc<ModelRegistry>,
    pub config: Arc<Config>,
}

pub async fn serve(port: u16, config: Config) -> anyhow::Result<()> {
    let registry = Arc::new(ModelRegistry::new(&config.registry_dir));
    let store = Arc::new(ModelStore::empty());
    let service = Arc::new(PredictionService::new(store));

    // Startup load is best-effort: without artifacts the API still comes up
    // and answers 503 until a reload succeeds.
    match service.models().reload(&registry) {
        Ok(run_id) => tracing::info!("Serving model run {}", run_id),
        Err(e) => tracing::error!("No model loaded at startup: {}", e),
    }
    match read_feature_table(&config.features_path) {
        Ok(rows) => {
            tracing::info!("Loaded {} rolling-stat rows", rows.len());
            service.refresh_stats(rows);
        }
        Err(e) => tracing::error!("No feature table loaded at startup: {}", e),
    }

    let state = AppState {
        service,
        registry,
        config: Arc::new(config),
    };
    let app = create_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("GoalForge API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(form_page_handler).post(form_predict_handler))
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .route("/batch_predict", post(batch_predict_handler))
        .route("/teams", get(teams_handler))
        .route("/reload", post(reload_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// GET /health - ready only when an artifact set is loaded
async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    if !state.service.models().is_loaded() {
        return Err(AppError::ModelUnavailable);
    }
    Ok(Json(serde_json::json!({ "status": "ok", "model_loaded": true })))
}

// POST /predict - single outcome prediction from 8 rolling-average features
async fn predict_handler(
    State(state): State<AppState>,
    Json(features): Json<MatchFeatures>,
) -> Result<Json<OutcomePrediction>> {
    Ok(Json(state.service.predict_outcome(&features)?))
}

// POST /batch_predict - list in, list out, same order and length
async fn batch_predict_handler(
    State(state): State<AppState>,
    Json(batch): Json<BatchRequest>,
) -> Result<Json<BatchResponse>> {
    let predictions = state.service.predict_outcome_batch(&batch.matches)?;
    Ok(Json(BatchResponse { predictions }))
}

// GET /teams - team names available to the form predictor
async fn teams_handler(State(state): State<AppState>) -> Json<ApiResponse<Vec<String>>> {
    Json(ApiResponse::success(state.service.team_names()))
}

// POST /reload - swap in the latest published artifact set and feature table
async fn reload_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<ApiResponse<String>>, StatusCode> {
    let run_id = match state.service.models().reload(&state.registry) {
        Ok(run_id) => run_id,
        Err(e) => {
            tracing::error!("Reload failed: {}", e);
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    };
    match read_feature_table(&state.config.features_path) {
        Ok(rows) => state.service.refresh_stats(rows),
        Err(e) => tracing::warn!("Reload kept previous rolling stats: {}", e),
    }
    Ok(Json(ApiResponse::success(format!(
        "activated run {}",
        run_id
    ))))
}

// ── Form-based predictor ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MatchupForm {
    team_a: String,
    team_b: String,
}

async fn form_page_handler(State(state): State<AppState>) -> Html<String> {
    Html(render_form(&state.service.team_names(), None, None))
}

async fn form_predict_handler(
    State(state): State<AppState>,
    Form(form): Form<MatchupForm>,
) -> Html<String> {
    let teams = state.service.team_names();
    match state.service.predict_matchup(&form.team_a, &form.team_b) {
        Ok(prediction) => {
            let line = format!(
                "{} vs {}: {} ({})",
                prediction.home_team,
                prediction.away_team,
                prediction.scoreline(),
                prediction.verdict_label()
            );
            Html(render_form(&teams, Some(&line), None))
        }
        // User-facing conditions render as messages; anything else stays
        // generic.
        Err(AppError::StatsNotFound(message)) => Html(render_form(&teams, None, Some(&message))),
        Err(AppError::ModelUnavailable) => Html(render_form(
            &teams,
            None,
            Some("Score prediction models are not loaded."),
        )),
        Err(e) => {
            tracing::error!("Form prediction failed: {}", e);
            Html(render_form(&teams, None, Some("Prediction failed.")))
        }
    }
}

fn render_form(teams: &[String], prediction: Option<&str>, error: Option<&str>) -> String {
    let options: String = teams
        .iter()
        .map(|t| format!("<option value=\"{}\"></option>", t))
        .collect();
    let result_block = match (prediction, error) {
        (Some(p), _) => format!("<p class=\"result\">{}</p>", p),
        (_, Some(e)) => format!("<p class=\"error\">{}</p>", e),
        _ => String::new(),
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>GoalForge - Match Predictor</title></head>
<body>
<h1>Match Predictor</h1>
<form method="post" action="/">
  <label>Home team <input name="team_a" list="teams" required></label>
  <label>Away team <input name="team_b" list="teams" required></label>
  <datalist id="teams">{}</datalist>
  <button type="submit">Predict</button>
</form>
{}
</body>
</html>"#,
        options, result_block
    )
}
