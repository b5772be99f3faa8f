use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::registry::ModelRegistry;
use crate::services::evaluator::{rollback_check, ContinuousEvaluator, EvalGauges};
use crate::services::features::{compute_features, read_feature_table, write_feature_table};
use crate::services::ingest::{load_matches, MatchFetcher};
use crate::services::predictor::{ModelStore, PredictionService};
use crate::services::trainer;

pub async fn fetch_data(config: &Config) -> Result<()> {
    println!("📥 Fetching raw result files...");
    let fetcher = MatchFetcher::new();
    let rows = fetcher
        .fetch_raw(&config.source_urls, &config.raw_data_path)
        .await?;
    println!(
        "✅ Wrote {} raw rows to {}",
        rows,
        config.raw_data_path.display()
    );
    Ok(())
}

pub fn preprocess(config: &Config) -> Result<()> {
    println!("⚙️  Engineering rolling features...");
    let matches = load_matches(&config.raw_data_path)?;
    println!("   {} complete match records loaded", matches.len());

    let features = compute_features(&matches, config.rolling_window);
    write_feature_table(&config.features_path, &features)?;
    println!(
        "✅ Wrote {} feature rows to {}",
        features.len(),
        config.features_path.display()
    );
    Ok(())
}

/// Train on the current feature table. An empty table is reported and
/// skipped, it does not fail the invocation.
pub fn train_model(config: &Config) -> Result<()> {
    println!("🔮 Training models...");
    let features = read_feature_table(&config.features_path)?;
    let registry = ModelRegistry::new(&config.registry_dir);
    match trainer::train(&features, config, &registry) {
        Ok(metrics) => {
            println!("✅ Run {} registered", metrics.run_id);
            println!(
                "   accuracy {:.3} | weighted F1 {:.3} | goal MAE {:.2}/{:.2}",
                metrics.accuracy,
                metrics.f1_weighted,
                metrics.home_goals_mae,
                metrics.away_goals_mae
            );
            Ok(())
        }
        Err(AppError::TrainingDataEmpty) => {
            println!("⚠️  No feature rows to train on, skipping training step");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// The full pipeline: fetch, preprocess, train. Ingestion failure aborts the
/// run; an empty training set only skips the training step.
pub async fn run_pipeline(config: &Config) -> Result<()> {
    println!("🚀 Running training pipeline...");
    fetch_data(config).await?;
    preprocess(config)?;
    train_model(config)?;
    println!("🏁 Pipeline finished");
    Ok(())
}

/// The evaluation loop plus its /metrics server.
pub async fn evaluate(config: Config, port: u16) -> Result<()> {
    let gauges = Arc::new(EvalGauges::new()?);
    let app = Router::new().route(
        "/metrics",
        get({
            let gauges = gauges.clone();
            move || {
                let gauges = gauges.clone();
                async move { gauges.render() }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Evaluator metrics listening on port {}", port);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server failed: {}", e);
        }
    });

    let evaluator = ContinuousEvaluator::new(config);
    evaluator.run(&gauges).await;
    Ok(())
}

pub fn predict_matchup(config: &Config, home: &str, away: &str) -> Result<()> {
    let registry = ModelRegistry::new(&config.registry_dir);
    let store = Arc::new(ModelStore::empty());
    store.reload(&registry)?;
    let service = PredictionService::new(store);
    service.refresh_stats(read_feature_table(&config.features_path)?);

    let prediction = service.predict_matchup(home, away)?;
    println!(
        "🎯 {} vs {}: {} ({})",
        prediction.home_team,
        prediction.away_team,
        prediction.scoreline(),
        prediction.verdict_label()
    );
    Ok(())
}

pub fn check_rollback(config: &Config) -> Result<()> {
    let registry = ModelRegistry::new(&config.registry_dir);
    match rollback_check(&registry, config.rollback_threshold)? {
        Some(true) => {
            println!("⚠️  Accuracy drop detected! Rolling back to the previous model is recommended.");
        }
        Some(false) => println!("✅ Model performance is acceptable. No rollback needed."),
        None => println!("ℹ️  Fewer than two recorded runs, nothing to compare."),
    }
    Ok(())
}
