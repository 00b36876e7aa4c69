use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use market_data_core::candle::{Candle, MarketSummary, Resolution, is_valid_symbol};
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analytics::{
    AnalyticsService, PortfolioRiskRequest, PortfolioRiskResponse, TrendPrediction,
};
use crate::error::{ApiError, panic_response};
use crate::repository::MarketDataRepository;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Dependencies shared by every handler, built once at startup.
pub struct AppState {
    pub repository: MarketDataRepository,
    pub analytics: Arc<dyn AnalyticsService>,
}

/// Assemble the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/market/history", get(market_history))
        .route("/v1/market/summary", get(market_summary))
        .route("/v1/analytics/predict/{symbol}", get(predict_trend))
        .route("/v1/analytics/portfolio/risk", post(portfolio_risk))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub symbol: String,
    pub resolution: Option<String>,
    pub limit: Option<usize>,
}

fn validate_symbol(symbol: &str) -> Result<(), ApiError> {
    if is_valid_symbol(symbol) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("invalid symbol: {symbol:?}")))
    }
}

async fn market_history(
    State(state): State<Arc<AppState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;

    validate_symbol(&params.symbol)?;
    // A token outside the resolution set is malformed input and gets a 400.
    // A valid resolution for a pair the provider cannot serve yields `[]`.
    let resolution: Resolution = params
        .resolution
        .as_deref()
        .unwrap_or("1h")
        .parse()
        .map_err(|e| ApiError::Validation(format!("{e}")))?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }

    let candles = state
        .repository
        .get_history(&params.symbol, resolution, limit)
        .await?;
    Ok(Json(candles))
}

async fn market_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MarketSummary>, ApiError> {
    Ok(Json(state.repository.get_summary().await?))
}

async fn predict_trend(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<TrendPrediction>, ApiError> {
    validate_symbol(&symbol)?;
    Ok(Json(state.analytics.predict_trend(&symbol).await))
}

async fn portfolio_risk(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PortfolioRiskRequest>, JsonRejection>,
) -> Result<Json<PortfolioRiskResponse>, ApiError> {
    let Json(portfolio) = body.map_err(|e| ApiError::Validation(e.body_text()))?;
    Ok(Json(state.analytics.calculate_risk(&portfolio).await))
}
