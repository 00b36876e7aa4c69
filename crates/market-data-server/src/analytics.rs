use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPrediction {
    pub symbol: String,
    pub trend: Trend,
    pub confidence: f64,
    pub predicted_price_24h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRiskRequest {
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRiskResponse {
    pub total_value: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub diversification_score: u32,
}

/// Pluggable trend and risk strategy behind the analytics endpoints.
#[async_trait]
pub trait AnalyticsService: Send + Sync {
    async fn predict_trend(&self, symbol: &str) -> TrendPrediction;

    async fn calculate_risk(&self, portfolio: &PortfolioRiskRequest) -> PortfolioRiskResponse;
}

/// Placeholder strategy. Returns fixed figures and performs no modeling;
/// swap in a real implementation before relying on these numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAnalytics;

#[async_trait]
impl AnalyticsService for StaticAnalytics {
    async fn predict_trend(&self, symbol: &str) -> TrendPrediction {
        TrendPrediction {
            symbol: symbol.to_string(),
            trend: Trend::Bullish,
            confidence: 0.85,
            predicted_price_24h: 43_500.0,
        }
    }

    async fn calculate_risk(&self, _portfolio: &PortfolioRiskRequest) -> PortfolioRiskResponse {
        PortfolioRiskResponse {
            total_value: 10_000.0,
            volatility: 0.15,
            sharpe_ratio: 1.2,
            diversification_score: 75,
        }
    }
}
