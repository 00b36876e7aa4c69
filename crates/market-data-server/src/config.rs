use std::env;
use std::path::PathBuf;

use market_data_providers::binance::BINANCE_BASE_URL;

/// Service configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Root directory of the candle store.
    pub data_dir: PathBuf,
    /// Store database name; a subdirectory of `data_dir`.
    pub database: String,
    /// Upstream provider base URL.
    pub provider_url: String,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8003,
            data_dir: PathBuf::from("."),
            database: "market_data".to_string(),
            provider_url: BINANCE_BASE_URL.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: env_str("MARKET_DATA_BIND", &defaults.bind),
            port: env_u16("MARKET_DATA_PORT", defaults.port),
            data_dir: PathBuf::from(env_str(
                "MARKET_DATA_STORE_DIR",
                &defaults.data_dir.to_string_lossy(),
            )),
            database: env_str("MARKET_DATA_DB_NAME", &defaults.database),
            provider_url: env_str("MARKET_DATA_PROVIDER_URL", &defaults.provider_url),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
