use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use market_data_core::candle::Resolution;
use market_data_core::memory::MemoryCandleStore;
use market_data_core::store::{CandleStore, ParquetCandleStore};
use market_data_providers::binance::BinanceProvider;
use market_data_server::analytics::StaticAnalytics;
use market_data_server::api::{self, AppState};
use market_data_server::config::ServerConfig;
use market_data_server::repository::MarketDataRepository;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "market-data",
    about = "Serve and manage cached crypto candle history"
)]
struct Cli {
    /// Root directory for the candle store (env: MARKET_DATA_STORE_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Store database name (env: MARKET_DATA_DB_NAME)
    #[arg(long)]
    database: Option<String>,

    /// Upstream provider base URL (env: MARKET_DATA_PROVIDER_URL)
    #[arg(long)]
    provider_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Parquet,
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Bind address (env: MARKET_DATA_BIND)
        #[arg(long)]
        bind: Option<String>,

        /// Listen port (env: MARKET_DATA_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Candle store backend
        #[arg(long, value_enum, default_value = "parquet")]
        store: StoreKind,
    },

    /// Fetch history through the cache and print it as JSON
    History {
        #[arg(short, long)]
        symbol: String,

        /// Resolution (1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w)
        #[arg(short, long, default_value = "1h", value_parser = parse_resolution)]
        resolution: Resolution,

        #[arg(short, long, default_value_t = api::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Show what data exists in the store
    Status {
        /// Filter by symbol (shows all if omitted)
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// Validate Parquet files and report issues
    Validate {
        /// Symbols to validate (all if omitted, comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,
    },
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn resolve_config(cli: &Cli) -> ServerConfig {
    let mut config = ServerConfig::from_env();
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(db) = &cli.database {
        config.database = db.clone();
    }
    if let Some(url) = &cli.provider_url {
        config.provider_url = url.clone();
    }
    if let Commands::Serve { bind, port, .. } = &cli.command {
        if let Some(bind) = bind {
            config.bind = bind.clone();
        }
        if let Some(port) = port {
            config.port = *port;
        }
    }
    config
}

fn build_repository(config: &ServerConfig, store: Arc<dyn CandleStore>) -> MarketDataRepository {
    let provider = BinanceProvider::with_base_url(config.provider_url.clone());
    MarketDataRepository::new(store, Arc::new(provider))
}

async fn cmd_serve(config: &ServerConfig, store_kind: StoreKind) -> Result<()> {
    let store: Arc<dyn CandleStore> = match store_kind {
        StoreKind::Parquet => Arc::new(ParquetCandleStore::new(
            &config.data_dir,
            &config.database,
        )),
        StoreKind::Memory => Arc::new(MemoryCandleStore::new()),
    };
    let state = Arc::new(AppState {
        repository: build_repository(config, store),
        analytics: Arc::new(StaticAnalytics),
    });

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        store = ?store_kind,
        provider = %config.provider_url,
        "market data service listening"
    );

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

async fn cmd_history(
    repository: &MarketDataRepository,
    symbol: &str,
    resolution: Resolution,
    limit: usize,
) -> Result<()> {
    let candles = repository
        .get_history(symbol, resolution, limit)
        .await
        .with_context(|| format!("failed to load {symbol} {resolution} history"))?;
    println!("{}", serde_json::to_string_pretty(&candles)?);
    Ok(())
}

fn cmd_status(store: &ParquetCandleStore, symbol: Option<&str>) -> Result<()> {
    let symbols = match symbol {
        Some(s) => vec![s.to_string()],
        None => store.list_symbols().context("failed to list symbols")?,
    };

    if symbols.is_empty() {
        println!("No data in store.");
        return Ok(());
    }

    for sym in &symbols {
        let series = store
            .list_series(sym)
            .with_context(|| format!("failed to list series for {sym}"))?;

        if series.is_empty() {
            println!("{sym}: no data");
            continue;
        }

        for resolution in series {
            let candles = store
                .read_series(sym, resolution)
                .with_context(|| format!("failed to read {sym} {resolution}"))?;
            match (candles.first(), candles.last()) {
                (Some(first), Some(last)) => println!(
                    "{sym} {resolution}: {} candle(s), {} to {}",
                    candles.len(),
                    first.timestamp,
                    last.timestamp
                ),
                _ => println!("{sym} {resolution}: empty"),
            }
        }
    }

    Ok(())
}

/// Check each stored series in file order and return the number of issues found.
fn cmd_validate(store: &ParquetCandleStore, symbols: Option<&[String]>) -> Result<usize> {
    let symbols_to_check = match symbols {
        Some(list) => list.to_vec(),
        None => store.list_symbols().context("failed to list symbols")?,
    };

    if symbols_to_check.is_empty() {
        println!("No data to validate.");
        return Ok(0);
    }

    let mut issues = 0;

    for sym in &symbols_to_check {
        let series = store
            .list_series(sym)
            .with_context(|| format!("failed to list series for {sym}"))?;

        for resolution in series {
            let candles = match store.read_series_raw(sym, resolution) {
                Ok(candles) => candles,
                Err(e) => {
                    println!("ERROR: {sym} {resolution}: failed to read: {e}");
                    issues += 1;
                    continue;
                }
            };

            if candles.is_empty() {
                println!("WARN: {sym} {resolution}: empty file");
                issues += 1;
                continue;
            }

            if let Some(i) = candles
                .windows(2)
                .position(|w| w[1].timestamp <= w[0].timestamp)
            {
                println!(
                    "WARN: {sym} {resolution}: timestamps not strictly ascending at index {}",
                    i + 1
                );
                issues += 1;
            }

            let inconsistent = candles.iter().filter(|c| !c.is_consistent()).count();
            if inconsistent > 0 {
                println!("WARN: {sym} {resolution}: {inconsistent} candle(s) with inconsistent OHLC");
                issues += 1;
            }
        }
    }

    if issues == 0 {
        println!("All files valid.");
    } else {
        println!("{issues} issue(s) found.");
    }

    Ok(issues)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = resolve_config(&cli);
    let parquet = ParquetCandleStore::new(&config.data_dir, &config.database);

    match &cli.command {
        Commands::Serve { store, .. } => {
            cmd_serve(&config, *store).await?;
        }
        Commands::History {
            symbol,
            resolution,
            limit,
        } => {
            let repository = build_repository(&config, Arc::new(parquet));
            cmd_history(&repository, symbol, *resolution, *limit).await?;
        }
        Commands::Status { symbol } => {
            cmd_status(&parquet, symbol.as_deref())?;
        }
        Commands::Validate { symbols } => {
            cmd_validate(&parquet, symbols.as_deref())?;
        }
    }

    Ok(())
}
