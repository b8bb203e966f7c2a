mod config;
mod error;
mod indicator;
mod model;
mod report;
mod screener;
mod source;
mod universe;

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use indicator::macd::Macd;
use model::ScreenOutcome;
use report::Presenter;
use report::terminal::TerminalReport;
use screener::{ScreenSettings, Screener};
use source::PriceSource;
use source::yahoo::YahooSource;
use universe::{FileUniverse, StaticUniverse, Universe};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("universe error")]
    Universe,
    #[display("screening error")]
    Screen,
}

#[derive(Parser)]
#[command(
    name = "stock-screener",
    about = "Flag stocks whose daily RSI is oversold or overbought"
)]
struct Cli {
    /// Path to the TOML configuration file (defaults apply when omitted and
    /// `config.toml` does not exist)
    #[arg(short, long)]
    config: Option<String>,

    /// Line-delimited symbol list, overriding the configured universe
    #[arg(short, long)]
    universe: Option<String>,

    /// Screen only these symbols (repeatable)
    #[arg(short, long = "symbol")]
    symbols: Vec<String>,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Universe ──────────────────────────────────────────────────────────────
    let universe = build_universe(&cli, &config);
    let symbols = universe.load().change_context(AppError::Universe)?;

    // ── Collaborators ─────────────────────────────────────────────────────────
    let requests_per_second = NonZeroU32::new(config.source.requests_per_second)
        .ok_or_else(|| Report::new(AppError::Config))
        .attach("source.requests_per_second must be > 0")?;
    let source: Arc<dyn PriceSource> = Arc::new(YahooSource::new(
        config.source.base_url.clone(),
        requests_per_second,
    ));

    let macd = Macd::new(config.macd.fast, config.macd.slow, config.macd.signal)
        .change_context(AppError::Config)?;
    let presenter: Arc<dyn Presenter> = Arc::new(TerminalReport::new(
        macd,
        config.screener.oversold,
        config.screener.overbought,
    ));

    let screener = Screener::new(
        source,
        presenter,
        ScreenSettings::from_config(&config.screener),
    )
    .change_context(AppError::Config)?;

    // ── Pass ──────────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl+c received, aborting pass");
                cancel.cancel();
            }
        })
    };

    let end = chrono::Local::now().date_naive();
    let result = screener.run_pass(&symbols, end, &cancel).await;
    ctrl_c.abort();
    let report = result.change_context(AppError::Screen)?;

    for outcome in &report.outcomes {
        let symbol = outcome.symbol();
        match outcome {
            ScreenOutcome::Screened(r) if r.decision.is_flagged() => {
                info!(symbol, rsi = r.latest_rsi, decision = %r.decision, "flagged");
            }
            ScreenOutcome::Skipped { reason, detail, .. } => {
                info!(symbol, reason = %reason, detail = %detail, "skipped");
            }
            ScreenOutcome::Screened(_) => {}
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<AppConfig, Report<error::ConfigError>> {
    match path {
        Some(path) => config::load(Path::new(path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            config::load(Path::new(DEFAULT_CONFIG_PATH))
        }
        None => config::parse(""),
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

/// Command-line symbols win, then `--universe`, then inline config symbols,
/// then the configured universe file.
fn build_universe(cli: &Cli, config: &AppConfig) -> Box<dyn Universe> {
    if !cli.symbols.is_empty() {
        return Box::new(StaticUniverse::new(cli.symbols.clone()));
    }
    if let Some(path) = &cli.universe {
        return Box::new(FileUniverse::new(path));
    }
    if !config.universe.symbols.is_empty() {
        return Box::new(StaticUniverse::new(config.universe.symbols.clone()));
    }
    Box::new(FileUniverse::new(&config.universe.path))
}
