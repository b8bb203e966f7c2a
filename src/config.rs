use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::indicator::{macd, rsi};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_lookback_days() -> u32 {
    365
}

fn default_rsi_period() -> usize {
    rsi::DEFAULT_PERIOD
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

fn default_ma_windows() -> Vec<usize> {
    vec![20, 200]
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

fn default_fast() -> usize {
    macd::DEFAULT_FAST
}

fn default_slow() -> usize {
    macd::DEFAULT_SLOW
}

fn default_signal() -> usize {
    macd::DEFAULT_SIGNAL
}

fn default_base_url() -> String {
    "https://query2.finance.yahoo.com".into()
}

fn default_requests_per_second() -> u32 {
    4
}

fn default_universe_path() -> String {
    "stocks.txt".into()
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub screener: ScreenerConfig,
    #[serde(default)]
    pub macd: MacdConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenerConfig {
    /// Trailing calendar days of bars requested per instrument.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_oversold")]
    pub oversold: f64,
    #[serde(default = "default_overbought")]
    pub overbought: f64,
    /// SMA windows handed to the presenter for flagged instruments.
    #[serde(default = "default_ma_windows")]
    pub ma_windows: Vec<usize>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl ScreenerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            rsi_period: default_rsi_period(),
            oversold: default_oversold(),
            overbought: default_overbought(),
            ma_windows: default_ma_windows(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacdConfig {
    #[serde(default = "default_fast")]
    pub fast: usize,
    #[serde(default = "default_slow")]
    pub slow: usize,
    #[serde(default = "default_signal")]
    pub signal: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast: default_fast(),
            slow: default_slow(),
            signal: default_signal(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UniverseConfig {
    /// Line-delimited symbol list, read when `symbols` is empty.
    #[serde(default = "default_universe_path")]
    pub path: String,
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            path: default_universe_path(),
            symbols: Vec::new(),
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    parse(&content)
}

/// Parse and validate an `AppConfig` from TOML text.
pub fn parse(content: &str) -> Result<AppConfig, Report<ConfigError>> {
    let config: AppConfig = toml::from_str(content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(&config.general)?;
    validate_screener(&config.screener)?;
    validate_macd(&config.macd)?;
    validate_source(&config.source)?;
    Ok(())
}

fn validate_general(general: &GeneralConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            general.log_format
        )));
    }
    Ok(())
}

fn validate_screener(screener: &ScreenerConfig) -> Result<(), Report<ConfigError>> {
    if screener.rsi_period == 0 {
        return Err(invalid("screener.rsi_period must be > 0".into()));
    }
    if screener.lookback_days == 0 {
        return Err(invalid("screener.lookback_days must be > 0".into()));
    }
    if screener.concurrency == 0 {
        return Err(invalid("screener.concurrency must be > 0".into()));
    }
    if let Some(pos) = screener.ma_windows.iter().position(|&w| w == 0) {
        return Err(invalid(format!("screener.ma_windows[{pos}] must be > 0")));
    }

    let (low, high) = (screener.oversold, screener.overbought);
    if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) {
        return Err(invalid(
            "screener.oversold and screener.overbought must be within 0..=100".into(),
        ));
    }
    if low >= high {
        return Err(invalid(format!(
            "screener.oversold ({low}) must be below screener.overbought ({high})"
        )));
    }
    Ok(())
}

fn validate_macd(macd: &MacdConfig) -> Result<(), Report<ConfigError>> {
    if macd.fast == 0 || macd.slow == 0 || macd.signal == 0 {
        return Err(invalid("macd periods must be > 0".into()));
    }
    if macd.fast >= macd.slow {
        return Err(invalid(format!(
            "macd.fast ({}) must be below macd.slow ({})",
            macd.fast, macd.slow
        )));
    }
    Ok(())
}

fn validate_source(source: &SourceConfig) -> Result<(), Report<ConfigError>> {
    if source.requests_per_second == 0 {
        return Err(invalid("source.requests_per_second must be > 0".into()));
    }
    Ok(())
}
