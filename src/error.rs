use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum FetchError {
    #[display("request for {symbol} failed")]
    Request { symbol: String },
    #[display("provider returned HTTP {status} for {symbol}")]
    Status { symbol: String, status: u16 },
    #[display("failed to parse price data for {symbol}")]
    ResponseParse { symbol: String },
    #[display("no price data for {symbol}")]
    NotFound { symbol: String },
    #[display("fetch for {symbol} timed out")]
    Timeout { symbol: String },
    #[display("price data for {symbol} is not a valid series")]
    Series { symbol: String },
}

#[derive(Debug, Display, Error)]
pub enum SeriesError {
    #[display("bar {index} is not strictly after the previous bar")]
    Unordered { index: usize },
}

#[derive(Debug, Display, Error)]
pub enum UniverseError {
    #[display("failed to read universe file")]
    ReadFile,
    #[display("universe contains no instruments")]
    Empty,
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid window {window} for series of length {len}")]
    InvalidWindow { window: usize, len: usize },
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum ScreenError {
    #[display("screening pass aborted")]
    Aborted,
}
