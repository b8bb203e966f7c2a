pub mod ma;
pub mod macd;
pub mod rsi;

use error_stack::Report;

use crate::error::IndicatorError;
use crate::model::PriceSeries;

/// A technical analysis indicator computed over a daily price series.
pub trait Indicator: Send + Sync {
    /// Unique name of this indicator (e.g., "rsi", "sma").
    fn name(&self) -> &str;

    /// Minimum number of bars required to produce a defined output.
    fn required_bars(&self) -> usize;

    /// Calculate indicator values from the series' closing prices.
    ///
    /// RSI, EMA and MACD return one value per bar; SMA returns
    /// `len - window + 1` values.
    fn calculate(&self, series: &PriceSeries) -> Result<Vec<f64>, Report<IndicatorError>>;
}
