use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::indicator::ma::exponential_moving_average;
use crate::model::PriceSeries;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

/// All MACD series, each the same length as the input prices.
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub ema_slow: Vec<f64>,
    pub ema_fast: Vec<f64>,
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Values of every MACD series at one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub ema_slow: f64,
    pub ema_fast: f64,
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl MacdSeries {
    pub fn latest(&self) -> Option<MacdPoint> {
        Some(MacdPoint {
            ema_slow: *self.ema_slow.last()?,
            ema_fast: *self.ema_fast.last()?,
            macd: *self.macd.last()?,
            signal: *self.signal.last()?,
            histogram: *self.histogram.last()?,
        })
    }
}

pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }

    pub fn calculate_full(&self, prices: &[f64]) -> Result<MacdSeries, Report<IndicatorError>> {
        let ema_slow = exponential_moving_average(prices, self.slow_period)?;
        let ema_fast = exponential_moving_average(prices, self.fast_period)?;

        let macd: Vec<f64> = ema_fast
            .iter()
            .zip(&ema_slow)
            .map(|(f, s)| f - s)
            .collect();

        let signal = exponential_moving_average(&macd, self.signal_period)?;
        let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

        Ok(MacdSeries {
            ema_slow,
            ema_fast,
            macd,
            signal,
            histogram,
        })
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast_period: DEFAULT_FAST,
            slow_period: DEFAULT_SLOW,
            signal_period: DEFAULT_SIGNAL,
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    fn required_bars(&self) -> usize {
        self.slow_period.max(self.signal_period)
    }

    /// Returns MACD line values only.
    fn calculate(&self, series: &PriceSeries) -> Result<Vec<f64>, Report<IndicatorError>> {
        Ok(self.calculate_full(&series.closes())?.macd)
    }
}
