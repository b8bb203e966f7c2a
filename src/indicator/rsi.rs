use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::model::PriceSeries;

pub const DEFAULT_PERIOD: usize = 14;

/// RSI (Relative Strength Index) using Wilder's smoothing method.
///
/// Output has one value per close. The first `period` positions all hold the
/// seed value computed from the first `period` deltas.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidWindow { window: 0, len: 0 });
        }
        Ok(Self { period })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        Ok(WilderRsi::new(prices, self.period)?.collect())
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_bars(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, series: &PriceSeries) -> Result<Vec<f64>, Report<IndicatorError>> {
        self.calculate_prices(&series.closes())
    }
}

/// Streaming Wilder RSI: yields one value per price while carrying the
/// smoothed average gain and loss forward.
pub struct WilderRsi {
    deltas: Vec<f64>,
    period: usize,
    len: usize,
    avg_gain: f64,
    avg_loss: f64,
    seed: f64,
    pos: usize,
}

impl WilderRsi {
    pub fn new(prices: &[f64], period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidWindow {
                window: 0,
                len: prices.len(),
            });
        }
        if prices.len() <= period {
            bail!(IndicatorError::InsufficientData {
                required: period + 1,
                available: prices.len(),
            });
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

        let seed_window = &deltas[..period];
        let avg_gain = seed_window.iter().map(|&d| d.max(0.0)).sum::<f64>() / period as f64;
        let avg_loss = seed_window.iter().map(|&d| (-d).max(0.0)).sum::<f64>() / period as f64;

        Ok(Self {
            deltas,
            period,
            len: prices.len(),
            avg_gain,
            avg_loss,
            seed: rsi_value(avg_gain, avg_loss),
            pos: 0,
        })
    }
}

impl Iterator for WilderRsi {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.pos >= self.len {
            return None;
        }
        let i = self.pos;
        self.pos += 1;

        if i < self.period {
            return Some(self.seed);
        }

        // deltas are one shorter than prices
        let delta = self.deltas[i - 1];
        let (gain, loss) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        let n = self.period as f64;
        self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
        self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        Some(rsi_value(self.avg_gain, self.avg_loss))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WilderRsi {}

/// RSI from smoothed averages. With no losses the ratio is undefined: 100 if
/// there were gains, 50 if the series never moved.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
