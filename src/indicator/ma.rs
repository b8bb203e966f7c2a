use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::model::PriceSeries;

fn check_window(window: usize, len: usize) -> Result<(), Report<IndicatorError>> {
    if window == 0 || window > len {
        bail!(IndicatorError::InvalidWindow { window, len });
    }
    Ok(())
}

/// Mean over each full window. Returns `values.len() - window + 1` points.
pub fn simple_moving_average(
    values: &[f64],
    window: usize,
) -> Result<Vec<f64>, Report<IndicatorError>> {
    check_window(window, values.len())?;
    Ok(values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect())
}

/// Normalized weights `exp(linspace(-1, 0, window))`, oldest sample first.
fn exp_weights(window: usize) -> Vec<f64> {
    let raw: Vec<f64> = if window == 1 {
        vec![1.0]
    } else {
        let step = 1.0 / (window - 1) as f64;
        (0..window).map(|k| (-1.0 + k as f64 * step).exp()).collect()
    };
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Exponentially weighted average with one output per input.
///
/// Each position is the weighted sum of the trailing `window` samples. Weights
/// run from `exp(-1)` on the oldest sample to `exp(0)` on the newest. The first `window` positions only see
/// part of the window, so they are overwritten with the value at `window`
/// (or the last value when `window == values.len()`).
pub fn exponential_moving_average(
    values: &[f64],
    window: usize,
) -> Result<Vec<f64>, Report<IndicatorError>> {
    check_window(window, values.len())?;
    let weights = exp_weights(window);

    let mut out: Vec<f64> = (0..values.len())
        .map(|t| {
            let first = (t + 1).saturating_sub(window);
            values[first..=t]
                .iter()
                .rev()
                .zip(weights.iter().rev())
                .map(|(v, w)| v * w)
                .sum()
        })
        .collect();

    let seed = out[window.min(out.len() - 1)];
    out[..window].fill(seed);
    Ok(out)
}

/// Simple Moving Average of closing prices.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, series: &PriceSeries) -> Result<Vec<f64>, Report<IndicatorError>> {
        simple_moving_average(&series.closes(), self.period)
    }
}

/// Exponentially weighted average of closing prices, one value per bar.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        "ema"
    }

    fn required_bars(&self) -> usize {
        self.period
    }

    fn calculate(&self, series: &PriceSeries) -> Result<Vec<f64>, Report<IndicatorError>> {
        exponential_moving_average(&series.closes(), self.period)
    }
}
