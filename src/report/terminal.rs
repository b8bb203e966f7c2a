use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::indicator::ma::{Ema, Sma};
use crate::indicator::macd::{Macd, MacdPoint};
use crate::model::PriceSeries;
use crate::report::Presenter;

/// Summarizes flagged instruments on the log output.
pub struct TerminalReport {
    macd: Macd,
    oversold: f64,
    overbought: f64,
}

impl TerminalReport {
    pub fn new(macd: Macd, oversold: f64, overbought: f64) -> Self {
        Self {
            macd,
            oversold,
            overbought,
        }
    }

    fn summarize(&self, series: &PriceSeries, rsi: &[f64], ma_windows: &[usize]) -> Summary {
        let averages = latest_values(series, ma_windows, |w| {
            Sma::new(w).map(|sma| Box::new(sma) as Box<dyn Indicator>)
        });
        let trend = latest_values(series, ma_windows, |w| {
            Ema::new(w).map(|ema| Box::new(ema) as Box<dyn Indicator>)
        });

        // Span where every requested average is defined
        let longest = ma_windows.iter().copied().max().unwrap_or(1);
        let visible_bars = series.len().saturating_sub(longest.saturating_sub(1));

        let rsi_days_beyond = rsi
            .iter()
            .rev()
            .take_while(|&&v| v < self.oversold || v > self.overbought)
            .count();

        let range_high = series.bars().iter().map(|b| b.high).fold(f64::NAN, f64::max);
        let range_low = series.bars().iter().map(|b| b.low).fold(f64::NAN, f64::min);

        Summary {
            rsi: rsi.last().copied().unwrap_or(f64::NAN),
            rsi_days_beyond,
            averages,
            trend,
            macd: self.macd.calculate_full(&series.closes()).ok().and_then(|m| m.latest()),
            visible_bars,
            range_high,
            range_low,
        }
    }
}

/// `"{window} {NAME}={latest}"` for each window, `n/a` where undefined.
fn latest_values(
    series: &PriceSeries,
    windows: &[usize],
    build: impl Fn(usize) -> Result<Box<dyn Indicator>, Report<IndicatorError>>,
) -> String {
    windows
        .iter()
        .map(|&window| match build(window) {
            Ok(indicator) => {
                let label = format!("{window} {}", indicator.name().to_uppercase());
                if series.len() < indicator.required_bars() {
                    return format!("{label}=n/a");
                }
                indicator
                    .calculate(series)
                    .ok()
                    .and_then(|v| v.last().copied())
                    .map_or(format!("{label}=n/a"), |v| format!("{label}={v:.2}"))
            }
            Err(_) => format!("{window}=n/a"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

struct Summary {
    rsi: f64,
    rsi_days_beyond: usize,
    averages: String,
    trend: String,
    macd: Option<MacdPoint>,
    visible_bars: usize,
    range_high: f64,
    range_low: f64,
}

impl Presenter for TerminalReport {
    fn render(&self, symbol: &str, series: &PriceSeries, rsi: &[f64], ma_windows: &[usize]) {
        let Some(bar) = series.latest() else {
            return;
        };
        let summary = self.summarize(series, rsi, ma_windows);
        let macd = summary.macd.unwrap_or(MacdPoint {
            ema_slow: f64::NAN,
            ema_fast: f64::NAN,
            macd: f64::NAN,
            signal: f64::NAN,
            histogram: f64::NAN,
        });

        tracing::warn!(
            symbol = %symbol.to_uppercase(),
            date = %bar.date,
            open = bar.open,
            close = bar.close,
            volume = bar.volume,
            range_low = summary.range_low,
            range_high = summary.range_high,
            rsi = summary.rsi,
            rsi_days_beyond = summary.rsi_days_beyond,
            ema_fast = macd.ema_fast,
            ema_slow = macd.ema_slow,
            macd = macd.macd,
            signal = macd.signal,
            histogram = macd.histogram,
            visible_bars = summary.visible_bars,
            ema = %summary.trend,
            "SCREEN HIT: {}",
            summary.averages,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::series_from_closes;

    fn report() -> TerminalReport {
        TerminalReport::new(Macd::new(3, 5, 3).unwrap(), 30.0, 70.0)
    }

    #[test]
    fn summary_lists_requested_averages() {
        let closes: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let series = series_from_closes("AAPL", &closes);
        let summary = report().summarize(&series, &[80.0; 10], &[2, 4, 50]);
        assert_eq!(summary.averages, "2 SMA=9.50, 4 SMA=8.50, 50 SMA=n/a");
        assert!(summary.macd.is_some());
        assert_eq!(summary.visible_bars, 0);
        assert_eq!(summary.range_high, 10.0);
        assert_eq!(summary.range_low, 1.0);
    }

    #[test]
    fn summary_lists_exponential_averages() {
        let series = series_from_closes("AAPL", &[10.0; 6]);
        let summary = report().summarize(&series, &[50.0; 6], &[3, 6, 7]);
        assert_eq!(summary.trend, "3 EMA=10.00, 6 EMA=10.00, 7 EMA=n/a");
    }

    #[test]
    fn summary_counts_consecutive_extreme_rsi() {
        let series = series_from_closes("AAPL", &[1.0; 6]);
        let rsi = [50.0, 75.0, 60.0, 72.0, 80.0, 71.0];
        let summary = report().summarize(&series, &rsi, &[2]);
        assert_eq!(summary.rsi_days_beyond, 3);
        assert_eq!(summary.visible_bars, 5);
    }

    #[test]
    fn summary_without_macd_history() {
        let series = series_from_closes("SU", &[10.0, 11.0]);
        let summary = report().summarize(&series, &[100.0, 100.0], &[20, 200]);
        assert!(summary.macd.is_none());
        assert_eq!(summary.averages, "20 SMA=n/a, 200 SMA=n/a");
        assert_eq!(summary.trend, "20 EMA=n/a, 200 EMA=n/a");
    }

    #[test]
    fn render_does_not_panic_on_short_series() {
        let series = series_from_closes("SU", &[10.0, 11.0]);
        report().render("SU", &series, &[100.0, 100.0], &[20, 200]);
    }
}
