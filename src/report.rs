pub mod terminal;

use crate::model::PriceSeries;

/// Sink for instruments the screener flags.
pub trait Presenter: Send + Sync {
    fn render(&self, symbol: &str, series: &PriceSeries, rsi: &[f64], ma_windows: &[usize]);
}
