use std::fmt;

use chrono::NaiveDate;
use error_stack::{Report, bail};
use serde::{Deserialize, Serialize};

use crate::error::SeriesError;

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily bars for a single instrument, oldest first.
///
/// Dates are strictly increasing; `new` rejects duplicates and out-of-order
/// bars so indicator code can rely on the ordering.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self, Report<SeriesError>> {
        if let Some(pos) = bars.windows(2).position(|w| w[1].date <= w[0].date) {
            bail!(SeriesError::Unordered { index: pos + 1 });
        }
        Ok(Self {
            symbol: symbol.into(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// Closing prices in bar order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Outcome of applying the RSI thresholds to the latest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Oversold,
    Overbought,
    Neutral,
}

impl Decision {
    pub fn is_flagged(self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversold => write!(f, "oversold"),
            Self::Overbought => write!(f, "overbought"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenResult {
    pub symbol: String,
    pub latest_rsi: f64,
    pub decision: Decision,
}

/// Why an instrument produced no `ScreenResult` in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Fetch,
    Indicator,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Indicator => write!(f, "indicator"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScreenOutcome {
    Screened(ScreenResult),
    Skipped {
        symbol: String,
        reason: SkipReason,
        detail: String,
    },
}

impl ScreenOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Screened(result) => &result.symbol,
            Self::Skipped { symbol, .. } => symbol,
        }
    }
}

/// All outcomes of one pass, in universe order.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub outcomes: Vec<ScreenOutcome>,
}

impl PassReport {
    pub fn flagged(&self) -> impl Iterator<Item = &ScreenResult> {
        self.outcomes.iter().filter_map(|o| match o {
            ScreenOutcome::Screened(r) if r.decision.is_flagged() => Some(r),
            _ => None,
        })
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged().count()
    }

    pub fn neutral_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScreenOutcome::Screened(r) if !r.decision.is_flagged()))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScreenOutcome::Skipped { .. }))
            .count()
    }
}

#[cfg(test)]
pub(crate) fn series_from_closes(symbol: &str, closes: &[f64]) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar {
            date: start + chrono::Duration::days(i as i64),
            open: c,
            high: c,
            low: c,
            close: c,
            volume: 1_000.0,
        })
        .collect();
    PriceSeries::new(symbol, bars).expect("ordered bars")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn series_rejects_duplicate_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let result = PriceSeries::new("AAPL", vec![bar(d, 1.0), bar(d, 2.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn series_rejects_out_of_order_dates() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let err = PriceSeries::new("AAPL", vec![bar(d1, 1.0), bar(d2, 2.0), bar(d3, 3.0)])
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            SeriesError::Unordered { index: 2 }
        ));
    }

    #[test]
    fn closes_follow_bar_order() {
        let series = series_from_closes("MSFT", &[1.0, 2.5, 3.0]);
        assert_eq!(series.closes(), vec![1.0, 2.5, 3.0]);
        assert_eq!(series.latest().map(|b| b.close), Some(3.0));
        assert_eq!(series.symbol(), "MSFT");
        assert!(!series.is_empty());

        let empty = PriceSeries::new("MSFT", Vec::new()).unwrap();
        assert!(empty.is_empty());
        assert!(empty.latest().is_none());
    }

    #[test]
    fn decision_display_and_serde() {
        assert_eq!(Decision::Overbought.to_string(), "overbought");
        let json = serde_json::to_string(&Decision::Oversold).unwrap();
        assert_eq!(json, "\"oversold\"");
        assert!(!Decision::Neutral.is_flagged());
    }

    #[test]
    fn pass_report_counts() {
        let report = PassReport {
            outcomes: vec![
                ScreenOutcome::Screened(ScreenResult {
                    symbol: "A".into(),
                    latest_rsi: 80.0,
                    decision: Decision::Overbought,
                }),
                ScreenOutcome::Screened(ScreenResult {
                    symbol: "B".into(),
                    latest_rsi: 50.0,
                    decision: Decision::Neutral,
                }),
                ScreenOutcome::Skipped {
                    symbol: "C".into(),
                    reason: SkipReason::Fetch,
                    detail: "timeout".into(),
                },
            ],
        };
        assert_eq!(report.flagged_count(), 1);
        assert_eq!(report.neutral_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.outcomes[2].symbol(), "C");
    }
}
