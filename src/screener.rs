use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use error_stack::Report;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScreenerConfig;
use crate::error::{FetchError, IndicatorError, ScreenError};
use crate::indicator::rsi::Rsi;
use crate::model::{Decision, PassReport, PriceSeries, ScreenOutcome, ScreenResult, SkipReason};
use crate::report::Presenter;
use crate::source::PriceSource;

/// RSI bounds; values strictly outside them are flagged.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub oversold: f64,
    pub overbought: f64,
}

impl Thresholds {
    pub fn classify(&self, rsi: f64) -> Decision {
        if rsi < self.oversold {
            Decision::Oversold
        } else if rsi > self.overbought {
            Decision::Overbought
        } else {
            Decision::Neutral
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

/// Per-run screener settings, built once from the validated config.
#[derive(Debug, Clone)]
pub struct ScreenSettings {
    pub rsi_period: usize,
    pub thresholds: Thresholds,
    pub lookback_days: u32,
    pub ma_windows: Vec<usize>,
    pub fetch_timeout: Duration,
    pub concurrency: usize,
}

impl ScreenSettings {
    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self {
            rsi_period: config.rsi_period,
            thresholds: Thresholds {
                oversold: config.oversold,
                overbought: config.overbought,
            },
            lookback_days: config.lookback_days,
            ma_windows: config.ma_windows.clone(),
            fetch_timeout: config.fetch_timeout(),
            concurrency: config.concurrency.max(1),
        }
    }
}

/// RSI series for an instrument together with the decision on its last value.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub result: ScreenResult,
    pub rsi: Vec<f64>,
}

/// Compute RSI over the series' closes and classify the latest value.
///
/// Pure: the same series and settings always give the same evaluation.
pub fn evaluate(
    series: &PriceSeries,
    rsi: &Rsi,
    thresholds: Thresholds,
) -> Result<Evaluation, Report<IndicatorError>> {
    let values = rsi.calculate_prices(&series.closes())?;
    let latest = values.last().copied().ok_or_else(|| {
        Report::new(IndicatorError::InsufficientData {
            required: rsi.period() + 1,
            available: 0,
        })
    })?;

    Ok(Evaluation {
        result: ScreenResult {
            symbol: series.symbol().to_owned(),
            latest_rsi: latest,
            decision: thresholds.classify(latest),
        },
        rsi: values,
    })
}

/// Runs screening passes over an instrument universe.
pub struct Screener {
    source: Arc<dyn PriceSource>,
    presenter: Arc<dyn Presenter>,
    rsi: Rsi,
    settings: ScreenSettings,
}

impl Screener {
    pub fn new(
        source: Arc<dyn PriceSource>,
        presenter: Arc<dyn Presenter>,
        settings: ScreenSettings,
    ) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            source,
            presenter,
            rsi: Rsi::new(settings.rsi_period)?,
            settings,
        })
    }

    /// Screen every symbol with bars ending at `end`.
    ///
    /// Per-instrument failures become `Skipped` outcomes; the pass itself only
    /// fails when `cancel` fires before it completes.
    pub async fn run_pass(
        &self,
        symbols: &[String],
        end: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<PassReport, Report<ScreenError>> {
        let start = end - chrono::Duration::days(i64::from(self.settings.lookback_days));
        info!(
            source = self.source.name(),
            instruments = symbols.len(),
            %start,
            %end,
            "screening pass started"
        );

        // buffered keeps universe order: one slot per instrument
        let pass = stream::iter(symbols)
            .map(|symbol| self.screen_one(symbol, start, end))
            .buffered(self.settings.concurrency)
            .collect::<Vec<_>>();

        let outcomes = tokio::select! {
            outcomes = pass => outcomes,
            () = cancel.cancelled() => {
                warn!("screening pass cancelled");
                return Err(Report::new(ScreenError::Aborted));
            }
        };

        let report = PassReport { outcomes };
        info!(
            flagged = report.flagged_count(),
            neutral = report.neutral_count(),
            skipped = report.skipped_count(),
            "screening pass complete"
        );
        Ok(report)
    }

    async fn screen_one(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> ScreenOutcome {
        info!(symbol, "fetching price data");

        let series = match self.fetch(symbol, start, end).await {
            Ok(series) => series,
            Err(e) => {
                warn!(symbol, error = ?e, "price fetch failed, skipping");
                return ScreenOutcome::Skipped {
                    symbol: symbol.to_owned(),
                    reason: SkipReason::Fetch,
                    detail: e.current_context().to_string(),
                };
            }
        };

        let evaluation = match evaluate(&series, &self.rsi, self.settings.thresholds) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!(symbol, bars = series.len(), error = ?e, "rsi unavailable, skipping");
                return ScreenOutcome::Skipped {
                    symbol: symbol.to_owned(),
                    reason: SkipReason::Indicator,
                    detail: e.current_context().to_string(),
                };
            }
        };

        let result = evaluation.result;
        if result.decision.is_flagged() {
            self.presenter
                .render(symbol, &series, &evaluation.rsi, &self.settings.ma_windows);
        } else {
            debug!(symbol, rsi = result.latest_rsi, "neutral");
        }

        ScreenOutcome::Screened(result)
    }

    async fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, Report<FetchError>> {
        let series = match tokio::time::timeout(
            self.settings.fetch_timeout,
            self.source.fetch(symbol, start, end),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Report::new(FetchError::Timeout {
                    symbol: symbol.to_owned(),
                })
                .attach(format!("timeout: {:?}", self.settings.fetch_timeout)));
            }
        };

        if series.is_empty() {
            return Err(Report::new(FetchError::NotFound {
                symbol: symbol.to_owned(),
            })
            .attach("source returned no bars"));
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use futures::future::BoxFuture;

    use super::*;
    use crate::model::series_from_closes;

    const UPTREND: &[f64] = &[
        44.0, 44.25, 44.5, 43.75, 44.5, 44.6, 45.1, 45.2, 44.9, 45.5, 45.8, 46.1, 46.4, 46.3, 46.9,
        47.2, 47.5, 47.9, 48.1, 48.6, 49.0, 49.3,
    ];

    const DOWNTREND: &[f64] = &[
        60.0, 59.5, 59.8, 59.0, 58.4, 58.6, 57.9, 57.2, 57.5, 56.8, 56.1, 55.7, 55.9, 55.0, 54.4,
        53.9, 54.1, 53.2, 52.6, 52.0, 51.7, 51.1,
    ];

    fn sideways() -> Vec<f64> {
        (0..30).map(|i| 50.0 + (i % 2) as f64).collect()
    }

    enum Canned {
        Closes(Vec<f64>),
        Fail,
        Hang,
    }

    struct FakeSource {
        data: HashMap<String, Canned>,
    }

    impl FakeSource {
        fn new(entries: Vec<(&str, Canned)>) -> Self {
            Self {
                data: entries
                    .into_iter()
                    .map(|(s, c)| (s.to_owned(), c))
                    .collect(),
            }
        }
    }

    impl PriceSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        fn fetch(
            &self,
            symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> BoxFuture<'_, Result<PriceSeries, Report<FetchError>>> {
            let symbol = symbol.to_owned();
            Box::pin(async move {
                match self.data.get(&symbol) {
                    Some(Canned::Closes(closes)) => Ok(series_from_closes(&symbol, closes)),
                    Some(Canned::Hang) => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Err(Report::new(FetchError::Request { symbol }))
                    }
                    Some(Canned::Fail) | None => Err(Report::new(FetchError::Request { symbol })),
                }
            })
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        calls: Mutex<Vec<(String, usize, Vec<usize>)>>,
    }

    impl Presenter for RecordingPresenter {
        fn render(&self, symbol: &str, series: &PriceSeries, rsi: &[f64], ma_windows: &[usize]) {
            assert_eq!(series.len(), rsi.len());
            self.calls
                .lock()
                .unwrap()
                .push((symbol.to_owned(), rsi.len(), ma_windows.to_vec()));
        }
    }

    fn settings() -> ScreenSettings {
        ScreenSettings {
            rsi_period: 14,
            thresholds: Thresholds::default(),
            lookback_days: 365,
            ma_windows: vec![20, 200],
            fetch_timeout: Duration::from_secs(5),
            concurrency: 2,
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn end_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    #[test]
    fn classify_uses_strict_bounds() {
        let t = Thresholds::default();
        assert_eq!(t.classify(29.99), Decision::Oversold);
        assert_eq!(t.classify(30.0), Decision::Neutral);
        assert_eq!(t.classify(70.0), Decision::Neutral);
        assert_eq!(t.classify(70.01), Decision::Overbought);
    }

    #[test]
    fn evaluate_uptrend_is_overbought() {
        let series = series_from_closes("UP", UPTREND);
        let eval = evaluate(&series, &Rsi::default(), Thresholds::default()).unwrap();
        assert!(eval.result.latest_rsi > 70.0);
        assert_eq!(eval.result.decision, Decision::Overbought);
        assert_eq!(eval.rsi.len(), UPTREND.len());
    }

    #[test]
    fn evaluate_downtrend_is_oversold() {
        let series = series_from_closes("DOWN", DOWNTREND);
        let eval = evaluate(&series, &Rsi::default(), Thresholds::default()).unwrap();
        assert_eq!(eval.result.decision, Decision::Oversold);
    }

    #[test]
    fn evaluate_is_deterministic() {
        let series = series_from_closes("SIDE", &sideways());
        let rsi = Rsi::default();
        let first = evaluate(&series, &rsi, Thresholds::default()).unwrap();
        let second = evaluate(&series, &rsi, Thresholds::default()).unwrap();
        assert_eq!(first.result, second.result);
        assert_eq!(first.result.decision, Decision::Neutral);
    }

    #[test]
    fn evaluate_short_series_is_insufficient() {
        let series = series_from_closes("NEW", &[10.0; 14]);
        let err = evaluate(&series, &Rsi::default(), Thresholds::default()).unwrap_err();
        assert!(matches!(
            err.current_context(),
            IndicatorError::InsufficientData { .. }
        ));
    }

    #[tokio::test]
    async fn overbought_instrument_emits_one_render() {
        let source = Arc::new(FakeSource::new(vec![("UP", Canned::Closes(UPTREND.to_vec()))]));
        let presenter = Arc::new(RecordingPresenter::default());
        let screener = Screener::new(source, presenter.clone(), settings()).unwrap();

        let report = screener
            .run_pass(&symbols(&["UP"]), end_date(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.flagged_count(), 1);
        let calls = presenter.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("UP".to_owned(), UPTREND.len(), vec![20, 200]));
    }

    #[tokio::test]
    async fn fetch_failure_is_isolated() {
        let source = Arc::new(FakeSource::new(vec![
            ("AAA", Canned::Closes(UPTREND.to_vec())),
            ("BBB", Canned::Closes(sideways())),
            ("CCC", Canned::Fail),
            ("DDD", Canned::Closes(DOWNTREND.to_vec())),
            ("EEE", Canned::Closes(sideways())),
        ]));
        let presenter = Arc::new(RecordingPresenter::default());
        let screener = Screener::new(source, presenter.clone(), settings()).unwrap();

        let universe = symbols(&["AAA", "BBB", "CCC", "DDD", "EEE"]);
        let report = screener
            .run_pass(&universe, end_date(), &CancellationToken::new())
            .await
            .unwrap();

        let order: Vec<&str> = report.outcomes.iter().map(|o| o.symbol()).collect();
        assert_eq!(order, vec!["AAA", "BBB", "CCC", "DDD", "EEE"]);
        assert!(matches!(
            &report.outcomes[2],
            ScreenOutcome::Skipped {
                reason: SkipReason::Fetch,
                ..
            }
        ));
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.flagged_count(), 2);
        assert_eq!(report.neutral_count(), 2);
        assert_eq!(presenter.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn short_history_is_skipped_not_fatal() {
        let source = Arc::new(FakeSource::new(vec![
            ("IPO", Canned::Closes(vec![10.0; 5])),
            ("UP", Canned::Closes(UPTREND.to_vec())),
        ]));
        let presenter = Arc::new(RecordingPresenter::default());
        let screener = Screener::new(source, presenter.clone(), settings()).unwrap();

        let report = screener
            .run_pass(&symbols(&["IPO", "UP"]), end_date(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            &report.outcomes[0],
            ScreenOutcome::Skipped {
                reason: SkipReason::Indicator,
                ..
            }
        ));
        assert_eq!(report.flagged_count(), 1);
    }

    #[tokio::test]
    async fn empty_series_is_a_fetch_skip() {
        let source = Arc::new(FakeSource::new(vec![
            ("GONE", Canned::Closes(Vec::new())),
            ("UP", Canned::Closes(UPTREND.to_vec())),
        ]));
        let presenter = Arc::new(RecordingPresenter::default());
        let screener = Screener::new(source, presenter.clone(), settings()).unwrap();

        let report = screener
            .run_pass(&symbols(&["GONE", "UP"]), end_date(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            &report.outcomes[0],
            ScreenOutcome::Skipped {
                reason: SkipReason::Fetch,
                ..
            }
        ));
        assert_eq!(report.flagged_count(), 1);
    }

    #[tokio::test]
    async fn slow_fetch_times_out_as_fetch_failure() {
        let source = Arc::new(FakeSource::new(vec![
            ("SLOW", Canned::Hang),
            ("UP", Canned::Closes(UPTREND.to_vec())),
        ]));
        let presenter = Arc::new(RecordingPresenter::default());
        let mut s = settings();
        s.fetch_timeout = Duration::from_millis(50);
        let screener = Screener::new(source, presenter, s).unwrap();

        let report = screener
            .run_pass(&symbols(&["SLOW", "UP"]), end_date(), &CancellationToken::new())
            .await
            .unwrap();

        match &report.outcomes[0] {
            ScreenOutcome::Skipped { reason, detail, .. } => {
                assert_eq!(*reason, SkipReason::Fetch);
                assert!(detail.contains("timed out"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(report.flagged_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_pass_is_aborted() {
        let source = Arc::new(FakeSource::new(vec![("SLOW", Canned::Hang)]));
        let presenter = Arc::new(RecordingPresenter::default());
        let screener = Screener::new(source, presenter, settings()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = screener
            .run_pass(&symbols(&["SLOW"]), end_date(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ScreenError::Aborted));
    }

    #[test]
    fn zero_rsi_period_rejected_at_construction() {
        let source = Arc::new(FakeSource::new(vec![]));
        let presenter = Arc::new(RecordingPresenter::default());
        let mut s = settings();
        s.rsi_period = 0;
        assert!(Screener::new(source, presenter, s).is_err());
    }
}
