use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::model::{PriceBar, PriceSeries};
use crate::source::PriceSource;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) stock-screener";

/// Daily bars from Yahoo Finance's v8 chart endpoint.
pub struct YahooSource {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl YahooSource {
    pub fn new(base_url: impl Into<String>, requests_per_second: NonZeroU32) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second))),
        }
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, Report<FetchError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let url = chart_url(&self.base_url, symbol)?;
        let period1 = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive; include the whole end day
        let period2 = (end + chrono::Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let params = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_owned()),
        ];

        debug!(symbol, %start, %end, "requesting yahoo chart");

        let response = self
            .client
            .get(url)
            .query(&params)
            .send()
            .await
            .change_context_lazy(|| FetchError::Request {
                symbol: symbol.to_owned(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Report::new(FetchError::NotFound {
                symbol: symbol.to_owned(),
            }));
        }
        if !status.is_success() {
            return Err(Report::new(FetchError::Status {
                symbol: symbol.to_owned(),
                status: status.as_u16(),
            }));
        }

        let chart: ChartResponse =
            response
                .json()
                .await
                .change_context_lazy(|| FetchError::ResponseParse {
                    symbol: symbol.to_owned(),
                })?;

        let series = chart.into_series(symbol)?;

        info!(symbol, bars = series.len(), "yahoo chart fetch complete");
        Ok(series)
    }
}

/// `{base_url}/v8/finance/chart/{symbol}` with the symbol as one encoded segment.
fn chart_url(base_url: &str, symbol: &str) -> Result<reqwest::Url, Report<FetchError>> {
    let request_error = || FetchError::Request {
        symbol: symbol.to_owned(),
    };
    let mut url = reqwest::Url::parse(base_url)
        .change_context_lazy(request_error)
        .attach_with(|| format!("base_url: {base_url}"))?;
    url.path_segments_mut()
        .map_err(|()| Report::new(request_error()).attach(format!("base_url: {base_url}")))?
        .pop_if_empty()
        .extend(["v8", "finance", "chart", symbol]);
    Ok(url)
}

impl PriceSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BoxFuture<'_, Result<PriceSeries, Report<FetchError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move { self.fetch_chart(&symbol, start, end).await })
    }
}

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

impl ChartResponse {
    fn into_series(self, symbol: &str) -> Result<PriceSeries, Report<FetchError>> {
        let not_found = || FetchError::NotFound {
            symbol: symbol.to_owned(),
        };
        let parse_error = || FetchError::ResponseParse {
            symbol: symbol.to_owned(),
        };

        if let Some(err) = self.chart.error {
            return Err(Report::new(not_found())
                .attach(format!("{}: {}", err.code, err.description)));
        }

        let data = self
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| Report::new(not_found()))?;
        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| Report::new(parse_error()).attach("no quote block"))?;

        let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();

        let mut bars: Vec<PriceBar> = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            // Holidays and halted sessions come back as all-null rows
            let (Some(open), Some(high), Some(low), Some(close)) = (
                at(&quote.open, i),
                at(&quote.high, i),
                at(&quote.low, i),
                at(&quote.close, i),
            ) else {
                continue;
            };
            let date = DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| Report::new(parse_error()).attach(format!("timestamp: {ts}")))?;

            // Intraday refreshes can repeat the last session's date
            if bars.last().is_some_and(|b| b.date == date) {
                bars.pop();
            }
            bars.push(PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume: at(&quote.volume, i).unwrap_or(0.0),
            });
        }

        if bars.is_empty() {
            return Err(Report::new(not_found()));
        }

        PriceSeries::new(symbol, bars).change_context_lazy(|| FetchError::Series {
            symbol: symbol.to_owned(),
        })
    }
}
