//! Yahoo Finance data provider.
//!
//! Fetches daily OHLCV bars from Yahoo's v8 chart API and flattens the nested
//! `indicators.quote[0]` / `indicators.adjclose[0]` arrays into one row per
//! timestamp.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. The CSV import provider is the fallback when Yahoo is unavailable.

use super::provider::{clip_to_range, DataError, DataProvider, DataSource, FetchResult};
use crate::domain::RawBar;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
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
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Longest wait between two retries.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: 0,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Retry transient failures (429, 5xx, connect/timeout) up to `retries` times
    /// with exponential backoff. Defaults to zero: the caller owns retry policy.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Build the chart API URL for a symbol and the closed-open range `[start, end)`.
    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d\
             &includeAdjustedClose=true"
        )
    }

    /// Parse the chart API response into RawBars.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<RawBar>, DataError> {
        let result = match resp.chart.result {
            Some(result) => result,
            None => {
                return match resp.chart.error {
                    Some(err) if err.code == "Not Found" => {
                        warn!(symbol, "yahoo reports unknown symbol, returning no rows");
                        Ok(Vec::new())
                    }
                    Some(err) => Err(DataError::ResponseFormatChanged(format!(
                        "{}: {}",
                        err.code, err.description
                    ))),
                    None => Err(DataError::ResponseFormatChanged(
                        "empty result with no error".into(),
                    )),
                };
            }
        };

        let Some(data) = result.into_iter().next() else {
            return Ok(Vec::new());
        };

        // No timestamps means no trading days in the requested window.
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let bar = RawBar {
                date,
                open: quote.open.get(i).copied().flatten(),
                high: quote.high.get(i).copied().flatten(),
                low: quote.low.get(i).copied().flatten(),
                close: quote.close.get(i).copied().flatten(),
                adj_close: adj_closes.as_ref().and_then(|v| v.get(i).copied().flatten()),
                volume: quote.volume.get(i).copied().flatten(),
            };

            // Rows with no OHLCV at all are holidays Yahoo pads into the series.
            if bar.is_void() {
                continue;
            }
            bars.push(bar);
        }

        Ok(bars)
    }

    /// One GET of the chart endpoint.
    fn request_once(&self, symbol: &str, url: &str) -> Result<Vec<RawBar>, Attempt> {
        let resp = self.client.get(url).send().map_err(|e| {
            let err = DataError::NetworkUnreachable(e.to_string());
            if e.is_connect() || e.is_timeout() {
                Attempt::Transient(err)
            } else {
                Attempt::Fatal(err)
            }
        })?;

        let status = resp.status();
        match status {
            // Yahoo answers an unknown symbol with 404 and a "Not Found" chart error.
            reqwest::StatusCode::NOT_FOUND => {
                return match resp.json::<ChartResponse>() {
                    Ok(chart) => Self::parse_response(symbol, chart).map_err(Attempt::Fatal),
                    Err(_) => Ok(Vec::new()),
                };
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(Attempt::Transient(DataError::RateLimited { retry_after_secs }));
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(Attempt::Fatal(DataError::AuthenticationRequired(format!(
                    "yahoo refused {symbol} ({status})"
                ))));
            }
            s if !s.is_success() => {
                return Err(Attempt::Transient(DataError::Http(format!(
                    "HTTP {status} for {symbol}"
                ))));
            }
            _ => {}
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            Attempt::Fatal(DataError::ResponseFormatChanged(format!(
                "unreadable chart body for {symbol}: {e}"
            )))
        })?;
        Self::parse_response(symbol, chart).map_err(Attempt::Fatal)
    }

    /// Delay before retry number `attempt + 1`: doubling from the base delay,
    /// capped at `MAX_BACKOFF`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(2u32.saturating_pow(attempt))
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// Request the chart, backing off exponentially between transient failures.
    fn download(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, DataError> {
        let url = Self::chart_url(symbol, start, end);
        debug!(symbol, %url, "requesting yahoo chart");

        let mut attempt = 0;
        loop {
            match self.request_once(symbol, &url) {
                Ok(bars) => return Ok(bars),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Transient(err)) if attempt >= self.max_retries => return Err(err),
                Err(Attempt::Transient(err)) => {
                    let delay = self.backoff_delay(attempt);
                    warn!(symbol, attempt, error = %err, ?delay, "transient yahoo failure, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Outcome of a failed request: worth retrying or not.
enum Attempt {
    Transient(DataError),
    Fatal(DataError),
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        if start >= end {
            return Ok(FetchResult {
                symbol: symbol.to_string(),
                bars: Vec::new(),
                source: DataSource::YahooFinance,
            });
        }
        let bars = self.download(symbol, start, end)?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars: clip_to_range(bars, start, end),
            source: DataSource::YahooFinance,
        })
    }
}
