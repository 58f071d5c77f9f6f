//! Synthetic data provider.
//!
//! Produces a deterministic random walk per symbol (seeded from the symbol
//! name) on weekdays. Intended for offline development and demos; bars are
//! tagged `DataSource::Synthetic`. No bar is ever produced after "today", so a
//! future date range yields zero rows just like a real feed.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, DataProvider, DataSource, FetchResult};
use crate::domain::RawBar;

pub struct SyntheticProvider {
    today: Option<NaiveDate>,
    start_price: f64,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self {
            today: None,
            start_price: 100.0,
        }
    }

    /// Pin the date treated as "today" (bars stop before the following day).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Generate the walk for `[start, end)`.
    ///
    /// The walk always starts at `start`, so the same symbol and start date
    /// reproduce the same prices.
    pub fn generate(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawBar> {
        let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let stop = end.min(self.today() + chrono::Duration::days(1));
        let mut bars = Vec::new();
        let mut price = self.start_price;
        let mut current = start;

        while current < stop {
            let weekday = current.weekday();
            if weekday == Weekday::Sat || weekday == Weekday::Sun {
                current += chrono::Duration::days(1);
                continue;
            }

            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            let open = price;
            let close = price * (1.0 + daily_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000..5_000_000u64) as f64;

            bars.push(RawBar {
                date: current,
                open: Some(open),
                high: Some(high),
                low: Some(low),
                close: Some(close),
                adj_close: Some(close),
                volume: Some(volume),
            });

            price = close;
            current += chrono::Duration::days(1);
        }

        bars
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars: self.generate(symbol, start, end),
            source: DataSource::Synthetic,
        })
    }
}
