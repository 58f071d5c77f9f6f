//! RawBar: one ticker's OHLCV row for one trading day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar as delivered by a provider, before any cleaning.
///
/// Every numeric field is optional: feeds carry gaps, and the cleaning pass
/// decides how to fill them. `adj_close` is absent in some provider schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<f64>,
}

impl RawBar {
    /// Bar with every price equal to `close` and the given volume.
    pub fn flat(date: NaiveDate, close: f64, volume: f64) -> Self {
        Self {
            date,
            open: Some(close),
            high: Some(close),
            low: Some(close),
            close: Some(close),
            adj_close: Some(close),
            volume: Some(volume),
        }
    }

    /// True when no OHLCV field carries a value (holiday rows in some feeds).
    pub fn is_void(&self) -> bool {
        self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
    }

    /// True if any price or volume field is missing.
    pub fn has_gaps(&self) -> bool {
        self.open.is_none()
            || self.high.is_none()
            || self.low.is_none()
            || self.close.is_none()
            || self.adj_close.is_none()
            || self.volume.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> RawBar {
        RawBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: Some(100.0),
            high: Some(105.0),
            low: Some(98.0),
            close: Some(103.0),
            adj_close: Some(103.0),
            volume: Some(50_000.0),
        }
    }

    #[test]
    fn complete_bar_has_no_gaps() {
        let bar = sample_bar();
        assert!(!bar.has_gaps());
        assert!(!bar.is_void());
    }

    #[test]
    fn missing_close_is_a_gap_not_void() {
        let mut bar = sample_bar();
        bar.close = None;
        assert!(bar.has_gaps());
        assert!(!bar.is_void());
    }

    #[test]
    fn void_ignores_adj_close() {
        let bar = RawBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            open: None,
            high: None,
            low: None,
            close: None,
            adj_close: Some(1.0),
            volume: None,
        };
        assert!(bar.is_void());
    }

    #[test]
    fn flat_bar_repeats_close() {
        let bar = RawBar::flat(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 7.5, 10.0);
        assert_eq!(bar.open, Some(7.5));
        assert_eq!(bar.adj_close, Some(7.5));
        assert_eq!(bar.volume, Some(10.0));
    }
}
