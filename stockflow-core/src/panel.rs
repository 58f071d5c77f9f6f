//! Panel table: every ticker's raw bars for one partition, keyed by (Date, Ticker).
//!
//! Rows keep concatenation order (tickers as requested, then file order). Feature
//! columns are computed per ticker group in ascending date order and stored
//! back in row order, so the table never needs to be re-sorted.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::domain::{PartitionKey, RawBar};
use crate::error::EtlError;
use crate::features::{
    crossover, ema_column, ema_of_series, pct_change, roll_avg_column, rolling_mean,
    TransformParams, CROSSOVER_COLUMN, DAILY_RETURN_COLUMN,
};
use crate::output::{ConsolidatedTable, FeatureRow};

/// One (Date, Ticker) row of the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub ticker: String,
    pub bar: RawBar,
}

impl PanelRow {
    pub fn key(&self) -> (NaiveDate, &str) {
        (self.bar.date, self.ticker.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Panel {
    partition: PartitionKey,
    rows: Vec<PanelRow>,
    daily_return: Option<Vec<Option<f64>>>,
    rolling: BTreeMap<usize, Vec<Option<f64>>>,
    ema: BTreeMap<usize, Vec<Option<f64>>>,
    crossover: BTreeMap<(usize, usize), Vec<i8>>,
}

impl Panel {
    /// Concatenate per-ticker bars into one table.
    ///
    /// Duplicate (Date, Ticker) keys keep their first occurrence. Fails with
    /// `EmptyInput` when no ticker contributed a row.
    pub fn from_partition(
        partition: &PartitionKey,
        tickers: Vec<(String, Vec<RawBar>)>,
    ) -> Result<Self, EtlError> {
        let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();
        let mut rows = Vec::new();

        for (ticker, bars) in tickers {
            if bars.is_empty() {
                warn!(%partition, ticker = %ticker, "ticker has no rows");
                continue;
            }
            let mut dropped = 0usize;
            for bar in bars {
                if !seen.insert((bar.date, ticker.clone())) {
                    dropped += 1;
                    continue;
                }
                rows.push(PanelRow {
                    ticker: ticker.clone(),
                    bar,
                });
            }
            if dropped > 0 {
                warn!(%partition, ticker = %ticker, dropped, "dropped duplicate (Date, Ticker) rows");
            }
        }

        if rows.is_empty() {
            return Err(EtlError::EmptyInput {
                partition: partition.to_string(),
            });
        }
        debug!(%partition, rows = rows.len(), "panel assembled");

        Ok(Self {
            partition: partition.clone(),
            rows,
            daily_return: None,
            rolling: BTreeMap::new(),
            ema: BTreeMap::new(),
            crossover: BTreeMap::new(),
        })
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct tickers in first-appearance order.
    pub fn tickers(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|r| r.ticker.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Row count per ticker.
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.ticker.clone()).or_insert(0) += 1;
        }
        counts
    }

    // ── Cleaning ────────────────────────────────────────────────────

    /// Fill gaps in row order across the whole table.
    ///
    /// Price columns are forward-filled and volume is back-filled. Leading (for
    /// prices) or trailing (for volume) gaps have nothing to fill from and stay
    /// `None`. Returns the number of cells filled; when any cell changes, feature
    /// columns computed earlier are discarded.
    pub fn clean(&mut self) -> usize {
        let mut filled = 0usize;

        let mut last: [Option<f64>; 5] = [None; 5];
        for row in &mut self.rows {
            let bar = &mut row.bar;
            let cells = [
                &mut bar.open,
                &mut bar.high,
                &mut bar.low,
                &mut bar.close,
                &mut bar.adj_close,
            ];
            for (cell, carry) in cells.into_iter().zip(last.iter_mut()) {
                if cell.is_some() {
                    *carry = *cell;
                } else if carry.is_some() {
                    *cell = *carry;
                    filled += 1;
                }
            }
        }

        let mut next: Option<f64> = None;
        for row in self.rows.iter_mut().rev() {
            if row.bar.volume.is_some() {
                next = row.bar.volume;
            } else if next.is_some() {
                row.bar.volume = next;
                filled += 1;
            }
        }

        let remaining = self.rows.iter().filter(|r| r.bar.has_gaps()).count();
        if remaining > 0 {
            warn!(partition = %self.partition, rows = remaining, "gaps left after cleaning");
        }
        if filled > 0 {
            debug!(partition = %self.partition, filled, "filled missing cells");
            self.daily_return = None;
            self.rolling.clear();
            self.ema.clear();
            self.crossover.clear();
        }
        filled
    }

    // ── Features ────────────────────────────────────────────────────

    /// Row indices per ticker, each sorted by date.
    fn groups(&self) -> BTreeMap<&str, Vec<usize>> {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            groups.entry(row.ticker.as_str()).or_default().push(i);
        }
        for indices in groups.values_mut() {
            indices.sort_by_key(|&i| self.rows[i].bar.date);
        }
        groups
    }

    /// Run `f` over each ticker's closes in date order and scatter the output
    /// back to row positions.
    fn per_group<T, F>(&self, fill: T, f: F) -> Vec<T>
    where
        T: Copy,
        F: Fn(&[Option<f64>]) -> Vec<T>,
    {
        let mut out = vec![fill; self.rows.len()];
        for indices in self.groups().values() {
            let closes: Vec<Option<f64>> =
                indices.iter().map(|&i| self.rows[i].bar.close).collect();
            for (&i, value) in indices.iter().zip(f(&closes)) {
                out[i] = value;
            }
        }
        out
    }

    pub fn add_daily_return(&mut self) {
        self.daily_return = Some(self.per_group(None, pct_change));
    }

    pub fn add_rolling_average(&mut self, window: usize) -> Result<(), EtlError> {
        if window == 0 {
            return Err(EtlError::InvalidParameter(
                "rolling window must be >= 1".into(),
            ));
        }
        let values = self.per_group(None, |closes| rolling_mean(closes, window));
        self.rolling.insert(window, values);
        Ok(())
    }

    pub fn add_ema(&mut self, span: usize) -> Result<(), EtlError> {
        if span == 0 {
            return Err(EtlError::InvalidParameter("EMA span must be >= 1".into()));
        }
        let values = self.per_group(None, |closes| ema_of_series(closes, span));
        self.ema.insert(span, values);
        Ok(())
    }

    /// Row-wise sign of `RollAvg{window}Days - EMA{span}`.
    ///
    /// Both input columns must already exist.
    pub fn add_crossover(&mut self, window: usize, span: usize) -> Result<(), EtlError> {
        let roll = self.rolling.get(&window).ok_or_else(|| EtlError::MissingFeature {
            column: roll_avg_column(window),
        })?;
        let ema = self.ema.get(&span).ok_or_else(|| EtlError::MissingFeature {
            column: ema_column(span),
        })?;

        let signs = roll
            .iter()
            .zip(ema)
            .map(|(&r, &e)| crossover(r, e))
            .collect();
        self.crossover.insert((window, span), signs);
        Ok(())
    }

    pub fn daily_return(&self) -> Option<&[Option<f64>]> {
        self.daily_return.as_deref()
    }

    pub fn rolling_average(&self, window: usize) -> Option<&[Option<f64>]> {
        self.rolling.get(&window).map(Vec::as_slice)
    }

    pub fn ema(&self, span: usize) -> Option<&[Option<f64>]> {
        self.ema.get(&span).map(Vec::as_slice)
    }

    pub fn crossover(&self, window: usize, span: usize) -> Option<&[i8]> {
        self.crossover.get(&(window, span)).map(Vec::as_slice)
    }

    /// Run every feature for `params` in dependency order.
    pub fn add_features(&mut self, params: &TransformParams) -> Result<(), EtlError> {
        self.add_daily_return();
        self.add_rolling_average(params.roll_window)?;
        self.add_ema(params.ema_span)?;
        self.add_crossover(params.roll_window, params.ema_span)
    }

    /// Freeze the panel into the consolidated output table.
    pub fn into_consolidated(self, params: TransformParams) -> Result<ConsolidatedTable, EtlError> {
        let missing = |column: String| EtlError::MissingFeature { column };

        let daily_return = self
            .daily_return
            .ok_or_else(|| missing(DAILY_RETURN_COLUMN.to_string()))?;
        let mut rolling = self.rolling;
        let mut ema = self.ema;
        let mut crossovers = self.crossover;
        let roll = rolling
            .remove(&params.roll_window)
            .ok_or_else(|| missing(params.roll_avg_column()))?;
        let ema = ema
            .remove(&params.ema_span)
            .ok_or_else(|| missing(params.ema_column()))?;
        let signs = crossovers
            .remove(&(params.roll_window, params.ema_span))
            .ok_or_else(|| missing(CROSSOVER_COLUMN.to_string()))?;

        let rows = self
            .rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| FeatureRow {
                date: row.bar.date,
                ticker: row.ticker,
                open: row.bar.open,
                high: row.bar.high,
                low: row.bar.low,
                close: row.bar.close,
                adj_close: row.bar.adj_close,
                volume: row.bar.volume,
                daily_return: daily_return[i],
                roll_avg: roll[i],
                ema: ema[i],
                crossover: signs[i],
            })
            .collect();

        Ok(ConsolidatedTable::new(params, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn key() -> PartitionKey {
        PartitionKey::parse("2024_06_03").unwrap()
    }

    fn series(closes: &[f64]) -> Vec<RawBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| RawBar::flat(d(i as u32 + 2), c, 1000.0))
            .collect()
    }

    #[test]
    fn all_empty_is_empty_input() {
        let err = Panel::from_partition(
            &key(),
            vec![("AAPL".into(), vec![]), ("MSFT".into(), vec![])],
        )
        .unwrap_err();
        assert!(matches!(err, EtlError::EmptyInput { partition } if partition == "2024_06_03"));
    }

    #[test]
    fn concatenates_in_ticker_order_and_drops_duplicates() {
        let mut aapl = series(&[1.0, 2.0]);
        aapl.push(RawBar::flat(d(2), 99.0, 1.0));
        let panel = Panel::from_partition(
            &key(),
            vec![("AAPL".into(), aapl), ("MSFT".into(), series(&[5.0]))],
        )
        .unwrap();

        assert_eq!(panel.len(), 3);
        assert_eq!(panel.tickers(), vec!["AAPL", "MSFT"]);
        assert_eq!(panel.rows()[0].bar.close, Some(1.0), "first occurrence wins");
        assert_eq!(panel.row_counts()["AAPL"], 2);
    }

    #[test]
    fn mid_series_gap_is_forward_filled() {
        let mut bars = series(&[10.0, 11.0, 12.0]);
        bars[1].close = None;
        bars[1].volume = None;
        let mut panel = Panel::from_partition(&key(), vec![("AAPL".into(), bars)]).unwrap();

        assert_eq!(panel.clean(), 2);
        assert_eq!(panel.rows()[1].bar.close, Some(10.0));
        assert_eq!(panel.rows()[1].bar.volume, Some(1000.0), "volume back-filled");
    }

    #[test]
    fn fill_crosses_ticker_boundaries_in_row_order() {
        let mut msft = series(&[50.0, 51.0]);
        msft[0].open = None;
        let mut aapl = series(&[1.0, 2.0]);
        aapl[1].volume = None;
        msft[0].volume = None;
        let mut panel = Panel::from_partition(
            &key(),
            vec![("AAPL".into(), aapl), ("MSFT".into(), msft)],
        )
        .unwrap();
        panel.clean();

        // MSFT's first open comes from AAPL's last row.
        assert_eq!(panel.rows()[2].bar.open, Some(2.0));
        // AAPL's last volume comes from MSFT's second row.
        assert_eq!(panel.rows()[1].bar.volume, Some(1000.0));
    }

    #[test]
    fn leading_gap_stays_none() {
        let mut bars = series(&[10.0, 11.0]);
        bars[0].close = None;
        let mut panel = Panel::from_partition(&key(), vec![("AAPL".into(), bars)]).unwrap();
        panel.clean();
        assert_eq!(panel.rows()[0].bar.close, None);
        assert_eq!(panel.rows()[1].bar.close, Some(11.0));
    }

    #[test]
    fn clean_is_idempotent() {
        let mut bars = series(&[10.0, 11.0, 12.0]);
        bars[2].high = None;
        bars[0].volume = None;
        let mut panel = Panel::from_partition(&key(), vec![("AAPL".into(), bars)]).unwrap();
        panel.clean();
        let once = panel.rows().to_vec();
        assert_eq!(panel.clean(), 0);
        assert_eq!(panel.rows(), once.as_slice());
    }

    #[test]
    fn features_follow_date_order_within_ticker() {
        let mut bars = series(&[1.0, 2.0, 3.0]);
        bars.reverse();
        let mut panel = Panel::from_partition(&key(), vec![("AAPL".into(), bars)]).unwrap();
        panel.add_daily_return();
        let dr = panel.daily_return().unwrap();
        // Row 2 holds the earliest date.
        assert_eq!(dr[2], None);
        assert_eq!(dr[1], Some(1.0));
        assert_eq!(dr[0], Some(0.5));
    }

    #[test]
    fn groups_do_not_leak_into_each_other() {
        let mut panel = Panel::from_partition(
            &key(),
            vec![
                ("AAPL".into(), series(&[1.0, 2.0])),
                ("MSFT".into(), series(&[100.0, 200.0])),
            ],
        )
        .unwrap();
        panel.add_daily_return();
        panel.add_rolling_average(2).unwrap();
        panel.add_ema(2).unwrap();

        assert_eq!(panel.daily_return().unwrap()[2], None);
        assert_eq!(panel.rolling_average(2).unwrap()[2], Some(100.0));
        assert_eq!(panel.ema(2).unwrap()[2], Some(100.0));
    }

    #[test]
    fn crossover_requires_inputs() {
        let mut panel =
            Panel::from_partition(&key(), vec![("AAPL".into(), series(&[1.0, 2.0]))]).unwrap();
        match panel.add_crossover(30, 14) {
            Err(EtlError::MissingFeature { column }) => assert_eq!(column, "RollAvg30Days"),
            other => panic!("expected MissingFeature, got {other:?}"),
        }
        panel.add_rolling_average(30).unwrap();
        match panel.add_crossover(30, 14) {
            Err(EtlError::MissingFeature { column }) => assert_eq!(column, "EMA14"),
            other => panic!("expected MissingFeature, got {other:?}"),
        }
        panel.add_ema(14).unwrap();
        panel.add_crossover(30, 14).unwrap();
        assert_eq!(panel.crossover(30, 14).unwrap().len(), 2);
    }

    #[test]
    fn filled_gap_in_flat_run_has_zero_crossover() {
        let mut aapl = series(&[0.1; 8]);
        for bar in &mut aapl[3..6] {
            bar.close = None;
        }
        let mut panel = Panel::from_partition(
            &key(),
            vec![("AAPL".into(), aapl), ("MSFT".into(), series(&[5.0, 6.0]))],
        )
        .unwrap();
        assert_eq!(panel.clean(), 3);
        panel.add_features(&TransformParams::new(3, 2).unwrap()).unwrap();

        let roll = panel.rolling_average(3).unwrap();
        let ema = panel.ema(2).unwrap();
        for i in 0..8 {
            assert_eq!(panel.rows()[i].bar.close, Some(0.1));
            assert_eq!(roll[i], Some(0.1), "row {i}");
            assert_eq!(ema[i], Some(0.1), "row {i}");
        }
        assert_eq!(&panel.crossover(3, 2).unwrap()[..8], &[0i8; 8]);
        assert_eq!(panel.crossover(3, 2).unwrap()[9], -1);
    }

    #[test]
    fn clean_discards_stale_features() {
        let mut bars = series(&[1.0, 2.0]);
        bars[1].close = None;
        let mut panel = Panel::from_partition(&key(), vec![("AAPL".into(), bars)]).unwrap();
        panel.add_daily_return();
        panel.clean();
        assert!(panel.daily_return().is_none());
    }

    #[test]
    fn into_consolidated_needs_every_feature() {
        let params = TransformParams::new(2, 2).unwrap();
        let panel =
            Panel::from_partition(&key(), vec![("AAPL".into(), series(&[1.0, 2.0]))]).unwrap();
        assert!(matches!(
            panel.clone().into_consolidated(params),
            Err(EtlError::MissingFeature { .. })
        ));

        let mut panel = panel;
        panel.add_features(&params).unwrap();
        let table = panel.into_consolidated(params).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].daily_return, Some(1.0));
    }
}
