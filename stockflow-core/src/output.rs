//! Consolidated output table: the panel plus every derived feature column.
//!
//! CSV layout:
//! `Date,Ticker,Open,High,Low,Close,AdjClose,Volume,DailyReturn,RollAvg{N}Days,EMA{S},Crossover`
//!
//! The window and span are encoded in the column names, so a table read back
//! from disk recovers its `TransformParams` from the header alone.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;

use crate::data::schema::{format_number, parse_date, parse_number, read_records};
use crate::error::EtlError;
use crate::features::{TransformParams, CROSSOVER_COLUMN, DAILY_RETURN_COLUMN};

/// Columns before the feature block, in file order.
const BASE_COLUMNS: [&str; 8] = [
    "Date", "Ticker", "Open", "High", "Low", "Close", "AdjClose", "Volume",
];

/// One row of the consolidated table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<f64>,
    pub daily_return: Option<f64>,
    pub roll_avg: Option<f64>,
    pub ema: Option<f64>,
    pub crossover: i8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedTable {
    params: TransformParams,
    rows: Vec<FeatureRow>,
}

impl ConsolidatedTable {
    pub fn new(params: TransformParams, rows: Vec<FeatureRow>) -> Self {
        Self { params, rows }
    }

    pub fn params(&self) -> TransformParams {
        self.params
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> &[FeatureRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Distinct tickers in first-appearance order.
    pub fn tickers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !out.contains(&row.ticker.as_str()) {
                out.push(row.ticker.as_str());
            }
        }
        out
    }

    /// Row count per ticker.
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.ticker.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Column names in file order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        names.push(DAILY_RETURN_COLUMN.to_string());
        names.push(self.params.roll_avg_column());
        names.push(self.params.ema_column());
        names.push(CROSSOVER_COLUMN.to_string());
        names
    }

    // ── CSV ─────────────────────────────────────────────────────────

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, EtlError> {
        const ENTITY: &str = "consolidated table";
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(self.column_names())
            .map_err(|e| EtlError::csv(ENTITY, e))?;

        for r in &self.rows {
            wtr.write_record([
                r.date.to_string(),
                r.ticker.clone(),
                format_number(r.open),
                format_number(r.high),
                format_number(r.low),
                format_number(r.close),
                format_number(r.adj_close),
                format_number(r.volume),
                format_number(r.daily_return),
                format_number(r.roll_avg),
                format_number(r.ema),
                r.crossover.to_string(),
            ])
            .map_err(|e| EtlError::csv(ENTITY, e))?;
        }

        wtr.into_inner().map_err(|e| EtlError::Io {
            path: ENTITY.into(),
            source: e.into_error(),
        })
    }

    /// Parse a consolidated CSV, recovering window and span from the header.
    pub fn from_csv_reader<R: Read>(reader: R, entity: &str) -> Result<Self, EtlError> {
        let records = read_records(reader, entity)?;
        let Some((header, body)) = records.split_first() else {
            return Err(EtlError::shape(entity, "file has no header"));
        };
        let names: Vec<&str> = header.iter().map(str::trim).collect();
        let position = |name: &str| -> Result<usize, EtlError> {
            names
                .iter()
                .position(|n| *n == name)
                .ok_or_else(|| EtlError::shape(entity, format!("missing column: {name}")))
        };

        let roll_window = find_suffixed(&names, "RollAvg", "Days")
            .ok_or_else(|| EtlError::shape(entity, "missing RollAvg{N}Days column"))?;
        let ema_span = find_suffixed(&names, "EMA", "")
            .ok_or_else(|| EtlError::shape(entity, "missing EMA{S} column"))?;
        let params = TransformParams::new(roll_window, ema_span)
            .map_err(|e| EtlError::shape(entity, e.to_string()))?;

        let cols: Vec<usize> = ConsolidatedTable::new(params, Vec::new())
            .column_names()
            .iter()
            .map(|name| position(name))
            .collect::<Result<_, _>>()?;

        let mut rows = Vec::with_capacity(body.len());
        for (offset, record) in body.iter().enumerate() {
            let line = offset + 2;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let cell = |i: usize| record.get(cols[i]).unwrap_or("").trim();
            let number = |i: usize| -> Result<Option<f64>, EtlError> {
                parse_number(cell(i)).map_err(|_| {
                    EtlError::shape(
                        entity,
                        format!("line {line}: unparsable {} '{}'", names[cols[i]], cell(i)),
                    )
                })
            };

            let date = parse_date(cell(0)).ok_or_else(|| {
                EtlError::shape(entity, format!("line {line}: unparsable Date '{}'", cell(0)))
            })?;
            let crossover = match cell(11) {
                "" => 0,
                raw => raw.parse::<i8>().map_err(|_| {
                    EtlError::shape(entity, format!("line {line}: unparsable Crossover '{raw}'"))
                })?,
            };

            rows.push(FeatureRow {
                date,
                ticker: cell(1).to_string(),
                open: number(2)?,
                high: number(3)?,
                low: number(4)?,
                close: number(5)?,
                adj_close: number(6)?,
                volume: number(7)?,
                daily_return: number(8)?,
                roll_avg: number(9)?,
                ema: number(10)?,
                crossover,
            });
        }

        Ok(Self { params, rows })
    }

    // ── DataFrame / Parquet ─────────────────────────────────────────

    /// Convert to a polars DataFrame with the CSV column names.
    pub fn to_dataframe(&self) -> Result<DataFrame, EtlError> {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
        let dates: Vec<i32> = self
            .rows
            .iter()
            .map(|r| (r.date - epoch).num_days() as i32)
            .collect();
        let tickers: Vec<&str> = self.rows.iter().map(|r| r.ticker.as_str()).collect();
        let col = |f: fn(&FeatureRow) -> Option<f64>| -> Vec<Option<f64>> {
            self.rows.iter().map(f).collect()
        };
        let crossovers: Vec<i32> = self.rows.iter().map(|r| i32::from(r.crossover)).collect();

        let names = self.column_names();
        let df = DataFrame::new(vec![
            Column::new(names[0].as_str().into(), dates).cast(&DataType::Date)?,
            Column::new(names[1].as_str().into(), tickers),
            Column::new(names[2].as_str().into(), col(|r| r.open)),
            Column::new(names[3].as_str().into(), col(|r| r.high)),
            Column::new(names[4].as_str().into(), col(|r| r.low)),
            Column::new(names[5].as_str().into(), col(|r| r.close)),
            Column::new(names[6].as_str().into(), col(|r| r.adj_close)),
            Column::new(names[7].as_str().into(), col(|r| r.volume)),
            Column::new(names[8].as_str().into(), col(|r| r.daily_return)),
            Column::new(names[9].as_str().into(), col(|r| r.roll_avg)),
            Column::new(names[10].as_str().into(), col(|r| r.ema)),
            Column::new(names[11].as_str().into(), crossovers),
        ])?;
        Ok(df)
    }

    /// Write the table as a Parquet file.
    pub fn export_parquet(&self, path: &Path) -> Result<(), EtlError> {
        let mut df = self.to_dataframe()?;
        let file = File::create(path).map_err(|source| EtlError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ParquetWriter::new(file).finish(&mut df)?;
        Ok(())
    }
}

/// Parse `N` out of the first column named `{prefix}{N}{suffix}`.
fn find_suffixed(names: &[&str], prefix: &str, suffix: &str) -> Option<usize> {
    names.iter().find_map(|name| {
        name.strip_prefix(prefix)?
            .strip_suffix(suffix)?
            .parse::<usize>()
            .ok()
    })
}
