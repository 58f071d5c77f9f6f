//! Raw bar file schema and CSV codec.
//!
//! Layout on disk: `Date,Open,High,Low,Close,AdjClose,Volume`, one row per
//! trading day, empty field for a missing value.
//!
//! The reader is lenient about what providers emit:
//! - `Adj Close` is accepted for `AdjClose`, and `AdjClose` may be absent
//! - multi-level headers (a `Price` row followed by `Ticker` / `Date` rows) are
//!   flattened to their first level, with the leading column taken as `Date`
//! - `Date` may carry a time suffix (`2024-01-02 00:00:00`)
//! - `nan`, `NaN`, `null` and empty fields all read as missing

use chrono::NaiveDate;
use csv::StringRecord;
use std::io::{Read, Write};

use crate::domain::RawBar;
use crate::error::EtlError;

/// Column order written for raw partition files.
pub const RAW_COLUMNS: [&str; 7] = ["Date", "Open", "High", "Low", "Close", "AdjClose", "Volume"];

/// Columns a raw file must carry before anything downstream may run.
pub const REQUIRED_RAW_COLUMNS: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];

/// Header labels that mark extra levels of a hierarchical header.
const HEADER_LEVEL_LABELS: [&str; 3] = ["Ticker", "Date", "Price"];

/// A single-level header recovered from one or more header rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatHeader {
    pub names: Vec<String>,
    /// Number of leading records consumed by the header.
    pub header_rows: usize,
}

impl FlatHeader {
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Flatten the header rows at the top of `records` into single-level names.
///
/// The first record is level 0. Subsequent records whose first cell is a level
/// label (`Ticker`, `Date`, `Price`) and whose cells are not numeric are extra
/// header levels and get skipped. When such levels exist, the first column is
/// the row label and is named `Date`.
pub fn flatten_header(records: &[StringRecord]) -> Option<FlatHeader> {
    let first = records.first()?;
    let mut names: Vec<String> = first.iter().map(|s| canonical_name(s.trim())).collect();

    let mut header_rows = 1;
    for record in records.iter().skip(1) {
        let label = record.get(0).map(str::trim).unwrap_or("");
        let is_level = HEADER_LEVEL_LABELS.contains(&label)
            && record.iter().skip(1).all(|cell| parse_number(cell).is_err() || cell.trim().is_empty());
        if !is_level {
            break;
        }
        header_rows += 1;
    }

    if header_rows > 1 {
        if let Some(first_name) = names.first_mut() {
            *first_name = "Date".to_string();
        }
    }

    Some(FlatHeader { names, header_rows })
}

fn canonical_name(name: &str) -> String {
    match name {
        "Adj Close" | "Adj_Close" | "adj_close" => "AdjClose".to_string(),
        other => other.to_string(),
    }
}

/// Parse a date cell, tolerating a trailing time component.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    let day = cell.get(..10).unwrap_or(cell);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Parse a numeric cell; `Ok(None)` for the missing markers.
pub fn parse_number(cell: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some)
}

pub(crate) fn format_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Read all records from a headerless CSV reader.
pub(crate) fn read_records<R: Read>(reader: R, entity: &str) -> Result<Vec<StringRecord>, EtlError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    rdr.records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EtlError::csv(entity, e))
}

/// Parse a raw bar table.
///
/// A file with no bytes at all is an empty table. A header without one of the
/// required columns is a `DataShape` error, raised before any row is read.
pub fn parse_raw_table<R: Read>(reader: R, entity: &str) -> Result<Vec<RawBar>, EtlError> {
    let records = read_records(reader, entity)?;
    let Some(header) = flatten_header(&records) else {
        return Ok(Vec::new());
    };

    let missing: Vec<&str> = REQUIRED_RAW_COLUMNS
        .iter()
        .copied()
        .filter(|c| header.position(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(EtlError::shape(
            entity,
            format!("missing column(s): {}", missing.join(", ")),
        ));
    }

    let idx = |name: &str| header.position(name);
    let (date_i, open_i, high_i, low_i, close_i, vol_i) = (
        idx("Date").unwrap_or(0),
        idx("Open").unwrap_or(0),
        idx("High").unwrap_or(0),
        idx("Low").unwrap_or(0),
        idx("Close").unwrap_or(0),
        idx("Volume").unwrap_or(0),
    );
    let adj_i = idx("AdjClose");

    let mut bars = Vec::with_capacity(records.len().saturating_sub(header.header_rows));
    for (offset, record) in records.iter().enumerate().skip(header.header_rows) {
        let line = offset + 1;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let date_cell = record.get(date_i).unwrap_or("");
        let date = parse_date(date_cell).ok_or_else(|| {
            EtlError::shape(entity, format!("line {line}: unparsable Date '{date_cell}'"))
        })?;

        let number = |i: usize, column: &str| -> Result<Option<f64>, EtlError> {
            let cell = record.get(i).unwrap_or("");
            parse_number(cell).map_err(|_| {
                EtlError::shape(entity, format!("line {line}: unparsable {column} '{cell}'"))
            })
        };

        bars.push(RawBar {
            date,
            open: number(open_i, "Open")?,
            high: number(high_i, "High")?,
            low: number(low_i, "Low")?,
            close: number(close_i, "Close")?,
            adj_close: match adj_i {
                Some(i) => number(i, "AdjClose")?,
                None => None,
            },
            volume: number(vol_i, "Volume")?,
        });
    }

    Ok(bars)
}

/// Write a raw bar table with the canonical header (always written, even for zero rows).
pub fn write_raw_table<W: Write>(writer: W, bars: &[RawBar], entity: &str) -> Result<(), EtlError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(RAW_COLUMNS)
        .map_err(|e| EtlError::csv(entity, e))?;

    for b in bars {
        wtr.write_record([
            b.date.to_string(),
            format_number(b.open),
            format_number(b.high),
            format_number(b.low),
            format_number(b.close),
            format_number(b.adj_close),
            format_number(b.volume),
        ])
        .map_err(|e| EtlError::csv(entity, e))?;
    }

    wtr.flush().map_err(|e| EtlError::Io {
        path: entity.into(),
        source: e,
    })
}
