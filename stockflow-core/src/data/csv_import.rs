//! CSV import provider.
//!
//! Reads `{dir}/{SYMBOL}.csv` exports (yfinance `to_csv` output or any file in
//! the raw schema) and serves them through the `DataProvider` interface.
//! Multi-level headers are flattened by the raw schema reader.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use super::provider::{clip_to_range, DataError, DataProvider, DataSource, FetchResult};
use super::schema::parse_raw_table;

pub struct CsvImportProvider {
    dir: PathBuf,
}

impl CsvImportProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }
}

impl DataProvider for CsvImportProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let path = self.path_for(symbol);
        // A missing export is a setup problem, not an empty market.
        let file = File::open(&path)
            .map_err(|e| DataError::Import(format!("cannot open {}: {e}", path.display())))?;

        let bars = parse_raw_table(file, &path.display().to_string())
            .map_err(|e| DataError::Import(e.to_string()))?;
        let total = bars.len();
        let bars = clip_to_range(bars, start, end);
        debug!(symbol, total, kept = bars.len(), "clipped csv import to range");

        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::CsvImport,
        })
    }
}
