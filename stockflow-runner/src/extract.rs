//! Extract stage: pull raw bars per ticker and stage them under one partition.
//!
//! One file per ticker lands in `extract/{key}/{TICKER}.csv`. A ticker with no
//! rows still gets a header-only file, so the transform stage can tell "no
//! data" apart from "never extracted". A provider failure aborts the run;
//! files already written stay in place.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use stockflow_core::data::{DataProvider, StagedEntity, StagingStore};
use stockflow_core::{EtlError, PartitionKey, RawBar};

use crate::config::{validate_range, validate_tickers};
use crate::error::PipelineError;

/// What one extract run produced.
#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub partition: PartitionKey,
    /// Rows staged per ticker, in request order.
    pub row_counts: Vec<(String, usize)>,
    /// Bars of the last ticker processed.
    pub last_bars: Vec<RawBar>,
    pub files: Vec<StagedEntity>,
}

impl ExtractReport {
    pub fn total_rows(&self) -> usize {
        self.row_counts.iter().map(|(_, n)| n).sum()
    }

    pub fn empty_tickers(&self) -> Vec<&str> {
        self.row_counts
            .iter()
            .filter(|(_, n)| *n == 0)
            .map(|(t, _)| t.as_str())
            .collect()
    }
}

pub struct Extractor<'a> {
    store: &'a dyn StagingStore,
    provider: &'a dyn DataProvider,
    tickers: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
    partition: PartitionKey,
}

impl<'a> Extractor<'a> {
    /// Stage into today's partition; `[start, end)` is the requested range.
    pub fn new(
        store: &'a dyn StagingStore,
        provider: &'a dyn DataProvider,
        tickers: Vec<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, PipelineError> {
        validate_tickers(&tickers)?;
        validate_range(start, end)?;
        Ok(Self {
            store,
            provider,
            tickers,
            start,
            end,
            partition: PartitionKey::today(),
        })
    }

    /// Override the partition key (defaults to today).
    pub fn with_partition(mut self, partition: PartitionKey) -> Self {
        self.partition = partition;
        self
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    pub fn extract(&self) -> Result<ExtractReport, PipelineError> {
        info!(
            partition = %self.partition,
            provider = self.provider.name(),
            store = self.store.name(),
            tickers = self.tickers.len(),
            start = %self.start,
            end = %self.end,
            "extract started"
        );

        let mut report = ExtractReport {
            partition: self.partition.clone(),
            row_counts: Vec::with_capacity(self.tickers.len()),
            last_bars: Vec::new(),
            files: Vec::with_capacity(self.tickers.len()),
        };

        for ticker in &self.tickers {
            let fetched = self
                .provider
                .fetch(ticker, self.start, self.end)
                .map_err(|source| EtlError::Provider {
                    ticker: ticker.clone(),
                    source,
                })?;

            let bars = fetched.bars;
            if bars.is_empty() {
                warn!(ticker = %ticker, "provider returned no rows");
            }
            let staged = self.store.write_raw(&self.partition, ticker, &bars)?;
            debug!(ticker = %ticker, path = %staged.path.display(), rows = bars.len(), "staged raw bars");
            info!(ticker = %ticker, rows = bars.len(), source = ?fetched.source, "extracted");

            report.row_counts.push((ticker.clone(), bars.len()));
            report.files.push(staged);
            report.last_bars = bars;
        }

        info!(
            partition = %self.partition,
            rows = report.total_rows(),
            "extract finished"
        );
        Ok(report)
    }
}
