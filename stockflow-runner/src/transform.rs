//! Transform stage: raw partition in, consolidated table (plus manifest) out.
//!
//! Steps, in order: load panel, clean, daily return, rolling average, EMA,
//! crossover, persist. Each step is also exposed on its own so callers can
//! inspect intermediate state.

use tracing::{debug, info};

use stockflow_core::data::StagingStore;
use stockflow_core::{ConsolidatedTable, Panel, PartitionKey, TransformParams};

use crate::error::PipelineError;
use crate::manifest::RunManifest;

pub struct Transformer<'a> {
    store: &'a dyn StagingStore,
    tickers: Vec<String>,
    partition: PartitionKey,
    params: TransformParams,
}

impl<'a> Transformer<'a> {
    pub fn new(
        store: &'a dyn StagingStore,
        tickers: Vec<String>,
        partition: PartitionKey,
        params: TransformParams,
    ) -> Self {
        Self {
            store,
            tickers,
            partition,
            params,
        }
    }

    pub fn params(&self) -> TransformParams {
        self.params
    }

    /// Read every ticker's raw file and concatenate into a panel.
    ///
    /// A missing ticker file is `NotFound`; zero rows overall is `EmptyInput`.
    pub fn load_panel(&self) -> Result<Panel, PipelineError> {
        let mut raw = Vec::with_capacity(self.tickers.len());
        for ticker in &self.tickers {
            let bars = self.store.read_raw(&self.partition, ticker)?;
            debug!(ticker = %ticker, rows = bars.len(), "read raw bars");
            raw.push((ticker.clone(), bars));
        }
        Ok(Panel::from_partition(&self.partition, raw)?)
    }

    /// Run every step and persist the consolidated table and its manifest.
    pub fn transform(&self) -> Result<ConsolidatedTable, PipelineError> {
        info!(
            partition = %self.partition,
            tickers = self.tickers.len(),
            roll_window = self.params.roll_window,
            ema_span = self.params.ema_span,
            "transform started"
        );

        let mut panel = self.load_panel()?;
        panel.clean();
        panel.add_daily_return();
        panel.add_rolling_average(self.params.roll_window)?;
        panel.add_ema(self.params.ema_span)?;
        panel.add_crossover(self.params.roll_window, self.params.ema_span)?;
        let table = panel.into_consolidated(self.params)?;

        let staged = self.store.write_consolidated(&self.partition, &table)?;
        debug!(path = %staged.path.display(), bytes = staged.bytes, "staged consolidated table");

        let manifest = RunManifest::new(&self.partition, &self.tickers, &table, &staged);
        manifest.write(self.store)?;

        info!(partition = %self.partition, rows = table.len(), "transform finished");
        Ok(table)
    }
}
