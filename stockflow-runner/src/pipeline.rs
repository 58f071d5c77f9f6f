//! ETL driver: Extract, then Transform, then Load on the extractor's partition.

use tracing::info;

use stockflow_core::data::{
    CsvImportProvider, DataProvider, FileStagingStore, StagingStore, SyntheticProvider,
    YahooProvider,
};
use stockflow_core::{ConsolidatedTable, PartitionKey};

use crate::config::{ConfigError, ExtractorConfig, PipelineConfig, ProviderKind};
use crate::error::PipelineError;
use crate::extract::{ExtractReport, Extractor};
use crate::load::Loader;
use crate::manifest::RunManifest;
use crate::transform::Transformer;

/// Everything one full run produced.
#[derive(Debug, Clone)]
pub struct EtlOutcome {
    pub partition: PartitionKey,
    pub extract: ExtractReport,
    pub table: ConsolidatedTable,
    pub manifest: RunManifest,
}

/// Construct the provider named in the extractor config.
pub fn build_provider(config: &ExtractorConfig) -> Result<Box<dyn DataProvider>, PipelineError> {
    Ok(match config.provider {
        ProviderKind::Yahoo => Box::new(
            YahooProvider::new()
                .map_err(PipelineError::ProviderSetup)?
                .with_retries(config.retries),
        ),
        ProviderKind::Csv => {
            let dir = config.import_dir.as_ref().ok_or_else(|| {
                ConfigError::Invalid("provider 'csv' needs extractor.import_dir".into())
            })?;
            Box::new(CsvImportProvider::new(dir))
        }
        ProviderKind::Synthetic => Box::new(SyntheticProvider::new()),
    })
}

/// Filesystem store rooted at the configured base path.
pub fn build_store(config: &PipelineConfig) -> FileStagingStore {
    FileStagingStore::new(&config.storage.base_path)
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    store: &'a dyn StagingStore,
    provider: &'a dyn DataProvider,
    partition: Option<PartitionKey>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a dyn StagingStore,
        provider: &'a dyn DataProvider,
    ) -> Self {
        Self {
            config,
            store,
            provider,
            partition: None,
        }
    }

    /// Override the partition key the extractor stages into (defaults to today).
    pub fn with_partition(mut self, partition: PartitionKey) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn run(&self) -> Result<EtlOutcome, PipelineError> {
        self.config.validate()?;
        let params = self.config.transform_params()?;
        let tickers = self.config.extractor.tickers.clone();

        let mut extractor = Extractor::new(
            self.store,
            self.provider,
            tickers.clone(),
            self.config.extractor.start_date,
            self.config.extractor.end_date,
        )?;
        if let Some(key) = &self.partition {
            extractor = extractor.with_partition(key.clone());
        }
        let extract = extractor.extract()?;
        let partition = extract.partition.clone();

        Transformer::new(self.store, tickers, partition.clone(), params).transform()?;

        let loader = Loader::new(self.store, partition.clone());
        let table = loader.load()?;
        let manifest = loader.manifest()?;

        info!(partition = %partition, rows = table.len(), "etl finished");
        Ok(EtlOutcome {
            partition,
            extract,
            table,
            manifest,
        })
    }
}

/// Run the whole pipeline with the store and provider the config names.
pub fn run_etl(config: &PipelineConfig) -> Result<EtlOutcome, PipelineError> {
    config.validate()?;
    let store = build_store(config);
    let provider = build_provider(&config.extractor)?;
    Pipeline::new(config, &store, provider.as_ref()).run()
}
