//! StockFlow Runner: the Extract, Transform and Load stages and the ETL driver.
//!
//! This crate builds on `stockflow-core` to provide:
//! - TOML pipeline configuration with validation
//! - Extractor: provider → one raw file per ticker under a date partition
//! - Transformer: raw partition → cleaned panel → features → consolidated table
//! - Loader: consolidated table (and its run manifest) back to the caller
//! - Pipeline driver sequencing the three stages on one partition key

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod manifest;
pub mod pipeline;
pub mod transform;

pub use config::{ConfigError, PipelineConfig, ProviderKind};
pub use error::PipelineError;
pub use extract::{ExtractReport, Extractor};
pub use load::Loader;
pub use manifest::{RunManifest, MANIFEST_FILE};
pub use pipeline::{build_provider, build_store, run_etl, EtlOutcome, Pipeline};
pub use transform::Transformer;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
    }

    #[test]
    fn stage_outputs_are_send_sync() {
        assert_send::<ExtractReport>();
        assert_sync::<ExtractReport>();
        assert_send::<RunManifest>();
        assert_sync::<RunManifest>();
        assert_send::<EtlOutcome>();
        assert_sync::<EtlOutcome>();
    }

    #[test]
    fn stages_are_send_sync() {
        assert_send::<Extractor<'static>>();
        assert_sync::<Extractor<'static>>();
        assert_send::<Transformer<'static>>();
        assert_sync::<Loader<'static>>();
    }

    #[test]
    fn pipeline_error_is_send_sync() {
        assert_send::<PipelineError>();
        assert_sync::<PipelineError>();
    }
}
