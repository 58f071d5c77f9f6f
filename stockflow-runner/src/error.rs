use std::path::PathBuf;

use thiserror::Error;

use stockflow_core::data::DataError;
use stockflow_core::EtlError;

use crate::config::ConfigError;

/// Errors from the pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Etl(#[from] EtlError),

    #[error("could not set up provider: {0}")]
    ProviderSetup(#[source] DataError),

    #[error("manifest error at {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// True when the stage asked for a partition or file that was never staged.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::Etl(e) if e.is_not_found())
    }
}
