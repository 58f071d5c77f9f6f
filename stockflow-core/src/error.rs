//! Pipeline error taxonomy.
//!
//! Every stage returns `EtlError`; nothing below the CLI swallows one. A ticker
//! with zero rows is not an error here, only a partition where every ticker is
//! empty (`EmptyInput`).

use std::path::PathBuf;
use thiserror::Error;

use crate::data::provider::DataError;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("not found in staging store: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("partition '{partition}' has no rows across all tickers")]
    EmptyInput { partition: String },

    #[error("provider failed for '{ticker}': {source}")]
    Provider {
        ticker: String,
        #[source]
        source: DataError,
    },

    #[error("unexpected data shape in {entity}: {detail}")]
    DataShape { entity: String, detail: String },

    #[error("feature column '{column}' has not been computed yet")]
    MissingFeature { column: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid partition key '{0}' (expected YYYY_MM_DD)")]
    InvalidPartitionKey(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {entity}: {source}")]
    Csv {
        entity: String,
        #[source]
        source: csv::Error,
    },

    #[error("polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl EtlError {
    pub(crate) fn shape(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        EtlError::DataShape {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn csv(entity: impl Into<String>, source: csv::Error) -> Self {
        EtlError::Csv {
            entity: entity.into(),
            source,
        }
    }

    /// True for the "nothing staged at that key" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EtlError::NotFound { .. })
    }
}
