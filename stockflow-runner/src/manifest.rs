//! Run manifest: the `manifest.json` sidecar next to the consolidated table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::data::{StagedEntity, StagingStore};
use stockflow_core::{ConsolidatedTable, PartitionKey, Phase, TransformParams};

use crate::error::PipelineError;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub partition: PartitionKey,
    pub tickers: Vec<String>,
    pub params: TransformParams,
    pub rows: usize,
    pub row_counts: BTreeMap<String, usize>,
    /// BLAKE3 hex digest of the consolidated CSV bytes.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

impl RunManifest {
    pub fn new(
        partition: &PartitionKey,
        tickers: &[String],
        table: &ConsolidatedTable,
        staged: &StagedEntity,
    ) -> Self {
        Self {
            partition: partition.clone(),
            tickers: tickers.to_vec(),
            params: table.params(),
            rows: table.len(),
            row_counts: table.row_counts(),
            content_hash: staged.content_hash.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn write(&self, store: &dyn StagingStore) -> Result<StagedEntity, PipelineError> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| PipelineError::Manifest {
            path: store.locate(Phase::Transform, &self.partition, MANIFEST_FILE),
            source,
        })?;
        Ok(store.put(Phase::Transform, &self.partition, MANIFEST_FILE, &json)?)
    }

    pub fn read(store: &dyn StagingStore, partition: &PartitionKey) -> Result<Self, PipelineError> {
        let bytes = store.get(Phase::Transform, partition, MANIFEST_FILE)?;
        serde_json::from_slice(&bytes).map_err(|source| PipelineError::Manifest {
            path: store.locate(Phase::Transform, partition, MANIFEST_FILE),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::data::MemoryStagingStore;

    #[test]
    fn write_then_read() {
        let store = MemoryStagingStore::new();
        let key = PartitionKey::parse("2024_06_03").unwrap();
        let table = ConsolidatedTable::new(TransformParams::default(), vec![]);
        let staged = store.write_consolidated(&key, &table).unwrap();

        let manifest = RunManifest::new(&key, &["AAPL".to_string()], &table, &staged);
        manifest.write(&store).unwrap();

        let back = RunManifest::read(&store, &key).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.content_hash, staged.content_hash);
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let store = MemoryStagingStore::new();
        let key = PartitionKey::parse("2024_06_03").unwrap();
        assert!(RunManifest::read(&store, &key).unwrap_err().is_not_found());
    }

    #[test]
    fn corrupt_manifest_is_manifest_error() {
        let store = MemoryStagingStore::new();
        let key = PartitionKey::parse("2024_06_03").unwrap();
        store
            .put(Phase::Transform, &key, MANIFEST_FILE, b"{not json")
            .unwrap();
        assert!(matches!(
            RunManifest::read(&store, &key),
            Err(PipelineError::Manifest { .. })
        ));
    }
}
