//! Load stage: hand the consolidated table of one partition to the caller.

use tracing::{info, warn};

use stockflow_core::data::{staging::csv_file_name, StagingStore, CONSOLIDATED_ENTITY};
use stockflow_core::{ConsolidatedTable, PartitionKey, Phase};

use crate::error::PipelineError;
use crate::manifest::RunManifest;

pub struct Loader<'a> {
    store: &'a dyn StagingStore,
    partition: PartitionKey,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a dyn StagingStore, partition: PartitionKey) -> Self {
        Self { store, partition }
    }

    /// The consolidated table exactly as the transform stage wrote it.
    ///
    /// `NotFound` if that partition was never transformed.
    pub fn load(&self) -> Result<ConsolidatedTable, PipelineError> {
        let table = self.store.read_consolidated(&self.partition)?;
        info!(partition = %self.partition, rows = table.len(), "loaded consolidated table");
        Ok(table)
    }

    pub fn manifest(&self) -> Result<RunManifest, PipelineError> {
        RunManifest::read(self.store, &self.partition)
    }

    /// Check the staged table against the hash recorded in its manifest.
    pub fn verify(&self) -> Result<bool, PipelineError> {
        let manifest = self.manifest()?;
        let file_name = csv_file_name(CONSOLIDATED_ENTITY)?;
        let bytes = self.store.get(Phase::Transform, &self.partition, &file_name)?;
        let actual = blake3::hash(&bytes).to_hex().to_string();
        let ok = actual == manifest.content_hash;
        if !ok {
            warn!(partition = %self.partition, expected = %manifest.content_hash, %actual, "consolidated table does not match manifest");
        }
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::data::MemoryStagingStore;
    use stockflow_core::TransformParams;

    fn key() -> PartitionKey {
        PartitionKey::parse("2024_06_03").unwrap()
    }

    #[test]
    fn unproduced_partition_is_not_found() {
        let store = MemoryStagingStore::new();
        let loader = Loader::new(&store, key());
        assert!(loader.load().unwrap_err().is_not_found());
        assert!(loader.manifest().unwrap_err().is_not_found());
    }

    #[test]
    fn verify_detects_tampering() {
        let store = MemoryStagingStore::new();
        let table = ConsolidatedTable::new(TransformParams::default(), vec![]);
        let staged = store.write_consolidated(&key(), &table).unwrap();
        RunManifest::new(&key(), &[], &table, &staged)
            .write(&store)
            .unwrap();

        let loader = Loader::new(&store, key());
        assert!(loader.verify().unwrap());

        store
            .put(Phase::Transform, &key(), "transformed_data.csv", b"tampered")
            .unwrap();
        assert!(!loader.verify().unwrap());
    }
}
