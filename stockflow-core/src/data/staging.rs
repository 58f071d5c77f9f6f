//! Staging store: the date-partitioned namespace stages communicate through.
//!
//! Layout: `{base_path}/{phase}/{partition_key}/{entity}.csv`
//!
//! - `extract/{key}/{ticker}.csv`: one raw bar file per ticker
//! - `transform/{key}/transformed_data.csv`: the consolidated table
//!
//! Implementations only move bytes (`put` / `get` / listing). Encoding lives in
//! the provided methods so every store writes the same files. Writes go to a
//! temp file and are renamed into place; there is no locking, so two runs must
//! never target the same partition key at once.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use super::schema::{parse_raw_table, write_raw_table};
use crate::domain::{PartitionKey, Phase, RawBar};
use crate::error::EtlError;
use crate::output::ConsolidatedTable;

/// Entity name of the transform phase output.
pub const CONSOLIDATED_ENTITY: &str = "transformed_data";

/// Receipt for a completed write.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEntity {
    pub path: PathBuf,
    pub bytes: usize,
    /// BLAKE3 hex digest of the written bytes.
    pub content_hash: String,
}

impl StagedEntity {
    fn new(path: PathBuf, bytes: &[u8]) -> Self {
        Self {
            path,
            bytes: bytes.len(),
            content_hash: blake3::hash(bytes).to_hex().to_string(),
        }
    }
}

/// File name for a staged CSV entity.
pub fn csv_file_name(entity: &str) -> Result<String, EtlError> {
    if entity.is_empty()
        || entity.contains(|c: char| c == '/' || c == '\\')
        || entity == "."
        || entity == ".."
    {
        return Err(EtlError::InvalidParameter(format!(
            "'{entity}' cannot be used as a staging entity name"
        )));
    }
    Ok(format!("{entity}.csv"))
}

/// Storage contract shared by every stage.
pub trait StagingStore: Send + Sync {
    /// Human-readable name of this store.
    fn name(&self) -> &str;

    /// Where an entity lives (used in logs and `NotFound` errors).
    fn locate(&self, phase: Phase, partition: &PartitionKey, file_name: &str) -> PathBuf;

    /// Persist bytes, replacing any previous entity at that location.
    fn put(
        &self,
        phase: Phase,
        partition: &PartitionKey,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StagedEntity, EtlError>;

    /// Read back a previously written entity, `NotFound` if absent.
    fn get(&self, phase: Phase, partition: &PartitionKey, file_name: &str)
        -> Result<Vec<u8>, EtlError>;

    /// Partition keys present for a phase, ascending.
    fn list_partitions(&self, phase: Phase) -> Result<Vec<PartitionKey>, EtlError>;

    /// File names staged under one partition, sorted.
    fn list_entities(&self, phase: Phase, partition: &PartitionKey) -> Result<Vec<String>, EtlError>;

    /// Write one ticker's raw bars under the extract phase.
    fn write_raw(
        &self,
        partition: &PartitionKey,
        ticker: &str,
        bars: &[RawBar],
    ) -> Result<StagedEntity, EtlError> {
        let file_name = csv_file_name(ticker)?;
        let mut buf = Vec::new();
        write_raw_table(&mut buf, bars, &file_name)?;
        self.put(Phase::Extract, partition, &file_name, &buf)
    }

    /// Read one ticker's raw bars from the extract phase.
    fn read_raw(&self, partition: &PartitionKey, ticker: &str) -> Result<Vec<RawBar>, EtlError> {
        let file_name = csv_file_name(ticker)?;
        let bytes = self.get(Phase::Extract, partition, &file_name)?;
        let entity = self.locate(Phase::Extract, partition, &file_name);
        parse_raw_table(bytes.as_slice(), &entity.display().to_string())
    }

    /// Write the consolidated table under the transform phase.
    fn write_consolidated(
        &self,
        partition: &PartitionKey,
        table: &ConsolidatedTable,
    ) -> Result<StagedEntity, EtlError> {
        let file_name = csv_file_name(CONSOLIDATED_ENTITY)?;
        let buf = table.to_csv_bytes()?;
        self.put(Phase::Transform, partition, &file_name, &buf)
    }

    /// Read the consolidated table from the transform phase.
    fn read_consolidated(&self, partition: &PartitionKey) -> Result<ConsolidatedTable, EtlError> {
        let file_name = csv_file_name(CONSOLIDATED_ENTITY)?;
        let bytes = self.get(Phase::Transform, partition, &file_name)?;
        let entity = self.locate(Phase::Transform, partition, &file_name);
        ConsolidatedTable::from_csv_reader(bytes.as_slice(), &entity.display().to_string())
    }
}

// ── Filesystem store ────────────────────────────────────────────────

/// Staging store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStagingStore {
    base_path: PathBuf,
}

impl FileStagingStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Root directory of the store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn phase_dir(&self, phase: Phase) -> PathBuf {
        self.base_path.join(phase.as_str())
    }

    fn partition_dir(&self, phase: Phase, partition: &PartitionKey) -> PathBuf {
        self.phase_dir(phase).join(partition.as_str())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> EtlError + '_ {
    move |source| EtlError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl StagingStore for FileStagingStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn locate(&self, phase: Phase, partition: &PartitionKey, file_name: &str) -> PathBuf {
        self.partition_dir(phase, partition).join(file_name)
    }

    fn put(
        &self,
        phase: Phase,
        partition: &PartitionKey,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StagedEntity, EtlError> {
        let dir = self.partition_dir(phase, partition);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let path = dir.join(file_name);
        let tmp_path = dir.join(format!("{file_name}.tmp"));
        fs::write(&tmp_path, bytes).map_err(io_err(&tmp_path))?;

        // Atomic rename
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(EtlError::Io { path, source: e });
        }

        debug!(path = %path.display(), bytes = bytes.len(), "staged entity");
        Ok(StagedEntity::new(path, bytes))
    }

    fn get(
        &self,
        phase: Phase,
        partition: &PartitionKey,
        file_name: &str,
    ) -> Result<Vec<u8>, EtlError> {
        let path = self.locate(phase, partition, file_name);
        if !path.is_file() {
            return Err(EtlError::NotFound { path });
        }
        fs::read(&path).map_err(io_err(&path))
    }

    fn list_partitions(&self, phase: Phase) -> Result<Vec<PartitionKey>, EtlError> {
        let dir = self.phase_dir(phase);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let entry = entry.map_err(io_err(&dir))?;
            if !entry.path().is_dir() {
                continue;
            }
            // Foreign directories are not partitions; skip them.
            if let Ok(key) = PartitionKey::parse(&entry.file_name().to_string_lossy()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn list_entities(&self, phase: Phase, partition: &PartitionKey) -> Result<Vec<String>, EtlError> {
        let dir = self.partition_dir(phase, partition);
        if !dir.is_dir() {
            return Err(EtlError::NotFound { path: dir });
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let entry = entry.map_err(io_err(&dir))?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) != Some("tmp") {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

// ── In-memory store ─────────────────────────────────────────────────

/// Staging store kept in process memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStagingStore {
    entries: RwLock<BTreeMap<(String, String, String), Vec<u8>>>,
}

impl MemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(phase: Phase, partition: &PartitionKey, file_name: &str) -> (String, String, String) {
        (
            phase.as_str().to_string(),
            partition.as_str().to_string(),
            file_name.to_string(),
        )
    }
}

impl StagingStore for MemoryStagingStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn locate(&self, phase: Phase, partition: &PartitionKey, file_name: &str) -> PathBuf {
        PathBuf::from(phase.as_str())
            .join(partition.as_str())
            .join(file_name)
    }

    fn put(
        &self,
        phase: Phase,
        partition: &PartitionKey,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StagedEntity, EtlError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(Self::key(phase, partition, file_name), bytes.to_vec());
        Ok(StagedEntity::new(
            self.locate(phase, partition, file_name),
            bytes,
        ))
    }

    fn get(
        &self,
        phase: Phase,
        partition: &PartitionKey,
        file_name: &str,
    ) -> Result<Vec<u8>, EtlError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&Self::key(phase, partition, file_name))
            .cloned()
            .ok_or_else(|| EtlError::NotFound {
                path: self.locate(phase, partition, file_name),
            })
    }

    fn list_partitions(&self, phase: Phase) -> Result<Vec<PartitionKey>, EtlError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<PartitionKey> = entries
            .keys()
            .filter(|(p, _, _)| p == phase.as_str())
            .filter_map(|(_, key, _)| PartitionKey::parse(key).ok())
            .collect();
        keys.dedup();
        Ok(keys)
    }

    fn list_entities(&self, phase: Phase, partition: &PartitionKey) -> Result<Vec<String>, EtlError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let names: Vec<String> = entries
            .keys()
            .filter(|(p, key, _)| p == phase.as_str() && key == partition.as_str())
            .map(|(_, _, name)| name.clone())
            .collect();
        if names.is_empty() {
            return Err(EtlError::NotFound {
                path: PathBuf::from(phase.as_str()).join(partition.as_str()),
            });
        }
        Ok(names)
    }
}
