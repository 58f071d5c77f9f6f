//! StockFlow Core: raw bars, providers, staging store, panel table, features.
//!
//! This crate contains everything the pipeline stages share:
//! - Domain types (raw daily bars, partition keys, staging phases)
//! - Data providers (Yahoo Finance, CSV import, synthetic)
//! - The staging store contract and its filesystem / in-memory implementations
//! - The panel table keyed by (Date, Ticker), with cleaning
//! - Per-ticker feature computation (daily return, rolling average, EMA, crossover)
//! - The consolidated output table and its CSV / DataFrame codecs

pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod output;
pub mod panel;

pub use domain::{PartitionKey, Phase, RawBar};
pub use error::EtlError;
pub use features::TransformParams;
pub use output::{ConsolidatedTable, FeatureRow};
pub use panel::Panel;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed between stages are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<RawBar>();
        require_sync::<RawBar>();
        require_send::<PartitionKey>();
        require_sync::<PartitionKey>();
        require_send::<Panel>();
        require_sync::<Panel>();
        require_send::<ConsolidatedTable>();
        require_sync::<ConsolidatedTable>();
        require_send::<EtlError>();
        require_sync::<EtlError>();

        require_send::<data::FileStagingStore>();
        require_sync::<data::FileStagingStore>();
        require_send::<data::MemoryStagingStore>();
        require_sync::<data::MemoryStagingStore>();
        require_send::<data::YahooProvider>();
        require_sync::<data::YahooProvider>();
        require_send::<data::SyntheticProvider>();
        require_sync::<data::SyntheticProvider>();
        require_send::<data::CsvImportProvider>();
        require_sync::<data::CsvImportProvider>();
    }

    /// Architecture contract: stages talk to storage only through the trait object.
    #[test]
    fn staging_store_is_object_safe() {
        fn _check(store: &dyn data::StagingStore, key: &PartitionKey) {
            let _ = store.read_raw(key, "SPY");
        }
    }
}
