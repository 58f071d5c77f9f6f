//! Data acquisition and staging

pub mod csv_import;
pub mod provider;
pub mod schema;
pub mod staging;
pub mod synthetic;
pub mod yahoo;

pub use csv_import::CsvImportProvider;
pub use provider::{DataError, DataProvider, DataSource, FetchResult};
pub use staging::{
    FileStagingStore, MemoryStagingStore, StagedEntity, StagingStore, CONSOLIDATED_ENTITY,
};
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;
