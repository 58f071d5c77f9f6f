//! Serializable pipeline configuration.
//!
//! Loaded from TOML; every section and field has a default so a partial file
//! (or none at all) is valid input. `validate()` is the single gate before any
//! stage runs.
//!
//! ```toml
//! [storage]
//! base_path = "data"
//!
//! [extractor]
//! tickers = ["AAPL", "MSFT"]
//! start_date = "2024-01-01"
//! end_date = "2024-12-31"
//! provider = "yahoo"
//!
//! [transformer]
//! roll_avg_days = 30
//! ema_span = 14
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockflow_core::features::{DEFAULT_EMA_SPAN, DEFAULT_ROLL_WINDOW};
use stockflow_core::TransformParams;

/// Upper bound on `extractor.retries`.
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which market-data source the extractor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Yahoo,
    Csv,
    Synthetic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Yahoo => "yahoo",
            ProviderKind::Csv => "csv",
            ProviderKind::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yahoo" => Ok(ProviderKind::Yahoo),
            "csv" => Ok(ProviderKind::Csv),
            "synthetic" => Ok(ProviderKind::Synthetic),
            other => Err(ConfigError::Invalid(format!(
                "unknown provider '{other}'. Valid: yahoo, csv, synthetic"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Root of the staging store.
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    pub tickers: Vec<String>,
    /// First day requested (inclusive).
    pub start_date: NaiveDate,
    /// Last day bound (exclusive).
    pub end_date: NaiveDate,
    pub provider: ProviderKind,
    /// Directory of `{TICKER}.csv` exports, for the csv provider.
    pub import_dir: Option<PathBuf>,
    /// Transient-failure retries for the Yahoo provider.
    pub retries: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let today = chrono::Local::now().date_naive();
        Self {
            tickers: Vec::new(),
            start_date: today - chrono::Duration::days(365),
            end_date: today,
            provider: ProviderKind::default(),
            import_dir: None,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformerConfig {
    pub roll_avg_days: usize,
    pub ema_span: usize,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            roll_avg_days: DEFAULT_ROLL_WINDOW,
            ema_span: DEFAULT_EMA_SPAN,
        }
    }
}

/// Complete configuration for one pipeline run, passed explicitly to each stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub extractor: ExtractorConfig,
    pub transformer: TransformerConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(format!("serialize: {e}")))
    }

    /// Reject configurations no stage could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_tickers(&self.extractor.tickers)?;
        validate_range(self.extractor.start_date, self.extractor.end_date)?;
        self.transform_params()?;
        if self.extractor.retries > MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "extractor.retries = {} exceeds the limit of {MAX_RETRIES}",
                self.extractor.retries
            )));
        }
        if self.extractor.provider == ProviderKind::Csv && self.extractor.import_dir.is_none() {
            return Err(ConfigError::Invalid(
                "provider 'csv' needs extractor.import_dir".into(),
            ));
        }
        Ok(())
    }

    pub fn transform_params(&self) -> Result<TransformParams, ConfigError> {
        TransformParams::new(self.transformer.roll_avg_days, self.transformer.ema_span)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

pub(crate) fn validate_tickers(tickers: &[String]) -> Result<(), ConfigError> {
    if tickers.is_empty() {
        return Err(ConfigError::Invalid("ticker list is empty".into()));
    }
    if let Some(bad) = tickers.iter().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!("blank ticker '{bad}'")));
    }
    Ok(())
}

pub(crate) fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), ConfigError> {
    if start >= end {
        return Err(ConfigError::Invalid(format!(
            "start date {start} must be before end date {end}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[storage]
base_path = "/var/stockflow"

[extractor]
tickers = ["AAPL", "MSFT"]
start_date = "2024-01-01"
end_date = "2024-12-31"
provider = "synthetic"

[transformer]
roll_avg_days = 20
ema_span = 10
"#;

    #[test]
    fn parses_full_file() {
        let config = PipelineConfig::from_toml(FULL).unwrap();
        assert_eq!(config.storage.base_path, PathBuf::from("/var/stockflow"));
        assert_eq!(config.extractor.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(
            config.extractor.start_date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(config.extractor.provider, ProviderKind::Synthetic);
        assert_eq!(config.transform_params().unwrap(), TransformParams::new(20, 10).unwrap());
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config = PipelineConfig::from_toml("[extractor]\ntickers = [\"SPY\"]\n").unwrap();
        assert_eq!(config.storage.base_path, PathBuf::from("data"));
        assert_eq!(config.transformer.roll_avg_days, 30);
        assert_eq!(config.transformer.ema_span, 14);
        assert_eq!(config.extractor.provider, ProviderKind::Yahoo);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_field_is_parse_error() {
        assert!(matches!(
            PipelineConfig::from_toml("[transformer]\nroll_window = 5\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn validation_failures() {
        let base = PipelineConfig::from_toml(FULL).unwrap();

        let mut c = base.clone();
        c.extractor.tickers.clear();
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = base.clone();
        c.extractor.end_date = c.extractor.start_date;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = base.clone();
        c.transformer.ema_span = 0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = base.clone();
        c.extractor.retries = MAX_RETRIES + 1;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
        c.extractor.retries = MAX_RETRIES;
        c.validate().unwrap();

        let mut c = base;
        c.extractor.provider = ProviderKind::Csv;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn toml_roundtrip() {
        let config = PipelineConfig::from_toml(FULL).unwrap();
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn provider_kind_from_str() {
        assert_eq!("Yahoo".parse::<ProviderKind>().unwrap(), ProviderKind::Yahoo);
        assert_eq!("csv".parse::<ProviderKind>().unwrap(), ProviderKind::Csv);
        assert!("bloomberg".parse::<ProviderKind>().is_err());
    }
}
