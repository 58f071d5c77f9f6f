//! Partition keys and staging phases.
//!
//! A partition key is the extraction date formatted `YYYY_MM_DD`. It names the
//! directory every stage reads from and writes to, so it is validated once on
//! construction and carried around as an opaque value afterwards.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EtlError;

const KEY_FORMAT: &str = "%Y_%m_%d";

/// Date-keyed partition identifier (`YYYY_MM_DD`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Parse and validate a `YYYY_MM_DD` key.
    pub fn parse(key: &str) -> Result<Self, EtlError> {
        let date = NaiveDate::parse_from_str(key, KEY_FORMAT)
            .map_err(|_| EtlError::InvalidPartitionKey(key.to_string()))?;
        // Re-render so "2024_1_2" style inputs cannot alias "2024_01_02".
        let canonical = Self::from_date(date);
        if canonical.0 != key {
            return Err(EtlError::InvalidPartitionKey(key.to_string()));
        }
        Ok(canonical)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(KEY_FORMAT).to_string())
    }

    /// Key for the local calendar date.
    pub fn today() -> Self {
        Self::from_date(chrono::Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        // The inner string is only ever built from a valid date.
        NaiveDate::parse_from_str(&self.0, KEY_FORMAT).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PartitionKey {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.0
    }
}

/// Pipeline phase owning a subtree of the staging namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Extract,
    Transform,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Extract => "extract",
            Phase::Transform => "transform",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extract" => Ok(Phase::Extract),
            "transform" => Ok(Phase::Transform),
            other => Err(EtlError::InvalidParameter(format!(
                "unknown phase '{other}' (expected extract or transform)"
            ))),
        }
    }
}
