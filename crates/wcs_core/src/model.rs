//! Persisted station records.
//!
//! Both records are owned by the backing store. The engine loads them once
//! per controller and never writes them back.

use serde::{Deserialize, Serialize};

/// Identifier of a station row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub i64);

impl StationId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    /// Store keys start at 1.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for StationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of a station type row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationTypeId(pub i64);

impl std::fmt::Display for StationTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One physical conveyor control point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    #[serde(default)]
    pub name: String,
    pub station_type_id: StationTypeId,
    /// Variant-specific settings, opaque to the engine
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Station {
    pub fn new(id: impl Into<StationId>, station_type_id: StationTypeId) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            station_type_id,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Discriminator row selecting a station's control behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationType {
    pub id: StationTypeId,
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl StationType {
    pub fn new(id: StationTypeId, key: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            description: None,
        }
    }
}
