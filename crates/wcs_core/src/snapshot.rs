//! File-backed station store.
//!
//! A snapshot is a station table and a station-type table exported to a
//! single file, used to commission or replay stations without the live
//! database. [`SnapshotSessionProvider`] resolves
//! `<server>/<database>[.toml|.json|.yaml|.yml]` from the connection
//! settings.
//!
//! ```toml
//! [[station_types]]
//! id = 1
//! key = "ST.CONV.BUFFER"
//!
//! [[stations]]
//! id = 10
//! name = "Infeed buffer"
//! station_type_id = 1
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, StoreError, StoreResult};
use crate::model::{Station, StationId, StationType, StationTypeId};
use crate::session::{
    AuthMode, ConnectionSettings, ErrorEntry, ErrorLog, Session, SessionProvider, StationStore,
};

const SNAPSHOT_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml"];

/// Credentials a snapshot may require.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCredentials {
    pub login: String,
    pub password: String,
}

/// On-disk snapshot layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub credentials: Option<SnapshotCredentials>,
    #[serde(default)]
    pub station_types: Vec<StationType>,
    #[serde(default)]
    pub stations: Vec<Station>,
}

impl SnapshotFile {
    /// Parse snapshot content according to the file extension.
    pub fn parse(content: &str, extension: &str) -> CoreResult<Self> {
        let parsed = match extension {
            "toml" => toml::from_str(content).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(content).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            other => Err(format!("unsupported snapshot format '{}'", other)),
        };
        parsed.map_err(CoreError::ConnectionFailed)
    }
}

/// Opens [`SnapshotSession`]s from files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotSessionProvider;

impl SnapshotSessionProvider {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the snapshot file named by the settings.
    pub fn resolve_path(settings: &ConnectionSettings) -> CoreResult<PathBuf> {
        let base = Path::new(&settings.server).join(&settings.database);
        if base.extension().is_some() {
            if base.is_file() {
                return Ok(base);
            }
        } else {
            for ext in SNAPSHOT_EXTENSIONS {
                let candidate = base.with_extension(ext);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(CoreError::ConnectionFailed(format!(
            "no snapshot named '{}' under '{}'",
            settings.database, settings.server
        )))
    }
}

#[async_trait]
impl SessionProvider for SnapshotSessionProvider {
    async fn connect(&self, settings: &ConnectionSettings) -> CoreResult<Arc<dyn Session>> {
        let path = Self::resolve_path(settings)?;
        let content = tokio::fs::read_to_string(&path).await?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let snapshot = SnapshotFile::parse(&content, &extension)?;

        if settings.auth == AuthMode::Password {
            if let Some(expected) = &snapshot.credentials {
                if expected.login != settings.login || expected.password != settings.password {
                    return Err(CoreError::ConnectionFailed(format!(
                        "login failed for user '{}'",
                        settings.login
                    )));
                }
            }
        }

        let session = SnapshotSession::from_snapshot(path.display().to_string(), snapshot)?;
        info!("Opened snapshot session {} ({})", session.name(), session.id());
        Ok(Arc::new(session))
    }
}

/// Session over an in-memory copy of a snapshot file.
pub struct SnapshotSession {
    id: Uuid,
    name: String,
    connected: AtomicBool,
    stations: BTreeMap<StationId, Station>,
    station_types: BTreeMap<StationTypeId, StationType>,
    errors: RwLock<Vec<ErrorEntry>>,
}

impl SnapshotSession {
    /// Build a session from parsed tables. Duplicate ids are rejected.
    pub fn from_snapshot(source: impl Into<String>, snapshot: SnapshotFile) -> CoreResult<Self> {
        let source = source.into();

        let mut station_types = BTreeMap::new();
        for station_type in snapshot.station_types {
            let id = station_type.id;
            if station_types.insert(id, station_type).is_some() {
                return Err(CoreError::ConnectionFailed(format!(
                    "{}: duplicate station type id {}",
                    source, id
                )));
            }
        }

        let mut stations = BTreeMap::new();
        for station in snapshot.stations {
            let id = station.id;
            if stations.insert(id, station).is_some() {
                return Err(CoreError::ConnectionFailed(format!(
                    "{}: duplicate station id {}",
                    source, id
                )));
            }
        }

        debug!(
            "{}: {} station(s), {} station type(s)",
            source,
            stations.len(),
            station_types.len()
        );

        Ok(Self {
            id: Uuid::new_v4(),
            name: format!("snapshot:{}", source),
            connected: AtomicBool::new(true),
            stations,
            station_types,
            errors: RwLock::new(Vec::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Close the session; later lookups fail with [`StoreError::Closed`].
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Error-log entries written during this session.
    pub fn errors(&self) -> Vec<ErrorEntry> {
        self.errors.read().clone()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }
}

#[async_trait]
impl StationStore for SnapshotSession {
    async fn load_station(&self, id: StationId) -> StoreResult<Option<Station>> {
        self.ensure_open()?;
        Ok(self.stations.get(&id).cloned())
    }

    async fn load_station_type(&self, id: StationTypeId) -> StoreResult<Option<StationType>> {
        self.ensure_open()?;
        match self.station_types.get(&id) {
            Some(station_type) if station_type.key.trim().is_empty() => {
                Err(StoreError::MalformedStationType {
                    id,
                    message: "empty key".to_string(),
                })
            }
            other => Ok(other.cloned()),
        }
    }
}

impl ErrorLog for SnapshotSession {
    fn write_error(&self, message: &str, category: &str) -> bool {
        error!(category, "{}", message);
        self.errors.write().push(ErrorEntry::new(message, category));
        true
    }
}

impl Session for SnapshotSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn store(&self) -> &dyn StationStore {
        self
    }

    fn error_log(&self) -> &dyn ErrorLog {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TOML_SNAPSHOT: &str = r#"
[credentials]
login = "svc_wcs"
password = "conveyor"

[[station_types]]
id = 1
key = "ST.CONV.GROUPBUFFER"
description = "Grouping buffer"

[[stations]]
id = 21
name = "Group buffer 1"
station_type_id = 1

[stations.config]
lanes = 4
"#;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn settings(dir: &TempDir) -> ConnectionSettings {
        ConnectionSettings::new(dir.path().to_string_lossy(), "plant")
            .with_credentials("svc_wcs", "conveyor")
    }

    #[tokio::test]
    async fn test_connect_toml_snapshot() {
        let dir = TempDir::new().unwrap();
        write(&dir, "plant.toml", TOML_SNAPSHOT);

        let session = SnapshotSessionProvider.connect(&settings(&dir)).await.unwrap();
        assert!(session.is_connected());
        assert!(session.name().starts_with("snapshot:"));

        let station = session
            .store()
            .load_station(StationId(21))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(station.name, "Group buffer 1");
        assert_eq!(station.config["lanes"], 4);

        let station_type = session
            .store()
            .load_station_type(station.station_type_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(station_type.key, "ST.CONV.GROUPBUFFER");
    }

    #[tokio::test]
    async fn test_connect_json_snapshot_by_explicit_name() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "line2.json",
            r#"{
                "station_types": [{"id": 4, "key": "ST.CONV.HOODERSTATION"}],
                "stations": [{"id": 3, "station_type_id": 4}]
            }"#,
        );

        let settings = ConnectionSettings::new(dir.path().to_string_lossy(), "line2.json").integrated();
        let session = SnapshotSessionProvider.connect(&settings).await.unwrap();

        assert!(session
            .store()
            .load_station(StationId(3))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_connect_yaml_snapshot() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "plant.yaml",
            "station_types:\n  - id: 2\n    key: ST.CONV.BUFFER\nstations:\n  - id: 9\n    station_type_id: 2\n",
        );

        let session = SnapshotSessionProvider
            .connect(&ConnectionSettings::new(dir.path().to_string_lossy(), "plant"))
            .await
            .unwrap();
        assert!(session
            .store()
            .load_station_type(StationTypeId(2))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_missing_snapshot_fails_to_connect() {
        let dir = TempDir::new().unwrap();
        let err = SnapshotSessionProvider
            .connect(&settings(&dir))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, CoreError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_wrong_password_is_refused() {
        let dir = TempDir::new().unwrap();
        write(&dir, "plant.toml", TOML_SNAPSHOT);

        let settings = ConnectionSettings::new(dir.path().to_string_lossy(), "plant")
            .with_credentials("svc_wcs", "wrong");
        let err = SnapshotSessionProvider.connect(&settings).await.err().unwrap();

        assert!(err.to_string().contains("login failed"));
    }

    #[tokio::test]
    async fn test_integrated_auth_skips_credentials() {
        let dir = TempDir::new().unwrap();
        write(&dir, "plant.toml", TOML_SNAPSHOT);

        let settings = ConnectionSettings::new(dir.path().to_string_lossy(), "plant").integrated();
        assert!(SnapshotSessionProvider.connect(&settings).await.is_ok());
    }

    #[test]
    fn test_duplicate_station_ids_are_rejected() {
        let snapshot = SnapshotFile {
            credentials: None,
            station_types: vec![StationType::new(StationTypeId(1), "ST.CONV.BUFFER")],
            stations: vec![
                Station::new(1, StationTypeId(1)),
                Station::new(1, StationTypeId(1)),
            ],
        };

        assert!(SnapshotSession::from_snapshot("test", snapshot).is_err());
    }

    #[tokio::test]
    async fn test_closed_session_and_malformed_type() {
        let snapshot = SnapshotFile {
            credentials: None,
            station_types: vec![StationType::new(StationTypeId(1), "  ")],
            stations: vec![Station::new(1, StationTypeId(1))],
        };
        let session = SnapshotSession::from_snapshot("test", snapshot).unwrap();

        let err = session.load_station_type(StationTypeId(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::MalformedStationType { .. }));

        session.close();
        assert!(!session.is_connected());
        assert!(matches!(
            session.load_station(StationId(1)).await,
            Err(StoreError::Closed)
        ));
    }
}
