//! Station loader: resolves a station and its type through a session.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::model::{Station, StationId, StationType, StationTypeId};
use crate::session::{log_category, Session, STATION_SCRIPT_CATEGORY};

/// Why a controller could not be loaded.
///
/// A controller that records one of these stays unloaded for its lifetime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    #[error("Session unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Invalid station id: {0}")]
    InvalidStationId(StationId),

    #[error("Station {0} not found")]
    StationNotFound(StationId),

    #[error("Station type {type_id} of station {station} not found")]
    StationTypeNotFound {
        station: StationId,
        type_id: StationTypeId,
    },

    #[error("Store failure while loading station {station}: {message}")]
    Store { station: StationId, message: String },

    #[error("Station type key '{key}' of station {station} has no registered variant")]
    UnknownStationType { station: StationId, key: String },

    #[error("Variant construction failed for station {station}: {message}")]
    DispatchFailure { station: StationId, message: String },
}

impl LoadFailure {
    /// True for the record-not-found family.
    pub fn is_record_not_found(&self) -> bool {
        matches!(
            self,
            LoadFailure::StationNotFound(_) | LoadFailure::StationTypeNotFound { .. }
        )
    }
}

/// A station row together with its type row.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedStation {
    pub station: Station,
    pub station_type: StationType,
}

/// Loads a station once; performs no retries.
pub struct StationLoader<'a> {
    session: Option<&'a Arc<dyn Session>>,
}

impl<'a> StationLoader<'a> {
    pub fn new(session: Option<&'a Arc<dyn Session>>) -> Self {
        Self { session }
    }

    /// Resolve `(Station, StationType)` for `station_id`.
    ///
    /// Missing rows and store errors are written to the session's error log
    /// before the failure is returned.
    pub async fn load(&self, station_id: StationId) -> Result<LoadedStation, LoadFailure> {
        let session = match self.session {
            Some(session) if session.is_connected() => session,
            Some(session) => {
                warn!(station = %station_id, "session {} is not connected", session.name());
                return Err(LoadFailure::ConnectionUnavailable(format!(
                    "session {} is not connected",
                    session.name()
                )));
            }
            None => {
                warn!(station = %station_id, "no session handle");
                return Err(LoadFailure::ConnectionUnavailable(
                    "no session handle".to_string(),
                ));
            }
        };

        if !station_id.is_valid() {
            return Err(LoadFailure::InvalidStationId(station_id));
        }

        let category = log_category(station_id);
        let store = session.store();
        let log = session.error_log();

        let station = match store.load_station(station_id).await {
            Ok(Some(station)) => station,
            Ok(None) => {
                let message = format!("Unable to load station record for ID {}.", station_id);
                error!(station = %station_id, "{}", message);
                log.write_error(&message, STATION_SCRIPT_CATEGORY);
                return Err(LoadFailure::StationNotFound(station_id));
            }
            Err(e) => {
                let e = anyhow::Error::new(e);
                error!(station = %station_id, "station load failed: {:#}", e);
                log.write_error(&format!("load_station(): {:#}", e), &category);
                return Err(LoadFailure::Store {
                    station: station_id,
                    message: format!("{:#}", e),
                });
            }
        };

        let type_id = station.station_type_id;
        let station_type = match store.load_station_type(type_id).await {
            Ok(Some(station_type)) => station_type,
            Ok(None) => {
                let message = format!(
                    "Unable to load station type {} for station ID {}.",
                    type_id, station_id
                );
                error!(station = %station_id, "{}", message);
                log.write_error(&message, &category);
                return Err(LoadFailure::StationTypeNotFound {
                    station: station_id,
                    type_id,
                });
            }
            Err(e) => {
                let e = anyhow::Error::new(e);
                error!(station = %station_id, "station type load failed: {:#}", e);
                log.write_error(&format!("load_station_type(): {:#}", e), &category);
                return Err(LoadFailure::Store {
                    station: station_id,
                    message: format!("{:#}", e),
                });
            }
        };

        debug!(
            station = %station_id,
            key = %station_type.key,
            "station loaded"
        );

        Ok(LoadedStation {
            station,
            station_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemorySession;

    fn session(memory: MemorySession) -> Arc<dyn Session> {
        Arc::new(memory)
    }

    #[tokio::test]
    async fn test_load_success() {
        let memory = MemorySession::new().with_station(5, "ST.CONV.BUFFER");
        let session = session(memory);

        let loaded = StationLoader::new(Some(&session))
            .load(StationId(5))
            .await
            .unwrap();

        assert_eq!(loaded.station.id, StationId(5));
        assert_eq!(loaded.station_type.key, "ST.CONV.BUFFER");
    }

    #[tokio::test]
    async fn test_missing_session() {
        let err = StationLoader::new(None).load(StationId(5)).await.unwrap_err();
        assert!(matches!(err, LoadFailure::ConnectionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_disconnected_session_touches_nothing() {
        let memory = MemorySession::new().with_station(5, "ST.CONV.BUFFER");
        memory.disconnect();
        let observed = memory.clone();
        let session = session(memory);

        let err = StationLoader::new(Some(&session))
            .load(StationId(5))
            .await
            .unwrap_err();

        assert!(matches!(err, LoadFailure::ConnectionUnavailable(_)));
        assert_eq!(observed.station_lookups(), 0);
        assert!(observed.errors().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_station_id() {
        let session = session(MemorySession::new());
        let err = StationLoader::new(Some(&session))
            .load(StationId(0))
            .await
            .unwrap_err();

        assert_eq!(err, LoadFailure::InvalidStationId(StationId(0)));
    }

    #[tokio::test]
    async fn test_missing_station_is_logged_and_stops_before_type() {
        let memory = MemorySession::new();
        let observed = memory.clone();
        let session = session(memory);

        let err = StationLoader::new(Some(&session))
            .load(StationId(99))
            .await
            .unwrap_err();

        assert_eq!(err, LoadFailure::StationNotFound(StationId(99)));
        assert!(err.is_record_not_found());
        assert_eq!(observed.type_lookups(), 0);

        let errors = observed.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, STATION_SCRIPT_CATEGORY);
        assert!(errors[0].message.contains("99"));
    }

    #[tokio::test]
    async fn test_missing_station_type() {
        let memory = MemorySession::new()
            .with_raw_station(Station::new(3, StationTypeId(404)));
        let observed = memory.clone();
        let session = session(memory);

        let err = StationLoader::new(Some(&session))
            .load(StationId(3))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadFailure::StationTypeNotFound { type_id: StationTypeId(404), .. }
        ));
        assert_eq!(observed.errors()[0].category, "wcs.scan_controller(3)");
    }

    #[tokio::test]
    async fn test_store_error_is_logged_with_station_category() {
        let memory = MemorySession::new()
            .with_station(8, "ST.CONV.GROUPING")
            .fail_station_loads("socket reset");
        let observed = memory.clone();
        let session = session(memory);

        let err = StationLoader::new(Some(&session))
            .load(StationId(8))
            .await
            .unwrap_err();

        assert!(matches!(err, LoadFailure::Store { station: StationId(8), .. }));

        let errors = observed.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, "wcs.scan_controller(8)");
        assert!(errors[0].message.contains("socket reset"));
    }

    #[tokio::test]
    async fn test_type_store_error_is_logged_with_station_category() {
        let memory = MemorySession::new()
            .with_station(14, "ST.CONV.STACKERSYSTEM")
            .fail_type_loads("type table locked");
        let observed = memory.clone();
        let session = session(memory);

        let err = StationLoader::new(Some(&session))
            .load(StationId(14))
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            LoadFailure::Store { station: StationId(14), message } if message.contains("type table locked")
        ));
        assert!(!err.is_record_not_found());
        assert_eq!(observed.station_lookups(), 1);
        assert_eq!(observed.type_lookups(), 1);

        let errors = observed.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, "wcs.scan_controller(14)");
        assert!(errors[0].message.starts_with("load_station_type():"));
        assert!(errors[0].message.contains("type table locked"));
    }
}
