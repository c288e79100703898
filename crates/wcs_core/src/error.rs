//! Error types for the scan engine.

use thiserror::Error;

use crate::kind::ScanPhase;
use crate::model::{StationId, StationTypeId};

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type alias for backing-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Session connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid station id: {0}")]
    InvalidStationId(i64),

    #[error("Variant already registered for station type {0}")]
    DuplicateVariant(String),

    #[error("Scan already in progress for station {0}")]
    ScanInProgress(StationId),

    #[error("Station {station} failed in {phase} phase")]
    PhaseFailed {
        station: StationId,
        phase: ScanPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("Scan task for station {station} aborted")]
    ScanAborted {
        station: StationId,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`StationStore`](crate::session::StationStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session is closed")]
    Closed,

    #[error("Malformed station type {id}: {message}")]
    MalformedStationType { id: StationTypeId, message: String },

    #[error("Store I/O failed: {0}")]
    Io(String),
}
