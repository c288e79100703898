//! # wcs_core
//!
//! Station scan engine for warehouse conveyor control.
//!
//! A [`ScanController`] owns exactly one conveyor station. At construction it
//! loads the station and its station type through a [`Session`], maps the
//! type key to a [`StationKind`] and builds the single matching variant from
//! a [`VariantRegistry`]. Each call to [`ScanController::execute`] then runs
//! one scan cycle: the kind's phases, in order, against that variant.
//!
//! # Architecture
//!
//! - **Kinds**: The closed set of station-type keys and their phase plans
//! - **Registry**: Maps kinds to variant constructors
//! - **Loader**: Resolves station and station-type records from a session
//! - **Controller**: Load-once, scan-many driver with a single-flight guard
//! - **Scheduler**: Ticks many controllers concurrently
//! - **Snapshot**: File-backed sessions for commissioning and replay
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wcs_core::{
//!     ControllerOptions, ScanController, StationId, TracingNotifier, VariantRegistry,
//! };
//!
//! let registry = VariantRegistry::commissioning();
//! let controller = ScanController::attach(
//!     StationId(21),
//!     Some(shared_session),
//!     &registry,
//!     &TracingNotifier,
//!     ControllerOptions::default(),
//! )
//! .await;
//!
//! if controller.is_loaded() {
//!     controller.execute().await?;
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod kind;
pub mod loader;
pub mod mock;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod variant;

// Re-export main types for convenience
pub use config::{ScanSettings, WcsConfig, PASSWORD_ENV};
pub use controller::{
    ControllerOptions, ControllerState, CycleOutcome, CycleReport, ScanController,
    CONNECTION_NOTICE_TITLE,
};
pub use error::{CoreError, CoreResult, StoreError, StoreResult};
pub use kind::{ScanPhase, StationKind};
pub use loader::{LoadFailure, LoadedStation, StationLoader};
pub use mock::{MemorySession, PhaseRecorder, RecordedPhase, RecordingVariant};
pub use model::{Station, StationId, StationType, StationTypeId};
pub use registry::{VariantConstructor, VariantRegistry};
pub use scheduler::{FailurePolicy, ScanScheduler, ScanSummary};
pub use session::{
    log_category, AuthMode, ConnectionSettings, ErrorEntry, ErrorLog, Notifier, Session,
    SessionProvider, StationStore, TracingNotifier, STATION_SCRIPT_CATEGORY,
};
pub use snapshot::{SnapshotCredentials, SnapshotFile, SnapshotSession, SnapshotSessionProvider};
pub use variant::{CommissioningVariant, StationVariant, VariantContext};
