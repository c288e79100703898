//! Session, data-access, logging and notification collaborators.
//!
//! The engine never looks a session up on its own. Hosts either hand a
//! [`SessionProvider`] plus [`ConnectionSettings`] to
//! [`ScanController::connect`](crate::ScanController::connect), or pass an
//! already running shared session to
//! [`ScanController::attach`](crate::ScanController::attach).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{CoreResult, StoreResult};
use crate::model::{Station, StationId, StationType, StationTypeId};

/// Log category for load-path records that are not tied to a station yet.
pub const STATION_SCRIPT_CATEGORY: &str = "StationScript";

/// Per-station log category used for traceability.
pub fn log_category(station_id: StationId) -> String {
    format!("wcs.scan_controller({})", station_id)
}

/// How credentials are presented to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Login and password from the settings
    #[default]
    Password,
    /// The host process identity
    Integrated,
}

/// Parameters for establishing a new session.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Host (or snapshot directory) of the backing store
    pub server: String,
    /// Database (or snapshot file) name
    pub database: String,
    #[serde(default)]
    pub login: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub auth: AuthMode,
}

impl ConnectionSettings {
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = login.into();
        self.password = password.into();
        self.auth = AuthMode::Password;
        self
    }

    pub fn integrated(mut self) -> Self {
        self.auth = AuthMode::Integrated;
        self
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("auth", &self.auth)
            .finish()
    }
}

/// Read access to station rows.
#[async_trait]
pub trait StationStore: Send + Sync {
    /// Fetch a station. `Ok(None)` means the row does not exist.
    async fn load_station(&self, id: StationId) -> StoreResult<Option<Station>>;

    /// Fetch a station type. `Ok(None)` means the row does not exist.
    async fn load_station_type(&self, id: StationTypeId) -> StoreResult<Option<StationType>>;
}

/// An entry written through [`ErrorLog::write_error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    pub category: String,
    pub logged_at: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(message: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: category.into(),
            logged_at: Utc::now(),
        }
    }
}

/// Operational error log kept by the backing system.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorLog: Send + Sync {
    /// Record an error entry. Returns whether the entry was stored.
    fn write_error(&self, message: &str, category: &str) -> bool;
}

/// User-facing message surface for construction failures.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// A connected handle to the backing system.
///
/// Sessions may be shared by many controllers; nothing in the engine
/// mutates them.
pub trait Session: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn store(&self) -> &dyn StationStore;

    fn error_log(&self) -> &dyn ErrorLog;
}

/// Establishes new sessions from explicit parameters.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn connect(&self, settings: &ConnectionSettings) -> CoreResult<Arc<dyn Session>>;
}

/// Notifier that reports through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str) {
        error!(title, "{}", message);
    }
}
