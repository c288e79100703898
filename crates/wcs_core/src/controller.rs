//! Scan controller: load once, then run one scan cycle per call.
//!
//! # State machine
//!
//! ```text
//! Unloaded (terminal)
//! Idle --execute--> Running --phases return--> Idle
//! ```
//!
//! Construction never returns an error. A controller that fails to load
//! records a [`LoadFailure`] and stays `Unloaded`; `execute` on it is a no-op
//! forever. Phase errors during a cycle are returned from `execute` and leave
//! the controller `Idle`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::error::{CoreError, CoreResult};
use crate::kind::{ScanPhase, StationKind};
use crate::loader::{LoadFailure, LoadedStation, StationLoader};
use crate::model::{Station, StationId, StationType};
use crate::registry::VariantRegistry;
use crate::session::{log_category, ConnectionSettings, Notifier, Session, SessionProvider};
use crate::variant::{StationVariant, VariantContext};

/// Title used for user-facing connection notifications.
pub const CONNECTION_NOTICE_TITLE: &str = "Session connection";

/// Construction options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Passed to variant constructors
    pub debug: bool,
    /// Treat a station-type key without a variant as a load failure
    pub strict_dispatch: bool,
}

impl ControllerOptions {
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn strict_dispatch(mut self, strict: bool) -> Self {
        self.strict_dispatch = strict;
        self
    }
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Load failed; terminal
    Unloaded,
    /// Loaded, no cycle in progress
    Idle,
    /// A cycle is in progress
    Running,
}

/// What a single `execute` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Controller is not loaded; nothing happened
    Skipped,
    /// Loaded without an active variant; no phases ran
    Inert,
    /// Every phase of the plan ran
    Completed(CycleReport),
}

/// Record of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub station: StationId,
    pub kind: StationKind,
    pub phases: Vec<ScanPhase>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// The single variant instance bound at construction.
struct ActiveVariant {
    kind: StationKind,
    phases: &'static [ScanPhase],
    variant: Mutex<Box<dyn StationVariant>>,
}

/// Clears the running flag on every exit path, including phase errors.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns one station's variant and drives its scan cycles.
pub struct ScanController {
    station_id: StationId,
    session: Option<Arc<dyn Session>>,
    loaded: Option<LoadedStation>,
    failure: Option<LoadFailure>,
    active: Option<ActiveVariant>,
    scan_running: AtomicBool,
    cycles: AtomicU64,
}

impl ScanController {
    /// Establish a new session from explicit parameters, then load.
    ///
    /// Connection failures are reported through `notifier`.
    pub async fn connect(
        station_id: StationId,
        settings: &ConnectionSettings,
        provider: &dyn SessionProvider,
        registry: &VariantRegistry,
        notifier: &dyn Notifier,
        options: ControllerOptions,
    ) -> Self {
        match provider.connect(settings).await {
            Ok(session) => {
                Self::attach(station_id, Some(session), registry, notifier, options).await
            }
            Err(e) => {
                let message = e.to_string();
                error!(station = %station_id, "session connection failed: {}", message);
                notifier.notify(CONNECTION_NOTICE_TITLE, &message);
                Self::unloaded(station_id, None, LoadFailure::ConnectionUnavailable(message))
            }
        }
    }

    /// Load using a session the host already runs.
    ///
    /// `None` means no shared session is running; that is reported through
    /// `notifier` like a failed connection.
    pub async fn attach(
        station_id: StationId,
        session: Option<Arc<dyn Session>>,
        registry: &VariantRegistry,
        notifier: &dyn Notifier,
        options: ControllerOptions,
    ) -> Self {
        let Some(session) = session else {
            let message = "no shared session is running".to_string();
            error!(station = %station_id, "{}", message);
            notifier.notify(CONNECTION_NOTICE_TITLE, &message);
            return Self::unloaded(station_id, None, LoadFailure::ConnectionUnavailable(message));
        };

        let loaded = match StationLoader::new(Some(&session)).load(station_id).await {
            Ok(loaded) => loaded,
            Err(failure) => {
                if let LoadFailure::ConnectionUnavailable(message) = &failure {
                    notifier.notify(CONNECTION_NOTICE_TITLE, message);
                }
                return Self::unloaded(station_id, Some(session), failure);
            }
        };

        match Self::dispatch(&session, &loaded, registry, options) {
            Ok(active) => {
                match &active {
                    Some(active) => info!(
                        station = %station_id,
                        kind = %active.kind,
                        "controller loaded ({})",
                        active.kind.label()
                    ),
                    None => info!(station = %station_id, "controller loaded without a variant"),
                }
                Self {
                    station_id,
                    session: Some(session),
                    loaded: Some(loaded),
                    failure: None,
                    active,
                    scan_running: AtomicBool::new(false),
                    cycles: AtomicU64::new(0),
                }
            }
            Err(failure) => Self::unloaded(station_id, Some(session), failure),
        }
    }

    /// Resolve the type key and build the single matching variant.
    fn dispatch(
        session: &Arc<dyn Session>,
        loaded: &LoadedStation,
        registry: &VariantRegistry,
        options: ControllerOptions,
    ) -> Result<Option<ActiveVariant>, LoadFailure> {
        let station_id = loaded.station.id;
        let key = &loaded.station_type.key;
        let category = log_category(station_id);

        let Some((kind, constructor)) = registry.resolve(key) else {
            let message = format!(
                "No variant registered for station type key '{}' (station {}).",
                key, station_id
            );
            warn!(station = %station_id, "{}", message);
            session.error_log().write_error(&message, &category);
            if options.strict_dispatch {
                return Err(LoadFailure::UnknownStationType {
                    station: station_id,
                    key: key.clone(),
                });
            }
            return Ok(None);
        };

        let context = VariantContext {
            session: Arc::clone(session),
            station: loaded.station.clone(),
            station_type: loaded.station_type.clone(),
            kind,
            debug: options.debug,
        };

        match constructor(&context) {
            Ok(variant) => {
                debug!(station = %station_id, kind = %kind, "variant constructed");
                Ok(Some(ActiveVariant {
                    kind,
                    phases: kind.phases(),
                    variant: Mutex::new(variant),
                }))
            }
            Err(e) => {
                error!(station = %station_id, kind = %kind, "variant construction failed: {:#}", e);
                session
                    .error_log()
                    .write_error(&format!("dispatch(): {:#}", e), &category);
                Err(LoadFailure::DispatchFailure {
                    station: station_id,
                    message: format!("{:#}", e),
                })
            }
        }
    }

    fn unloaded(
        station_id: StationId,
        session: Option<Arc<dyn Session>>,
        failure: LoadFailure,
    ) -> Self {
        warn!(station = %station_id, "controller not loaded: {}", failure);
        Self {
            station_id,
            session,
            loaded: None,
            failure: Some(failure),
            active: None,
            scan_running: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        }
    }

    /// Run one scan cycle.
    ///
    /// At most one cycle runs at a time; a call that arrives while another
    /// is in flight fails with [`CoreError::ScanInProgress`] and invokes no
    /// phase. Phases run synchronously, in the order given by the station
    /// kind. The first phase error ends the cycle and is returned as
    /// [`CoreError::PhaseFailed`].
    ///
    /// Phases run on the calling task. Hosts driving many stations should
    /// use [`scan_blocking`](Self::scan_blocking) instead, as
    /// [`ScanScheduler`](crate::ScanScheduler) does.
    pub async fn execute(&self) -> CoreResult<CycleOutcome> {
        self.scan()
    }

    /// Run one scan cycle on tokio's blocking pool.
    ///
    /// Same semantics as [`execute`](Self::execute), but a variant that
    /// blocks inside a phase does not hold a runtime worker.
    pub async fn scan_blocking(self: Arc<Self>) -> CoreResult<CycleOutcome> {
        let station = self.station_id;
        tokio::task::spawn_blocking(move || self.scan())
            .await
            .map_err(|source| CoreError::ScanAborted { station, source })?
    }

    fn scan(&self) -> CoreResult<CycleOutcome> {
        if self.loaded.is_none() {
            trace!(station = %self.station_id, "skipping scan of unloaded controller");
            return Ok(CycleOutcome::Skipped);
        }

        let _running = RunningGuard::claim(&self.scan_running)
            .ok_or(CoreError::ScanInProgress(self.station_id))?;

        let Some(active) = &self.active else {
            trace!(station = %self.station_id, "no active variant");
            return Ok(CycleOutcome::Inert);
        };

        let started_at = Utc::now();
        {
            let mut variant = active.variant.lock();
            for &phase in active.phases {
                variant.run_phase(phase).map_err(|source| {
                    error!(
                        station = %self.station_id,
                        kind = %active.kind,
                        phase = %phase,
                        "phase failed: {:#}",
                        source
                    );
                    CoreError::PhaseFailed {
                        station: self.station_id,
                        phase,
                        source,
                    }
                })?;
            }
        }
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(station = %self.station_id, cycle, "scan cycle complete");

        Ok(CycleOutcome::Completed(CycleReport {
            station: self.station_id,
            kind: active.kind,
            phases: active.phases.to_vec(),
            started_at,
            completed_at: Utc::now(),
        }))
    }

    pub fn station_id(&self) -> StationId {
        self.station_id
    }

    /// True iff session, station, type and dispatch all succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// True only while a cycle is in progress.
    pub fn is_scan_running(&self) -> bool {
        self.scan_running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ControllerState {
        if !self.is_loaded() {
            ControllerState::Unloaded
        } else if self.is_scan_running() {
            ControllerState::Running
        } else {
            ControllerState::Idle
        }
    }

    /// Why the controller is unloaded, if it is.
    pub fn load_failure(&self) -> Option<&LoadFailure> {
        self.failure.as_ref()
    }

    /// Kind of the active variant, if one is bound.
    pub fn kind(&self) -> Option<StationKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    /// Phases one cycle invokes; empty without an active variant.
    pub fn phases(&self) -> &'static [ScanPhase] {
        self.active.as_ref().map(|a| a.phases).unwrap_or(&[])
    }

    pub fn station(&self) -> Option<&Station> {
        self.loaded.as_ref().map(|l| &l.station)
    }

    pub fn station_type(&self) -> Option<&StationType> {
        self.loaded.as_ref().map(|l| &l.station_type)
    }

    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// Number of cycles that ran every phase.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ScanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanController")
            .field("station_id", &self.station_id)
            .field("state", &self.state())
            .field("kind", &self.kind())
            .field("failure", &self.failure)
            .finish()
    }
}
