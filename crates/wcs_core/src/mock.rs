//! In-memory collaborators for testing.
//!
//! Provides a [`MemorySession`] backing store and a [`PhaseRecorder`] that
//! builds variants capturing every phase call, so controllers can be
//! exercised without a database or field hardware.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::kind::{ScanPhase, StationKind};
use crate::model::{Station, StationId, StationType, StationTypeId};
use crate::registry::VariantRegistry;
use crate::session::{ErrorEntry, ErrorLog, Session, StationStore};
use crate::variant::{StationVariant, VariantContext};

#[derive(Default)]
struct MemoryTables {
    stations: BTreeMap<StationId, Station>,
    station_types: BTreeMap<StationTypeId, StationType>,
}

/// In-memory session with a station table, a station-type table and a
/// capturing error log.
///
/// Clones share state, so a test can keep a observed after handing the
/// session to a controller.
#[derive(Clone)]
pub struct MemorySession {
    connected: Arc<AtomicBool>,
    tables: Arc<RwLock<MemoryTables>>,
    errors: Arc<RwLock<Vec<ErrorEntry>>>,
    station_failure: Arc<RwLock<Option<String>>>,
    type_failure: Arc<RwLock<Option<String>>>,
    station_lookups: Arc<AtomicUsize>,
    type_lookups: Arc<AtomicUsize>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// Create a connected, empty session.
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            tables: Arc::new(RwLock::new(MemoryTables::default())),
            errors: Arc::new(RwLock::new(Vec::new())),
            station_failure: Arc::new(RwLock::new(None)),
            type_failure: Arc::new(RwLock::new(None)),
            station_lookups: Arc::new(AtomicUsize::new(0)),
            type_lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a station whose type carries `key`.
    ///
    /// Station types are shared between stations with the same key.
    pub fn with_station(self, id: i64, key: &str) -> Self {
        {
            let mut tables = self.tables.write();
            let existing = tables
                .station_types
                .values()
                .find(|t| t.key == key)
                .map(|t| t.id);
            let type_id = match existing {
                Some(id) => id,
                None => {
                    let next = StationTypeId(tables.station_types.len() as i64 + 1);
                    tables
                        .station_types
                        .insert(next, StationType::new(next, key));
                    next
                }
            };
            tables
                .stations
                .insert(StationId(id), Station::new(id, type_id).with_name(format!("station-{}", id)));
        }
        self
    }

    /// Add a station row as-is, without touching the type table.
    pub fn with_raw_station(self, station: Station) -> Self {
        self.tables.write().stations.insert(station.id, station);
        self
    }

    /// Make every station lookup fail with an I/O error.
    pub fn fail_station_loads(self, message: impl Into<String>) -> Self {
        *self.station_failure.write() = Some(message.into());
        self
    }

    /// Make every station-type lookup fail with an I/O error.
    pub fn fail_type_loads(self, message: impl Into<String>) -> Self {
        *self.type_failure.write() = Some(message.into());
        self
    }

    /// Mark the session as disconnected.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// All error-log entries written so far.
    pub fn errors(&self) -> Vec<ErrorEntry> {
        self.errors.read().clone()
    }

    /// Number of station lookups performed.
    pub fn station_lookups(&self) -> usize {
        self.station_lookups.load(Ordering::SeqCst)
    }

    /// Number of station-type lookups performed.
    pub fn type_lookups(&self) -> usize {
        self.type_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StationStore for MemorySession {
    async fn load_station(&self, id: StationId) -> StoreResult<Option<Station>> {
        self.station_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.station_failure.read().clone() {
            return Err(StoreError::Io(message));
        }
        Ok(self.tables.read().stations.get(&id).cloned())
    }

    async fn load_station_type(&self, id: StationTypeId) -> StoreResult<Option<StationType>> {
        self.type_lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.type_failure.read().clone() {
            return Err(StoreError::Io(message));
        }
        Ok(self.tables.read().station_types.get(&id).cloned())
    }
}

impl ErrorLog for MemorySession {
    fn write_error(&self, message: &str, category: &str) -> bool {
        self.errors.write().push(ErrorEntry::new(message, category));
        true
    }
}

impl Session for MemorySession {
    fn name(&self) -> &str {
        "memory"
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

/// One captured phase call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedPhase {
    pub station: StationId,
    pub kind: StationKind,
    pub phase: ScanPhase,
}

/// Builds [`RecordingVariant`]s and collects their phase calls.
#[derive(Clone, Default)]
pub struct PhaseRecorder {
    calls: Arc<RwLock<Vec<RecordedPhase>>>,
    failure: Arc<RwLock<Option<(ScanPhase, String)>>>,
    main_script_gate: Option<Arc<Barrier>>,
    constructed: Arc<AtomicUsize>,
}

impl PhaseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `phase` return an error with `message`.
    pub fn fail_on(self, phase: ScanPhase, message: impl Into<String>) -> Self {
        *self.failure.write() = Some((phase, message.into()));
        self
    }

    /// Stop failing.
    pub fn heal(&self) {
        *self.failure.write() = None;
    }

    /// Block every `main_script` call on `gate` twice: once when the call
    /// starts and once before it returns.
    ///
    /// With a two-party barrier the test thread decides exactly when a
    /// cycle is in flight and when it may finish.
    pub fn pause_main_script(mut self, gate: Arc<Barrier>) -> Self {
        self.main_script_gate = Some(gate);
        self
    }

    /// Constructor suitable for [`VariantRegistry::register`].
    pub fn constructor(
        &self,
    ) -> impl Fn(&VariantContext) -> anyhow::Result<Box<dyn StationVariant>> + Send + Sync + 'static
    {
        let recorder = self.clone();
        move |ctx: &VariantContext| -> anyhow::Result<Box<dyn StationVariant>> {
            recorder.constructed.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingVariant {
                station: ctx.station.id,
                kind: ctx.kind,
                recorder: recorder.clone(),
            }))
        }
    }

    /// Registry recording every kind through this recorder.
    pub fn registry(&self) -> VariantRegistry {
        let mut registry = VariantRegistry::new();
        for kind in StationKind::ALL {
            // a fresh registry cannot hold duplicates
            let _ = registry.register(kind, self.constructor());
        }
        registry
    }

    /// All captured calls in order.
    pub fn calls(&self) -> Vec<RecordedPhase> {
        self.calls.read().clone()
    }

    /// Captured phases in order, without station details.
    pub fn phases(&self) -> Vec<ScanPhase> {
        self.calls.read().iter().map(|c| c.phase).collect()
    }

    /// Number of variants built.
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    /// Clear captured calls.
    pub fn clear(&self) {
        self.calls.write().clear();
    }

    fn record(&self, station: StationId, kind: StationKind, phase: ScanPhase) -> anyhow::Result<()> {
        self.calls.write().push(RecordedPhase {
            station,
            kind,
            phase,
        });
        match self.failure.read().as_ref() {
            Some((failing, message)) if *failing == phase => Err(anyhow::anyhow!(message.clone())),
            _ => Ok(()),
        }
    }
}

/// Variant that reports every phase call to its [`PhaseRecorder`].
pub struct RecordingVariant {
    station: StationId,
    kind: StationKind,
    recorder: PhaseRecorder,
}

impl StationVariant for RecordingVariant {
    fn check_for_replies(&mut self) -> anyhow::Result<()> {
        self.recorder
            .record(self.station, self.kind, ScanPhase::CheckForReplies)
    }

    fn main_script(&mut self) -> anyhow::Result<()> {
        if let Some(gate) = &self.recorder.main_script_gate {
            gate.wait();
            gate.wait();
        }
        self.recorder
            .record(self.station, self.kind, ScanPhase::MainScript)
    }

    fn check_to_release(&mut self) -> anyhow::Result<()> {
        self.recorder
            .record(self.station, self.kind, ScanPhase::CheckToRelease)
    }
}
