//! The scan-cycle contract every station variant implements.
//!
//! # Variant Lifecycle
//!
//! 1. **Construction**: the [`VariantRegistry`](crate::VariantRegistry) builds
//!    one variant from a [`VariantContext`] when a controller loads.
//! 2. **Scan**: each cycle the controller calls the phases listed by
//!    [`StationKind::phases`] in order.
//! 3. **Drop**: the variant lives exactly as long as its controller.
//!
//! # Example
//!
//! ```rust,ignore
//! use wcs_core::StationVariant;
//!
//! struct BufferLogic { /* lane state */ }
//!
//! impl StationVariant for BufferLogic {
//!     fn check_for_replies(&mut self) -> anyhow::Result<()> {
//!         // consume PLC acknowledgements
//!         Ok(())
//!     }
//!
//!     fn main_script(&mut self) -> anyhow::Result<()> {
//!         // decide which lane releases next
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::kind::{ScanPhase, StationKind};
use crate::model::{Station, StationType};
use crate::session::Session;

/// Everything a variant constructor may use to bind itself to a station.
#[derive(Clone)]
pub struct VariantContext {
    pub session: Arc<dyn Session>,
    pub station: Station,
    pub station_type: StationType,
    pub kind: StationKind,
    /// Verbose diagnostics requested by the host
    pub debug: bool,
}

impl std::fmt::Debug for VariantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantContext")
            .field("session", &self.session.name())
            .field("station", &self.station.id)
            .field("kind", &self.kind)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Trait for station behavior implementations.
///
/// Phase calls are synchronous: a cycle never yields halfway through a
/// phase. Errors stop the cycle and are returned to whoever drives the
/// controller.
///
/// # Thread Safety
///
/// Variants must be `Send` so a controller can be driven from any task.
pub trait StationVariant: Send {
    /// Drain asynchronous hardware replies queued since the last cycle.
    fn check_for_replies(&mut self) -> anyhow::Result<()>;

    /// Run this cycle's control decisions.
    fn main_script(&mut self) -> anyhow::Result<()>;

    /// Release gate.
    ///
    /// Only invoked for kinds whose phase plan includes
    /// [`ScanPhase::CheckToRelease`]. Default: nothing to release.
    fn check_to_release(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoke a single phase by name.
    fn run_phase(&mut self, phase: ScanPhase) -> anyhow::Result<()> {
        match phase {
            ScanPhase::CheckForReplies => self.check_for_replies(),
            ScanPhase::MainScript => self.main_script(),
            ScanPhase::CheckToRelease => self.check_to_release(),
        }
    }
}

/// Inert variant used to commission a station before its logic is deployed.
///
/// Every phase only emits a debug event.
#[derive(Debug)]
pub struct CommissioningVariant {
    station: Station,
    kind: StationKind,
    cycles: u64,
}

impl CommissioningVariant {
    pub fn new(context: &VariantContext) -> Self {
        Self {
            station: context.station.clone(),
            kind: context.kind,
            cycles: 0,
        }
    }
}

impl StationVariant for CommissioningVariant {
    fn check_for_replies(&mut self) -> anyhow::Result<()> {
        debug!(station = %self.station.id, kind = %self.kind, "no replies to drain");
        Ok(())
    }

    fn main_script(&mut self) -> anyhow::Result<()> {
        self.cycles += 1;
        debug!(
            station = %self.station.id,
            kind = %self.kind,
            cycle = self.cycles,
            "commissioning cycle"
        );
        Ok(())
    }

    fn check_to_release(&mut self) -> anyhow::Result<()> {
        debug!(station = %self.station.id, "release gate closed");
        Ok(())
    }
}
