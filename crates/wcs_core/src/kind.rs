//! Station archetypes and their scan-phase plans.
//!
//! A [`StationKind`] is resolved once from the persisted station-type key.
//! The same value picks the variant constructor at load time and the phase
//! plan at scan time, so the two can never disagree.

use serde::{Deserialize, Serialize};

/// One step of a scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// Drain asynchronous hardware replies queued since the last cycle
    CheckForReplies,
    /// The variant's decision logic for this cycle
    MainScript,
    /// Release gate, grouping-with-buffer stations only
    CheckToRelease,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::CheckForReplies => "check_for_replies",
            ScanPhase::MainScript => "main_script",
            ScanPhase::CheckToRelease => "check_to_release",
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const STANDARD_PHASES: &[ScanPhase] = &[ScanPhase::CheckForReplies, ScanPhase::MainScript];

const RELEASE_GATE_PHASES: &[ScanPhase] = &[
    ScanPhase::CheckForReplies,
    ScanPhase::MainScript,
    ScanPhase::CheckToRelease,
];

/// Supported conveyor station archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    RfidProductIdentification,
    Routing,
    PassThrough,
    Buffer,
    Grouping,
    GroupBuffer,
    Stacker,
    Palletizer,
    PrintAndLabeling,
    RfidPalletIdentification,
    Hooder,
    DropoffPickup,
    ManualWorkstation,
    PalletReintroduction,
    UnitConsumption,
    RfidDiverter,
}

impl StationKind {
    /// Every kind, in registry order.
    pub const ALL: [StationKind; 16] = [
        StationKind::RfidProductIdentification,
        StationKind::Routing,
        StationKind::PassThrough,
        StationKind::Buffer,
        StationKind::Grouping,
        StationKind::GroupBuffer,
        StationKind::Stacker,
        StationKind::Palletizer,
        StationKind::PrintAndLabeling,
        StationKind::RfidPalletIdentification,
        StationKind::Hooder,
        StationKind::DropoffPickup,
        StationKind::ManualWorkstation,
        StationKind::PalletReintroduction,
        StationKind::UnitConsumption,
        StationKind::RfidDiverter,
    ];

    /// The station-type key persisted for this kind.
    pub fn key(&self) -> &'static str {
        match self {
            StationKind::RfidProductIdentification => "ST.CONV.RFIDREADERLINKED",
            StationKind::Routing => "ST.CONV.TURNTABLE",
            StationKind::PassThrough => "ST.CONV.PASSTHROUGH",
            StationKind::Buffer => "ST.CONV.BUFFER",
            StationKind::Grouping => "ST.CONV.GROUPING",
            StationKind::GroupBuffer => "ST.CONV.GROUPBUFFER",
            StationKind::Stacker => "ST.CONV.STACKERSYSTEM",
            StationKind::Palletizer => "ST.CONV.PALLETIZER",
            StationKind::PrintAndLabeling => "ST.CONV.PRINTANDLABELINGSTATION",
            StationKind::RfidPalletIdentification => "ST.CONV.RFIDREADERSYSTEM",
            StationKind::Hooder => "ST.CONV.HOODERSTATION",
            StationKind::DropoffPickup => "ST.CONV.DROPOFFPICKUPPOINT",
            StationKind::ManualWorkstation => "ST.CONV.MANUALWORKSTATION",
            StationKind::PalletReintroduction => "ST.CONV.PALLETREINTRODUCTIONSTATION",
            StationKind::UnitConsumption => "ST.CONV.UNITCONSUMPTION",
            StationKind::RfidDiverter => "ST.CONV.DIVERTERRFID",
        }
    }

    /// Resolve a persisted key. Keys are matched exactly.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.key() == key)
    }

    /// Short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            StationKind::RfidProductIdentification => "RFID product identification",
            StationKind::Routing => "routing / turntable",
            StationKind::PassThrough => "pass-through",
            StationKind::Buffer => "buffer",
            StationKind::Grouping => "grouping",
            StationKind::GroupBuffer => "grouping with buffer release",
            StationKind::Stacker => "stacker",
            StationKind::Palletizer => "palletizer",
            StationKind::PrintAndLabeling => "print and labeling",
            StationKind::RfidPalletIdentification => "RFID pallet identification",
            StationKind::Hooder => "hooder",
            StationKind::DropoffPickup => "drop-off / pick-up point",
            StationKind::ManualWorkstation => "manual workstation",
            StationKind::PalletReintroduction => "pallet reintroduction",
            StationKind::UnitConsumption => "unit consumption",
            StationKind::RfidDiverter => "RFID diverter",
        }
    }

    /// Phases invoked by one scan cycle, in call order.
    pub fn phases(&self) -> &'static [ScanPhase] {
        if self.has_release_gate() {
            RELEASE_GATE_PHASES
        } else {
            STANDARD_PHASES
        }
    }

    pub fn has_release_gate(&self) -> bool {
        matches!(self, StationKind::GroupBuffer)
    }
}

impl std::fmt::Display for StationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique_and_round_trip() {
        let keys: HashSet<&str> = StationKind::ALL.iter().map(|k| k.key()).collect();
        assert_eq!(keys.len(), StationKind::ALL.len());

        for kind in StationKind::ALL {
            assert_eq!(StationKind::from_key(kind.key()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_and_case_mismatched_keys() {
        assert_eq!(StationKind::from_key("ST.CONV.ELEVATOR"), None);
        assert_eq!(StationKind::from_key("st.conv.buffer"), None);
        assert_eq!(StationKind::from_key(""), None);
    }

    #[test]
    fn test_only_group_buffer_has_release_gate() {
        for kind in StationKind::ALL {
            let phases = kind.phases();
            assert_eq!(phases[0], ScanPhase::CheckForReplies);
            assert_eq!(phases[1], ScanPhase::MainScript);
            if kind == StationKind::GroupBuffer {
                assert_eq!(phases, RELEASE_GATE_PHASES);
            } else {
                assert_eq!(phases.len(), 2, "{kind} should not release");
            }
        }
    }
}
