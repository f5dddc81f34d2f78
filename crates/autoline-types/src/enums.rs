//! Enumeration types for the Autoline digital twin.
//!
//! Wire names are `snake_case` so that the dashboard and recipe files can
//! use the same strings the operators see in the line editor.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A wire key that names no variant of the type being parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {key}")]
pub struct UnknownKey {
    /// What was being parsed (`valve`, `pump`, `direction`).
    pub kind: &'static str,
    /// The rejected key.
    pub key: String,
}

impl UnknownKey {
    fn new(kind: &'static str, key: &str) -> Self {
        Self {
            kind,
            key: key.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Line topology
// ---------------------------------------------------------------------------

/// Which of the two chamber sequences of a line an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Polarity {
    /// Anode-side sequence (bake, scrub, dock, seal).
    Anode,
    /// Cathode-side sequence (bake, growth).
    Cathode,
}

impl Polarity {
    /// Both polarities, anode first.
    pub const ALL: [Self; 2] = [Self::Anode, Self::Cathode];

    /// Lowercase name used in messages and request bodies.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Anode => "anode",
            Self::Cathode => "cathode",
        }
    }

    /// Single-letter prefix used in carrier display numbers.
    pub const fn number_prefix(self) -> &'static str {
        match self {
            Self::Anode => "A",
            Self::Cathode => "C",
        }
    }

    /// Prefix used in generated batch numbers.
    pub const fn batch_prefix(self) -> &'static str {
        match self {
            Self::Anode => "ANO",
            Self::Cathode => "CAT",
        }
    }
}

/// Declared function of a chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ChamberType {
    /// Entry chamber where material is loaded.
    LoadLock,
    /// Bake-out chamber.
    Bake,
    /// Electron-gun scrub chamber.
    Cleaning,
    /// Docking chamber.
    Docking,
    /// Indium sealing chamber.
    Sealing,
    /// Photocathode growth chamber.
    Growth,
    /// Exit chamber where material is unloaded.
    Unload,
    /// Pass-through transfer chamber.
    Transfer,
    /// Generic process chamber.
    Process,
}

// ---------------------------------------------------------------------------
// Device state
// ---------------------------------------------------------------------------

/// State of a single valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ValveState {
    /// Fully open.
    Open,
    /// Fully closed.
    #[default]
    Closed,
    /// Actuating towards open.
    Opening,
    /// Actuating towards closed.
    Closing,
}

/// Operational status of a chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum DeviceStatus {
    /// Powered but not processing.
    #[default]
    Idle,
    /// Processing.
    Running,
    /// Degraded.
    Warning,
    /// Faulted.
    Error,
    /// Taken out of service.
    Maintenance,
}

/// Who owns the chamber's heating-active flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum HeatingMode {
    /// Operator switched heating on by hand.
    Manual,
    /// Heating driven by an external program.
    Program,
    /// Automatic: the thermal model derives the flag.
    #[default]
    Off,
}

/// The five valves fitted to every chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ValveName {
    /// Isolation gate valve.
    GateValve,
    /// Inter-chamber transfer valve (gates carrier movement).
    TransferValve,
    /// Roughing line valve.
    RoughingValve,
    /// Foreline valve.
    ForelineValve,
    /// Vent valve.
    VentValve,
}

impl ValveName {
    /// All valves in display order.
    pub const ALL: [Self; 5] = [
        Self::GateValve,
        Self::TransferValve,
        Self::RoughingValve,
        Self::ForelineValve,
        Self::VentValve,
    ];

    /// Wire key of the valve (`gate_valve`, `transfer_valve`, ...).
    pub const fn key(self) -> &'static str {
        match self {
            Self::GateValve => "gate_valve",
            Self::TransferValve => "transfer_valve",
            Self::RoughingValve => "roughing_valve",
            Self::ForelineValve => "foreline_valve",
            Self::VentValve => "vent_valve",
        }
    }
}

impl FromStr for ValveName {
    type Err = UnknownKey;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.key() == key)
            .ok_or_else(|| UnknownKey::new("valve", key))
    }
}

/// Requested end state of a valve toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ValveAction {
    /// Drive the valve open.
    Open,
    /// Drive the valve closed.
    Closed,
}

impl ValveAction {
    /// State applied once actuation completes.
    pub const fn final_state(self) -> ValveState {
        match self {
            Self::Open => ValveState::Open,
            Self::Closed => ValveState::Closed,
        }
    }
}

/// The two vacuum pumps fitted to every chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PumpName {
    /// Turbo-molecular high-vacuum pump.
    Molecular,
    /// Roughing pre-stage pump.
    Roughing,
}

impl PumpName {
    /// Wire key of the pump.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Molecular => "molecular",
            Self::Roughing => "roughing",
        }
    }
}

impl FromStr for PumpName {
    type Err = UnknownKey;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key {
            "molecular" => Ok(Self::Molecular),
            "roughing" => Ok(Self::Roughing),
            _ => Err(UnknownKey::new("pump", key)),
        }
    }
}

// ---------------------------------------------------------------------------
// Carriers and process steps
// ---------------------------------------------------------------------------

/// Health of a carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CartStatus {
    /// Progressing normally.
    #[default]
    Normal,
    /// Held; progress does not advance.
    Abnormal,
}

/// Lifecycle status of a process step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum StepStatus {
    /// Not yet started.
    #[default]
    Pending,
    /// Currently executing. At most one per carrier.
    Active,
    /// Finished.
    Completed,
}

/// Process phase of a carrier, set when a step is activated.
///
/// The thermal model and MES derivation consult this tag directly
/// instead of matching on task names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ProcessPhase {
    /// Loading into the line.
    Feed,
    /// Bake-out.
    Bake,
    /// Electron-gun scrub.
    Scrub,
    /// Docking.
    Dock,
    /// Indium seal.
    Seal,
    /// Photocathode growth.
    Growth,
    /// Unloading.
    Unload,
}

impl ProcessPhase {
    /// Phase implied by arriving in a chamber of the given type.
    ///
    /// Transfer and generic process chambers imply no phase.
    pub const fn for_chamber(chamber_type: ChamberType) -> Option<Self> {
        match chamber_type {
            ChamberType::LoadLock => Some(Self::Feed),
            ChamberType::Bake => Some(Self::Bake),
            ChamberType::Cleaning => Some(Self::Scrub),
            ChamberType::Docking => Some(Self::Dock),
            ChamberType::Sealing => Some(Self::Seal),
            ChamberType::Growth => Some(Self::Growth),
            ChamberType::Unload => Some(Self::Unload),
            ChamberType::Transfer | ChamberType::Process => None,
        }
    }

    /// Display name of the step that executes this phase.
    pub const fn step_name(self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Bake => "bake process",
            Self::Scrub => "scrub process",
            Self::Dock => "dock process",
            Self::Seal => "seal process",
            Self::Growth => "growth process",
            Self::Unload => "unload",
        }
    }
}

/// Direction of a carrier move along its chamber sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Direction {
    /// Towards the unload end (ordinal + 1).
    Forward,
    /// Towards the load-lock end (ordinal - 1).
    Backward,
}

impl FromStr for Direction {
    type Err = UnknownKey;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            _ => Err(UnknownKey::new("direction", key)),
        }
    }
}

// ---------------------------------------------------------------------------
// Faults
// ---------------------------------------------------------------------------

/// Kind of an injected simulation fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FaultKind {
    /// Heater runs away: inner temperature climbs regardless of setpoint.
    TempRunaway,
    /// Severe leak while the chamber is isolated.
    VacuumLeak,
    /// Pumps stop producing vacuum.
    PumpFailure,
    /// Gauges stop reporting.
    SensorFailure,
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// Which log an event entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LogKind {
    /// Line edits, faults and settings changes.
    System,
    /// Operator actions on valves, pumps and carriers.
    Operation,
}

/// Severity of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LogLevel {
    /// Informational.
    #[default]
    Info,
    /// An operation completed.
    Success,
    /// Something needs attention.
    Warn,
    /// Something failed.
    Error,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn every_valve_key_parses_back() {
        for valve in ValveName::ALL {
            assert_eq!(valve.key().parse::<ValveName>(), Ok(valve));
        }
        let err = "bypass_valve".parse::<ValveName>().unwrap_err();
        assert_eq!(err.to_string(), "unknown valve: bypass_valve");
    }

    #[test]
    fn pumps_and_directions_parse() {
        assert_eq!("roughing".parse::<PumpName>(), Ok(PumpName::Roughing));
        assert_eq!(PumpName::Molecular.key(), "molecular");
        assert_eq!("backward".parse::<Direction>(), Ok(Direction::Backward));
        let err = "sideways".parse::<Direction>().unwrap_err();
        assert_eq!(err.kind, "direction");
        assert_eq!(err.key, "sideways");
    }

    #[test]
    fn phases_follow_chamber_types() {
        assert_eq!(
            ProcessPhase::for_chamber(ChamberType::LoadLock),
            Some(ProcessPhase::Feed)
        );
        assert_eq!(
            ProcessPhase::for_chamber(ChamberType::Cleaning),
            Some(ProcessPhase::Scrub)
        );
        assert_eq!(ProcessPhase::for_chamber(ChamberType::Transfer), None);
        assert_eq!(ProcessPhase::Growth.step_name(), "growth process");
    }

    #[test]
    fn wire_names_are_snake_case() {
        let json = serde_json::to_string(&ChamberType::LoadLock).unwrap_or_default();
        assert_eq!(json, "\"load_lock\"");
        let json = serde_json::to_string(&FaultKind::TempRunaway).unwrap_or_default();
        assert_eq!(json, "\"temp_runaway\"");
    }

    #[test]
    fn valve_action_states() {
        assert_eq!(ValveAction::Open.final_state(), ValveState::Open);
        assert_eq!(ValveAction::Closed.final_state(), ValveState::Closed);
    }
}
