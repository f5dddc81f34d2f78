//! Core entity structs: lines, chambers, carriers, recipes and faults.
//!
//! Topology (which chambers exist, which line owns them) is fixed by the
//! line-management layer. The simulation engine only mutates the scalar
//! fields of these structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    CartStatus, ChamberType, DeviceStatus, FaultKind, HeatingMode, LogKind, LogLevel, Polarity,
    ProcessPhase, PumpName, StepStatus, ValveName, ValveState,
};
use crate::ids::{CartId, ChamberId, EventId, FaultId, LineId, RecipeId};

/// Ambient temperature in degrees Celsius.
pub const AMBIENT_TEMPERATURE_C: f64 = 25.0;

/// Setpoint given to bake chambers when a line is created.
pub const BAKE_PREHEAT_TEMPERATURE_C: f64 = 150.0;

// ---------------------------------------------------------------------------
// Chambers
// ---------------------------------------------------------------------------

/// Valve states of a single chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChamberValves {
    /// Isolation gate valve.
    pub gate_valve: ValveState,
    /// Transfer valve towards the next chamber in the sequence.
    pub transfer_valve: ValveState,
    /// Roughing valve.
    pub roughing_valve: ValveState,
    /// Foreline valve.
    pub foreline_valve: ValveState,
    /// Vent valve.
    pub vent_valve: ValveState,
}

impl ChamberValves {
    /// Current state of the named valve.
    pub const fn get(&self, valve: ValveName) -> ValveState {
        match valve {
            ValveName::GateValve => self.gate_valve,
            ValveName::TransferValve => self.transfer_valve,
            ValveName::RoughingValve => self.roughing_valve,
            ValveName::ForelineValve => self.foreline_valve,
            ValveName::VentValve => self.vent_valve,
        }
    }

    /// Set the named valve.
    pub const fn set(&mut self, valve: ValveName, state: ValveState) {
        match valve {
            ValveName::GateValve => self.gate_valve = state,
            ValveName::TransferValve => self.transfer_valve = state,
            ValveName::RoughingValve => self.roughing_valve = state,
            ValveName::ForelineValve => self.foreline_valve = state,
            ValveName::VentValve => self.vent_valve = state,
        }
    }
}

/// A process chamber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Chamber {
    /// Unique chamber id.
    pub id: ChamberId,
    /// Owning line.
    pub line_id: LineId,
    /// Display name.
    pub name: String,
    /// Which sequence of the line this chamber sits in.
    pub polarity: Polarity,
    /// Declared chamber function.
    #[serde(rename = "type")]
    pub chamber_type: ChamberType,
    /// Inner temperature in degrees Celsius.
    pub temperature: f64,
    /// Outer (shell) temperature in degrees Celsius.
    pub outer_temperature: f64,
    /// High-vacuum gauge pressure in pascals.
    pub high_vac_pressure: f64,
    /// Foreline gauge pressure in pascals.
    pub foreline_pressure: f64,
    /// Operational status.
    pub status: DeviceStatus,
    /// Valve states.
    pub valves: ChamberValves,
    /// Molecular pump running.
    pub molecular_pump: bool,
    /// Roughing pump running.
    pub roughing_pump: bool,
    /// Carriers currently inside.
    pub cart_ids: Vec<CartId>,
    /// Maximum number of carriers the chamber holds.
    pub max_cart_capacity: u32,
    /// Operator setpoint used when no recipe drives the chamber.
    pub target_temperature: f64,
    /// Whether the heater is currently active.
    pub is_heating: bool,
    /// Who owns [`Chamber::is_heating`].
    pub heating_mode: HeatingMode,
}

impl Chamber {
    /// Create a chamber at ambient conditions with all valves closed.
    ///
    /// Bake chambers get a preheat setpoint; every other type idles at
    /// ambient.
    pub fn new(
        id: impl Into<ChamberId>,
        line_id: LineId,
        name: impl Into<String>,
        polarity: Polarity,
        chamber_type: ChamberType,
    ) -> Self {
        let target_temperature = if chamber_type == ChamberType::Bake {
            BAKE_PREHEAT_TEMPERATURE_C
        } else {
            AMBIENT_TEMPERATURE_C
        };
        Self {
            id: id.into(),
            line_id,
            name: name.into(),
            polarity,
            chamber_type,
            temperature: AMBIENT_TEMPERATURE_C,
            outer_temperature: AMBIENT_TEMPERATURE_C,
            high_vac_pressure: 1e-5,
            foreline_pressure: 10.0,
            status: DeviceStatus::Idle,
            valves: ChamberValves::default(),
            molecular_pump: false,
            roughing_pump: false,
            cart_ids: Vec::new(),
            max_cart_capacity: 1,
            target_temperature,
            is_heating: false,
            heating_mode: HeatingMode::Off,
        }
    }

    /// Whether the named pump is running.
    pub const fn pump(&self, pump: PumpName) -> bool {
        match pump {
            PumpName::Molecular => self.molecular_pump,
            PumpName::Roughing => self.roughing_pump,
        }
    }

    /// Switch the named pump.
    pub const fn set_pump(&mut self, pump: PumpName, on: bool) {
        match pump {
            PumpName::Molecular => self.molecular_pump = on,
            PumpName::Roughing => self.roughing_pump = on,
        }
    }
}

/// Mutable chamber settings an operator may change.
///
/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChamberPatch {
    /// New display name.
    pub name: Option<String>,
    /// New operator setpoint.
    pub target_temperature: Option<f64>,
    /// New heating mode.
    pub heating_mode: Option<HeatingMode>,
    /// New heating flag (only meaningful in manual or program mode).
    pub is_heating: Option<bool>,
    /// New status.
    pub status: Option<DeviceStatus>,
    /// New capacity.
    pub max_cart_capacity: Option<u32>,
}

impl ChamberPatch {
    /// Apply the set fields to a chamber.
    pub fn apply(&self, chamber: &mut Chamber) {
        if let Some(name) = &self.name {
            chamber.name.clone_from(name);
        }
        if let Some(target) = self.target_temperature {
            chamber.target_temperature = target;
        }
        if let Some(mode) = self.heating_mode {
            chamber.heating_mode = mode;
        }
        if let Some(heating) = self.is_heating {
            chamber.is_heating = heating;
        }
        if let Some(status) = self.status {
            chamber.status = status;
        }
        if let Some(capacity) = self.max_cart_capacity {
            chamber.max_cart_capacity = capacity;
        }
    }
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

/// A production line with its two ordered chamber sequences.
///
/// Both sequences always hold at least one chamber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Line {
    /// Unique line id.
    pub id: LineId,
    /// Display name.
    pub name: String,
    /// Anode-side chambers in transport order.
    pub anode_chambers: Vec<Chamber>,
    /// Cathode-side chambers in transport order.
    pub cathode_chambers: Vec<Chamber>,
}

impl Line {
    /// Chamber sequence for one polarity.
    pub fn chambers(&self, polarity: Polarity) -> &[Chamber] {
        match polarity {
            Polarity::Anode => &self.anode_chambers,
            Polarity::Cathode => &self.cathode_chambers,
        }
    }

    /// Mutable chamber sequence for one polarity.
    pub const fn chambers_mut(&mut self, polarity: Polarity) -> &mut Vec<Chamber> {
        match polarity {
            Polarity::Anode => &mut self.anode_chambers,
            Polarity::Cathode => &mut self.cathode_chambers,
        }
    }

    /// All chambers of the line, anode side first.
    pub fn all_chambers(&self) -> impl Iterator<Item = &Chamber> {
        self.anode_chambers
            .iter()
            .chain(self.cathode_chambers.iter())
    }

    /// All chambers of the line, mutably, anode side first.
    pub fn all_chambers_mut(&mut self) -> impl Iterator<Item = &mut Chamber> {
        self.anode_chambers
            .iter_mut()
            .chain(self.cathode_chambers.iter_mut())
    }
}

/// Line edit: a new name and/or replacement chamber sequences.
///
/// Replacement chambers are re-owned by the edited line and take the
/// polarity of the sequence they are given in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LinePatch {
    /// New display name.
    pub name: Option<String>,
    /// Replacement anode sequence.
    pub anode_chambers: Option<Vec<Chamber>>,
    /// Replacement cathode sequence.
    pub cathode_chambers: Option<Vec<Chamber>>,
}

// ---------------------------------------------------------------------------
// Carriers
// ---------------------------------------------------------------------------

/// One step of a carrier's recipe execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProcessStep {
    /// Step id, unique within the carrier (`s1`, `s2`, ...).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Phase this step executes.
    pub phase: ProcessPhase,
    /// Lifecycle status.
    pub status: StepStatus,
    /// When the step was activated.
    pub started_at: Option<DateTime<Utc>>,
    /// When the step was completed.
    pub ended_at: Option<DateTime<Utc>>,
    /// Elapsed seconds between activation and completion.
    pub duration_secs: Option<u64>,
    /// Planned duration in seconds.
    pub estimated_duration_secs: u64,
}

impl ProcessStep {
    /// Create a pending step for a phase.
    pub fn pending(
        id: impl Into<String>,
        phase: ProcessPhase,
        estimated_duration_secs: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: phase.step_name().to_owned(),
            phase,
            status: StepStatus::Pending,
            started_at: None,
            ended_at: None,
            duration_secs: None,
            estimated_duration_secs,
        }
    }
}

/// MES telemetry and process parameters mirrored onto a carrier.
///
/// Anode carriers populate the e-gun, indium and seal fields; cathode
/// carriers populate the cesium, oxygen, photocurrent and growth fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CartTelemetry {
    /// Temperature reading in degrees Celsius.
    pub temperature: Option<f64>,
    /// Vacuum reading in pascals.
    pub vacuum: Option<f64>,
    /// Target temperature for the current chamber.
    pub target_temp: Option<f64>,
    /// Target vacuum for the current chamber.
    pub target_vacuum: Option<f64>,
    /// Electron-gun voltage (kV).
    pub e_gun_voltage: Option<f64>,
    /// Electron-gun current (uA).
    pub e_gun_current: Option<f64>,
    /// Indium temperature in degrees Celsius.
    pub indium_temp: Option<f64>,
    /// Seal pressure.
    pub seal_pressure: Option<f64>,
    /// Cesium source current (A).
    pub cs_current: Option<f64>,
    /// Oxygen partial pressure in pascals.
    pub o2_pressure: Option<f64>,
    /// Photocurrent (uA).
    pub photo_current: Option<f64>,
    /// Growth progress percentage.
    pub growth_progress: Option<f64>,
}

/// A carrier moving through the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Cart {
    /// Unique carrier id.
    pub id: CartId,
    /// Display number (`A-001`, `C-002`).
    pub number: String,
    /// Optional custom name.
    pub name: Option<String>,
    /// Polarity of the sequence the carrier travels.
    pub polarity: Polarity,
    /// Health status.
    pub status: CartStatus,
    /// Chamber the carrier is in.
    pub location_chamber_id: ChamberId,
    /// Free-text material descriptor.
    pub content: Option<String>,
    /// Recipe the carrier executes.
    pub recipe_id: Option<RecipeId>,
    /// Name of the active task.
    pub current_task: String,
    /// Name of the following task.
    pub next_task: String,
    /// Overall progress percentage, 0 to 100.
    pub progress: f64,
    /// Phase of the active step, if any.
    pub phase: Option<ProcessPhase>,
    /// Recipe steps in execution order.
    pub steps: Vec<ProcessStep>,
    /// Mirrored telemetry and process parameters.
    pub telemetry: CartTelemetry,
    /// Recipe label (`<name> (<version>)`).
    pub recipe_version: Option<String>,
    /// Batch number.
    pub batch_no: Option<String>,
    /// When the material was loaded.
    pub loaded_at: Option<DateTime<Utc>>,
    /// Estimated total processing time in seconds.
    pub estimated_total_secs: u64,
}

impl Cart {
    /// Activation time of the active step executing `phase`.
    pub fn phase_started_at(&self, phase: ProcessPhase) -> Option<DateTime<Utc>> {
        self.steps
            .iter()
            .find(|s| s.phase == phase && s.status == StepStatus::Active)
            .and_then(|s| s.started_at)
    }

    /// Whether the step executing `phase` has completed.
    pub fn phase_completed(&self, phase: ProcessPhase) -> bool {
        self.steps
            .iter()
            .any(|s| s.phase == phase && s.status == StepStatus::Completed)
    }
}

/// Mutable carrier fields an operator may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CartPatch {
    /// New custom name.
    pub name: Option<String>,
    /// New health status.
    pub status: Option<CartStatus>,
    /// New material descriptor.
    pub content: Option<String>,
}

impl CartPatch {
    /// Apply the set fields to a carrier.
    pub fn apply(&self, cart: &mut Cart) {
        if let Some(name) = &self.name {
            cart.name = Some(name.clone());
        }
        if let Some(status) = self.status {
            cart.status = status;
        }
        if let Some(content) = &self.content {
            cart.content = Some(content.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// Process parameters for one polarity of product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Recipe {
    /// Unique recipe id.
    pub id: RecipeId,
    /// Display name.
    pub name: String,
    /// Version label.
    pub version: String,
    /// Whether this is the default for its polarity.
    pub is_default: bool,
    /// Polarity the recipe applies to.
    pub target_polarity: Polarity,
    /// Bake duration in hours.
    pub bake_duration_h: f64,
    /// Growth duration in hours (cathode only).
    pub growth_duration_h: f64,
    /// Electron-gun voltage setpoint.
    pub e_gun_voltage: f64,
    /// Electron-gun current setpoint.
    pub e_gun_current: f64,
    /// Indium temperature setpoint.
    pub indium_temp: f64,
    /// Seal pressure setpoint.
    pub seal_pressure: f64,
    /// Cesium current setpoint.
    pub cs_current: f64,
    /// Oxygen pressure setpoint.
    pub o2_pressure: f64,
    /// Photocurrent setpoint.
    pub photo_current: f64,
    /// Bake hold temperature.
    pub bake_target_temp: f64,
    /// Growth end temperature.
    pub growth_target_temp: f64,
}

// ---------------------------------------------------------------------------
// Faults, settings and snapshots
// ---------------------------------------------------------------------------

/// An injected perturbation of the physical model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationFault {
    /// Unique fault id.
    pub id: FaultId,
    /// Fault kind.
    pub kind: FaultKind,
    /// Line owning the targeted chamber.
    pub target_line_id: LineId,
    /// Targeted chamber.
    pub target_chamber_id: ChamberId,
    /// Whether the fault currently applies.
    pub active: bool,
    /// Injection time.
    pub created_at: DateTime<Utc>,
    /// Human-readable description.
    pub description: String,
}

/// Runtime-adjustable simulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationSettings {
    /// Simulated seconds per real second.
    pub time_multiplier: f64,
    /// Whether sensor and process-parameter jitter is applied.
    pub noise_enabled: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            time_multiplier: 1.0,
            noise_enabled: true,
        }
    }
}

/// One entry of the system or operation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LogEntry {
    /// Unique entry id.
    pub id: EventId,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Which log the entry belongs to.
    pub kind: LogKind,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable description.
    pub content: String,
}

/// Read-only snapshot of the complete entity graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SystemState {
    /// Lines with their chambers.
    pub lines: Vec<Line>,
    /// Carriers on all lines.
    pub carts: Vec<Cart>,
    /// Fault overlay at snapshot time.
    pub faults: Vec<SimulationFault>,
    /// Settings at snapshot time.
    pub settings: SimulationSettings,
    /// Most recent system events, newest first.
    pub system_logs: Vec<LogEntry>,
    /// Most recent operator actions, newest first.
    pub operation_logs: Vec<LogEntry>,
    /// Number of ticks executed.
    pub tick: u64,
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
}

/// One time-series sample handed to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HistoryPoint {
    /// Chamber or carrier id.
    pub entity_id: String,
    /// Sample time.
    pub timestamp: DateTime<Utc>,
    /// Temperature reading, if available.
    pub temperature: Option<f64>,
    /// Vacuum reading, if available.
    pub vacuum: Option<f64>,
}
