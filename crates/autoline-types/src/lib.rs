//! Shared type definitions for the Autoline digital twin.
//!
//! This crate is the single source of truth for the entity graph shared by
//! the simulation engine and the dashboard. Types flow downstream to
//! `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe key wrappers for lines, chambers, carriers, recipes, faults and events
//! - [`enums`] -- Enumeration types (chamber types, valve states, phases, fault kinds)
//! - [`structs`] -- Core entity structs (lines, chambers, carriers, recipes, snapshots)

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    CartStatus, ChamberType, DeviceStatus, Direction, FaultKind, HeatingMode, LogKind, LogLevel,
    Polarity, ProcessPhase, PumpName, StepStatus, UnknownKey, ValveAction, ValveName, ValveState,
};
pub use ids::{CartId, ChamberId, EventId, FaultId, LineId, RecipeId};
pub use structs::{
    AMBIENT_TEMPERATURE_C, BAKE_PREHEAT_TEMPERATURE_C, Cart, CartPatch, CartTelemetry, Chamber,
    ChamberPatch, ChamberValves, HistoryPoint, Line, LinePatch, LogEntry, ProcessStep, Recipe,
    SimulationFault, SimulationSettings, SystemState,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the dashboard.

    #[test]
    fn export_bindings() {
        // Files are written to `bindings/` relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::LineId::export_all();
        let _ = crate::ids::ChamberId::export_all();
        let _ = crate::ids::CartId::export_all();
        let _ = crate::ids::RecipeId::export_all();
        let _ = crate::ids::FaultId::export_all();
        let _ = crate::ids::EventId::export_all();

        // Enums
        let _ = crate::enums::Polarity::export_all();
        let _ = crate::enums::ChamberType::export_all();
        let _ = crate::enums::ValveState::export_all();
        let _ = crate::enums::DeviceStatus::export_all();
        let _ = crate::enums::HeatingMode::export_all();
        let _ = crate::enums::ValveName::export_all();
        let _ = crate::enums::ValveAction::export_all();
        let _ = crate::enums::PumpName::export_all();
        let _ = crate::enums::CartStatus::export_all();
        let _ = crate::enums::StepStatus::export_all();
        let _ = crate::enums::ProcessPhase::export_all();
        let _ = crate::enums::Direction::export_all();
        let _ = crate::enums::FaultKind::export_all();
        let _ = crate::enums::LogKind::export_all();
        let _ = crate::enums::LogLevel::export_all();

        // Structs
        let _ = crate::structs::ChamberValves::export_all();
        let _ = crate::structs::Chamber::export_all();
        let _ = crate::structs::ChamberPatch::export_all();
        let _ = crate::structs::Line::export_all();
        let _ = crate::structs::LinePatch::export_all();
        let _ = crate::structs::ProcessStep::export_all();
        let _ = crate::structs::CartTelemetry::export_all();
        let _ = crate::structs::Cart::export_all();
        let _ = crate::structs::CartPatch::export_all();
        let _ = crate::structs::Recipe::export_all();
        let _ = crate::structs::SimulationFault::export_all();
        let _ = crate::structs::SimulationSettings::export_all();
        let _ = crate::structs::SystemState::export_all();
        let _ = crate::structs::HistoryPoint::export_all();
        let _ = crate::structs::LogEntry::export_all();
    }
}
