//! Vacuum model: pump-down, venting and leak-up per chamber.
//!
//! Priority per tick:
//!
//! 1. vent valve open: approach atmosphere with the vent time constant;
//! 2. a pump running: approach the roughing or molecular end pressure;
//! 3. otherwise: linear leak-up at the chamber-type leak rate.
//!
//! Cases 1 and 2 use the exponential approach
//! `P' = target + (P - target) * exp(-dt / tau)`, which covers both
//! falling and rising pressure. Pressure always ends inside
//! `[min_pressure_pa, atmosphere_pa]`.

use autoline_types::{Chamber, ChamberType, DeviceStatus, FaultKind, ValveName, ValveState};

use crate::config::VacuumConfig;
use crate::faults::FaultOverlay;

/// Pressure substituted for a non-positive reading before the step.
const RESET_PRESSURE_PA: f64 = 1e-7;

/// How the chamber's pressure evolves this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VacuumRegime {
    /// Exponential approach to `target` with time constant `tau`.
    Approach {
        /// End pressure in pascals.
        target: f64,
        /// Time constant in seconds.
        tau: f64,
    },
    /// Linear rise at `rate` Pa/s.
    Leak {
        /// Leak rate in pascals per second.
        rate: f64,
    },
}

/// Select the regime for a chamber at pressure `current`.
///
/// A pump-failure fault makes the pumps ineffective, so the chamber
/// leaks at its normal rate.
pub fn regime(
    chamber: &Chamber,
    current: f64,
    faults: &FaultOverlay,
    config: &VacuumConfig,
) -> VacuumRegime {
    let pumps_failed = faults.is_active(&chamber.id, FaultKind::PumpFailure);
    let molecular = chamber.molecular_pump && !pumps_failed;
    let roughing = chamber.roughing_pump && !pumps_failed;

    if chamber.valves.get(ValveName::VentValve) == ValveState::Open {
        VacuumRegime::Approach {
            target: config.atmosphere_pa,
            tau: config.vent_time_constant_s,
        }
    } else if molecular && current <= config.molecular_handover_pa {
        let target = if chamber.chamber_type == ChamberType::Growth {
            config.growth_target_pa
        } else {
            config.molecular_target_pa
        };
        VacuumRegime::Approach {
            target,
            tau: config.molecular_time_constant_s,
        }
    } else if molecular || roughing {
        VacuumRegime::Approach {
            target: config.roughing_target_pa,
            tau: config.roughing_time_constant_s,
        }
    } else if faults.is_active(&chamber.id, FaultKind::VacuumLeak) {
        VacuumRegime::Leak {
            rate: config.fault_leak_rate,
        }
    } else {
        VacuumRegime::Leak {
            rate: leak_rate(chamber.chamber_type, config),
        }
    }
}

/// Leak rate of an isolated chamber of the given type.
pub const fn leak_rate(chamber_type: ChamberType, config: &VacuumConfig) -> f64 {
    match chamber_type {
        ChamberType::Bake => config.bake_leak_rate,
        ChamberType::Growth => config.growth_leak_rate,
        _ => config.default_leak_rate,
    }
}

/// Advance one chamber's high-vacuum pressure by `dt` simulated seconds.
pub fn advance(chamber: &mut Chamber, dt: f64, faults: &FaultOverlay, config: &VacuumConfig) {
    let current = if chamber.high_vac_pressure > 0.0 && chamber.high_vac_pressure.is_finite() {
        chamber.high_vac_pressure
    } else {
        RESET_PRESSURE_PA
    };

    let next = match regime(chamber, current, faults, config) {
        VacuumRegime::Approach { target, tau } => {
            (current - target).mul_add((-dt / tau).exp(), target)
        }
        VacuumRegime::Leak { rate } => {
            if faults.is_active(&chamber.id, FaultKind::VacuumLeak) {
                chamber.status = DeviceStatus::Error;
            }
            rate.mul_add(dt, current)
        }
    };

    if faults.is_active(&chamber.id, FaultKind::PumpFailure) {
        chamber.status = DeviceStatus::Error;
    }

    chamber.high_vac_pressure = next.clamp(config.min_pressure_pa, config.atmosphere_pa);
}
