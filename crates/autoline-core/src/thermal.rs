//! Thermal model: recipe-driven setpoints and first-order integration.
//!
//! Each tick a chamber's target inner and outer temperatures are derived
//! from the carrier occupying it (through the carrier's [`ProcessPhase`]
//! tag and recipe) or from the operator setpoint when the chamber is
//! empty. Actual temperatures then lag toward the targets with time
//! constant `tau`:
//!
//! ```text
//! alpha = min(1, dt / tau * boost)
//! T'    = T * (1 - alpha) + target * alpha
//! ```
//!
//! where `boost = min(cap, 1 + |target - T| / span)` while the heater is
//! active and 1 otherwise. Clamping `alpha` keeps every step on the near
//! side of the target.

use autoline_types::{
    AMBIENT_TEMPERATURE_C, Cart, Chamber, DeviceStatus, FaultKind, HeatingMode, Polarity,
    ProcessPhase, Recipe,
};
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::clock::elapsed_secs;
use crate::config::ThermalConfig;
use crate::faults::FaultOverlay;

/// End of the bake hold, as a fraction of the bake duration.
const BAKE_HOLD_END: f64 = 0.70;
/// End of the first cool-down segment, as a fraction of the bake duration.
const BAKE_COOL_END: f64 = 0.85;
/// Temperature reached at the end of the first cool-down segment.
const BAKE_INTERMEDIATE_C: f64 = 70.0;
/// Outer offset during bake.
const BAKE_OUTER_OFFSET_C: f64 = 20.0;

/// Growth ramp start temperature.
const GROWTH_START_C: f64 = 230.0;
/// Growth ramp length in seconds.
const GROWTH_RAMP_SECS: f64 = 5.0 * 3600.0;

/// Docking setpoint when the recipe carries no indium temperature.
const DOCK_FALLBACK_C: f64 = 95.0;
/// Outer offset during docking.
const DOCK_OUTER_OFFSET_C: f64 = 30.0;
/// Outer offset during sealing.
const SEAL_OUTER_OFFSET_C: f64 = 20.0;

/// Target inner and outer temperature for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalTarget {
    /// Inner target in degrees Celsius.
    pub inner: f64,
    /// Outer target in degrees Celsius.
    pub outer: f64,
}

/// Derive the targets for a chamber.
///
/// `occupant` is the carrier in the chamber (if any) together with its
/// resolved recipe.
pub fn target_for(
    chamber: &Chamber,
    occupant: Option<(&Cart, Option<&Recipe>)>,
    now: DateTime<Utc>,
    config: &ThermalConfig,
) -> ThermalTarget {
    match occupant {
        Some((cart, Some(recipe))) => phase_target(cart, recipe, now),
        _ => ThermalTarget {
            inner: chamber.target_temperature,
            outer: chamber.target_temperature + config.idle_outer_offset_c,
        },
    }
}

fn phase_target(cart: &Cart, recipe: &Recipe, now: DateTime<Utc>) -> ThermalTarget {
    let elapsed = |phase| cart.phase_started_at(phase).map(|t| elapsed_secs(t, now));
    match cart.phase {
        Some(ProcessPhase::Bake) => {
            let duration_s = recipe.bake_duration_h * 3600.0;
            let inner = elapsed(ProcessPhase::Bake).map_or(recipe.bake_target_temp, |secs| {
                bake_setpoint(recipe.bake_target_temp, duration_s, secs)
            });
            ThermalTarget {
                inner,
                outer: inner + BAKE_OUTER_OFFSET_C,
            }
        }
        Some(ProcessPhase::Growth) if recipe.target_polarity == Polarity::Cathode => {
            let inner = elapsed(ProcessPhase::Growth).map_or(recipe.growth_target_temp, |secs| {
                growth_setpoint(recipe.growth_target_temp, secs)
            });
            ThermalTarget {
                inner,
                outer: inner,
            }
        }
        Some(ProcessPhase::Dock) => {
            let inner = if recipe.indium_temp > 0.0 {
                recipe.indium_temp
            } else {
                DOCK_FALLBACK_C
            };
            ThermalTarget {
                inner,
                outer: inner + DOCK_OUTER_OFFSET_C,
            }
        }
        Some(ProcessPhase::Seal) => ThermalTarget {
            inner: recipe.indium_temp,
            outer: recipe.indium_temp + SEAL_OUTER_OFFSET_C,
        },
        _ => ThermalTarget {
            inner: AMBIENT_TEMPERATURE_C,
            outer: AMBIENT_TEMPERATURE_C,
        },
    }
}

/// Bake profile: hold, cool to 70 °C, cool to ambient, then ambient.
pub fn bake_setpoint(bake_target: f64, duration_secs: f64, elapsed: f64) -> f64 {
    let hold_end = duration_secs * BAKE_HOLD_END;
    let cool_end = duration_secs * BAKE_COOL_END;
    if elapsed < hold_end {
        bake_target
    } else if elapsed < cool_end {
        let frac = (elapsed - hold_end) / (cool_end - hold_end);
        (bake_target - BAKE_INTERMEDIATE_C).mul_add(1.0 - frac, BAKE_INTERMEDIATE_C)
    } else if elapsed < duration_secs {
        let frac = (elapsed - cool_end) / (duration_secs - cool_end);
        (BAKE_INTERMEDIATE_C - AMBIENT_TEMPERATURE_C).mul_add(-frac, BAKE_INTERMEDIATE_C)
    } else {
        AMBIENT_TEMPERATURE_C
    }
}

/// Growth profile: linear ramp from 230 °C to the end temperature over
/// five hours, then hold.
pub fn growth_setpoint(end_temp: f64, elapsed: f64) -> f64 {
    if elapsed < GROWTH_RAMP_SECS {
        (GROWTH_START_C - end_temp).mul_add(-(elapsed / GROWTH_RAMP_SECS), GROWTH_START_C)
    } else {
        end_temp
    }
}

/// Advance one chamber's temperatures by `dt` simulated seconds.
///
/// Updates the heating flag (automatic mode only), integrates both
/// temperatures, applies a runaway fault and finally the optional jitter.
pub fn advance<R: Rng>(
    chamber: &mut Chamber,
    target: ThermalTarget,
    dt: f64,
    faults: &FaultOverlay,
    noise: Option<&mut R>,
    config: &ThermalConfig,
) {
    if chamber.heating_mode == HeatingMode::Off {
        chamber.is_heating = target.inner > chamber.temperature + config.heating_threshold_c;
    }

    let alpha = lag_factor(chamber, target.inner, dt, config);
    chamber.temperature = lerp(chamber.temperature, target.inner, alpha);
    chamber.outer_temperature = lerp(chamber.outer_temperature, target.outer, alpha);

    if faults.is_active(&chamber.id, FaultKind::TempRunaway) {
        chamber.temperature += config.runaway_rate_c_per_s * dt;
        chamber.status = DeviceStatus::Error;
    }

    if let Some(rng) = noise {
        let amp = config.noise_amplitude_c;
        if amp > 0.0 {
            chamber.temperature += rng.random_range(-amp..=amp);
            chamber.outer_temperature += rng.random_range(-amp..=amp);
        }
    }
}

fn lag_factor(chamber: &Chamber, target: f64, dt: f64, config: &ThermalConfig) -> f64 {
    let base = dt / config.time_constant_s;
    let boost = if chamber.is_heating {
        (1.0 + (target - chamber.temperature).abs() / config.boost_span_c).min(config.boost_cap)
    } else {
        1.0
    };
    (base * boost).clamp(0.0, 1.0)
}

fn lerp(current: f64, target: f64, alpha: f64) -> f64 {
    current.mul_add(1.0 - alpha, target * alpha)
}
