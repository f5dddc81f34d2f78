//! Per-carrier MES parameter derivation.
//!
//! Mirrors chamber readings into each carrier's telemetry, derives the
//! polarity-specific process parameters from the active phase and recipe,
//! and models the transient temperature dip a cathode carrier sees when it
//! enters a bake chamber.

use std::collections::BTreeMap;

use autoline_types::{
    AMBIENT_TEMPERATURE_C, Cart, CartId, Chamber, ChamberId, ChamberType, Polarity, ProcessPhase,
    Recipe,
};
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::catalog::{default_anode_recipe, default_cathode_recipe};
use crate::clock::elapsed_secs;

/// Seconds for an entry temperature dip to recover fully.
const DIP_RECOVERY_SECS: f64 = 120.0;
/// Smallest entry dip in degrees Celsius.
const DIP_MIN_C: f64 = 3.0;
/// Largest entry dip in degrees Celsius.
const DIP_MAX_C: f64 = 5.0;
/// Growth duration assumed when the recipe carries none.
const FALLBACK_GROWTH_HOURS: f64 = 12.0;
/// Docking chamber target temperature shown on carriers.
const DOCK_TARGET_C: f64 = 100.0;
/// Oxygen pressure reported outside growth.
const IDLE_O2_PRESSURE: f64 = 1e-7;

/// A decaying temperature offset applied to a carrier's reading.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TempDip {
    magnitude: f64,
    started_at: DateTime<Utc>,
}

impl TempDip {
    /// Remaining offset at `now`, or `None` once recovered.
    fn offset(&self, now: DateTime<Utc>) -> Option<f64> {
        let elapsed = elapsed_secs(self.started_at, now);
        (elapsed < DIP_RECOVERY_SECS).then(|| self.magnitude * (1.0 - elapsed / DIP_RECOVERY_SECS))
    }
}

/// Tracks carrier locations between ticks to detect chamber entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MesTracker {
    locations: BTreeMap<CartId, ChamberId>,
    dips: BTreeMap<CartId, TempDip>,
}

impl MesTracker {
    /// Create an empty tracker.
    pub const fn new() -> Self {
        Self {
            locations: BTreeMap::new(),
            dips: BTreeMap::new(),
        }
    }

    /// Drop state for carriers that no longer exist.
    pub fn retain(&mut self, carts: &[Cart]) {
        self.locations.retain(|id, _| carts.iter().any(|c| &c.id == id));
        self.dips.retain(|id, _| carts.iter().any(|c| &c.id == id));
    }

    /// Whether a dip is currently applied to `cart`.
    pub fn has_dip(&self, cart: &CartId) -> bool {
        self.dips.contains_key(cart)
    }

    /// Record the carrier's location; returns `true` when it changed.
    fn observe(&mut self, cart: &CartId, chamber: &ChamberId) -> bool {
        match self.locations.get(cart) {
            Some(previous) if previous == chamber => false,
            Some(_) => {
                self.locations.insert(cart.clone(), chamber.clone());
                true
            }
            None => {
                self.locations.insert(cart.clone(), chamber.clone());
                false
            }
        }
    }
}

/// Inputs shared by every carrier in one tick.
#[derive(Debug, Clone, Copy)]
pub struct MesContext {
    /// Wall-clock time of the tick.
    pub now: DateTime<Utc>,
    /// Whether jitter is applied to process parameters.
    pub noise_enabled: bool,
    /// Whether the chamber's gauges are failed; readings are not mirrored.
    pub sensors_failed: bool,
}

/// Refresh one carrier's telemetry from the chamber it is in.
pub fn update_cart<R: Rng>(
    cart: &mut Cart,
    chamber: &Chamber,
    recipe: Option<&Recipe>,
    tracker: &mut MesTracker,
    ctx: MesContext,
    rng: &mut R,
) {
    let entered = tracker.observe(&cart.id, &chamber.id);
    if entered && cart.polarity == Polarity::Cathode && chamber.chamber_type == ChamberType::Bake
    {
        tracker.dips.insert(
            cart.id.clone(),
            TempDip {
                magnitude: rng.random_range(DIP_MIN_C..=DIP_MAX_C),
                started_at: ctx.now,
            },
        );
    }

    if !ctx.sensors_failed {
        let dip = match tracker.dips.get(&cart.id).map(|d| d.offset(ctx.now)) {
            Some(Some(offset)) => offset,
            Some(None) => {
                tracker.dips.remove(&cart.id);
                0.0
            }
            None => 0.0,
        };
        cart.telemetry.temperature = Some(chamber.temperature - dip);
        cart.telemetry.vacuum = Some(chamber.high_vac_pressure);
    }

    let fallback;
    let recipe = if let Some(r) = recipe {
        r
    } else {
        fallback = match cart.polarity {
            Polarity::Anode => default_anode_recipe(),
            Polarity::Cathode => default_cathode_recipe(),
        };
        &fallback
    };

    let mut jitter = |amp: f64| {
        if ctx.noise_enabled && amp > 0.0 {
            rng.random_range(-amp..=amp)
        } else {
            0.0
        }
    };

    let t = &mut cart.telemetry;
    match cart.polarity {
        Polarity::Anode => {
            if cart.phase == Some(ProcessPhase::Scrub) {
                t.e_gun_voltage = Some(recipe.e_gun_voltage + jitter(0.2));
                t.e_gun_current = Some(recipe.e_gun_current + jitter(10.0));
            } else {
                t.e_gun_voltage = Some(0.0);
                t.e_gun_current = Some(0.0);
            }
            if cart.phase == Some(ProcessPhase::Seal) {
                t.indium_temp = Some(recipe.indium_temp + jitter(5.0));
                t.seal_pressure = Some(recipe.seal_pressure + jitter(50.0));
            } else {
                t.indium_temp = Some(chamber.temperature);
                t.seal_pressure = Some(0.0);
            }
        }
        Polarity::Cathode => {
            if cart.phase == Some(ProcessPhase::Growth) {
                t.cs_current = Some(recipe.cs_current + jitter(0.2));
                t.o2_pressure = Some(recipe.o2_pressure + jitter(1e-6));
                t.photo_current = Some(recipe.photo_current + jitter(20.0));
            } else {
                t.cs_current = Some(0.0);
                t.o2_pressure = Some(IDLE_O2_PRESSURE);
                t.photo_current = Some(0.0);
            }
        }
    }

    if cart.polarity == Polarity::Cathode {
        cart.telemetry.growth_progress = Some(growth_progress(cart, recipe, ctx.now));
    }

    let (target_temp, target_vacuum) = targets(chamber.chamber_type, cart.polarity, recipe);
    cart.telemetry.target_temp = Some(target_temp);
    cart.telemetry.target_vacuum = Some(target_vacuum);
}

/// Growth progress percentage of a cathode carrier.
pub fn growth_progress(cart: &Cart, recipe: &Recipe, now: DateTime<Utc>) -> f64 {
    if let Some(start) = cart.phase_started_at(ProcessPhase::Growth) {
        let hours = if recipe.growth_duration_h > 0.0 {
            recipe.growth_duration_h
        } else {
            FALLBACK_GROWTH_HOURS
        };
        (elapsed_secs(start, now) / (hours * 3600.0) * 100.0).min(100.0)
    } else if cart.phase_completed(ProcessPhase::Growth) {
        100.0
    } else {
        0.0
    }
}

/// Target temperature and vacuum shown on a carrier in a chamber type.
pub const fn targets(chamber_type: ChamberType, polarity: Polarity, recipe: &Recipe) -> (f64, f64) {
    match chamber_type {
        ChamberType::Bake => (
            recipe.bake_target_temp,
            match polarity {
                Polarity::Anode => 1e-4,
                Polarity::Cathode => 1e-5,
            },
        ),
        ChamberType::Docking => (DOCK_TARGET_C, 1e-5),
        ChamberType::Growth => (recipe.growth_target_temp, 1e-6),
        _ => (AMBIENT_TEMPERATURE_C, 1e-5),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use autoline_types::{LineId, StepStatus};
    use chrono::TimeDelta;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::carrier::{NewCarrier, build_carrier};
    use crate::transition::{activate_phase, close_active_steps};

    fn chamber(id: &str, polarity: Polarity, chamber_type: ChamberType) -> Chamber {
        let mut c = Chamber::new(id, LineId::new("line-1"), id, polarity, chamber_type);
        c.temperature = 200.0;
        c.high_vac_pressure = 2e-5;
        c
    }

    struct Harness {
        tracker: MesTracker,
        rng: StdRng,
    }

    impl Harness {
        fn seeded(seed: u64) -> Self {
            Self {
                tracker: MesTracker::new(),
                rng: StdRng::seed_from_u64(seed),
            }
        }

        fn update(
            &mut self,
            cart: &mut Cart,
            chamber: &Chamber,
            recipe: &Recipe,
            ctx: MesContext,
        ) {
            let rng = &mut self.rng;
            update_cart(cart, chamber, Some(recipe), &mut self.tracker, ctx, rng);
        }
    }

    fn ctx(now: DateTime<Utc>) -> MesContext {
        MesContext {
            now,
            noise_enabled: false,
            sensors_failed: false,
        }
    }

    #[test]
    fn readings_mirror_chamber() {
        let now = Utc::now();
        let jl = chamber("a-jl", Polarity::Anode, ChamberType::LoadLock);
        let recipe = default_anode_recipe();
        let mut cart = build_carrier(&NewCarrier::default(), &jl, &recipe, &[], now);
        let mut mes = Harness::seeded(1);

        mes.update(&mut cart, &jl, &recipe, ctx(now));
        assert_eq!(cart.telemetry.temperature, Some(200.0));
        assert_eq!(cart.telemetry.vacuum, Some(2e-5));
        assert_eq!(cart.telemetry.indium_temp, Some(200.0));
        assert_eq!(cart.telemetry.target_temp, Some(25.0));
    }

    #[test]
    fn scrub_and_seal_use_recipe_setpoints() {
        let now = Utc::now();
        let qs = chamber("a-qs", Polarity::Anode, ChamberType::Cleaning);
        let recipe = default_anode_recipe();
        let mut cart = build_carrier(&NewCarrier::default(), &qs, &recipe, &[], now);
        let mut mes = Harness::seeded(2);

        mes.update(&mut cart, &qs, &recipe, ctx(now));
        assert_eq!(cart.telemetry.e_gun_voltage, Some(5.0));
        assert_eq!(cart.telemetry.e_gun_current, Some(300.0));

        close_active_steps(&mut cart, now);
        activate_phase(&mut cart, ProcessPhase::Seal, now);
        let mut noisy = ctx(now);
        noisy.noise_enabled = true;
        mes.update(&mut cart, &qs, &recipe, noisy);
        assert_eq!(cart.telemetry.e_gun_voltage, Some(0.0));
        let indium = cart.telemetry.indium_temp.unwrap();
        assert!((indium - 100.0).abs() <= 5.0);
        let seal = cart.telemetry.seal_pressure.unwrap();
        assert!((seal - 1200.0).abs() <= 50.0);
    }

    #[test]
    fn cathode_entering_bake_sees_recovering_dip() {
        let start = Utc::now();
        let jl = chamber("c-jl", Polarity::Cathode, ChamberType::LoadLock);
        let hk = chamber("c-hk", Polarity::Cathode, ChamberType::Bake);
        let recipe = default_cathode_recipe();
        let mut cart = build_carrier(&NewCarrier::default(), &jl, &recipe, &[], start);
        let mut mes = Harness::seeded(3);

        mes.update(&mut cart, &jl, &recipe, ctx(start));
        assert!(!mes.tracker.has_dip(&cart.id));

        cart.location_chamber_id = hk.id.clone();
        mes.update(&mut cart, &hk, &recipe, ctx(start));
        let dip = 200.0 - cart.telemetry.temperature.unwrap();
        assert!((3.0..=5.0).contains(&dip), "dip {dip}");

        let halfway = start.checked_add_signed(TimeDelta::seconds(60)).unwrap();
        mes.update(&mut cart, &hk, &recipe, ctx(halfway));
        let half = 200.0 - cart.telemetry.temperature.unwrap();
        assert!((half - dip / 2.0).abs() < 1e-6);

        let later = start.checked_add_signed(TimeDelta::seconds(121)).unwrap();
        mes.update(&mut cart, &hk, &recipe, ctx(later));
        assert_eq!(cart.telemetry.temperature, Some(200.0));
        assert!(!mes.tracker.has_dip(&cart.id));
        assert_eq!(cart.telemetry.target_temp, Some(420.0));
        assert_eq!(cart.telemetry.target_vacuum, Some(1e-5));
    }

    #[test]
    fn growth_progress_tracks_active_step() {
        let now = Utc::now();
        let sz = chamber("c-sz", Polarity::Cathode, ChamberType::Growth);
        let recipe = default_cathode_recipe();
        let loaded = now.checked_sub_signed(TimeDelta::hours(3)).unwrap();
        let mut cart = build_carrier(&NewCarrier::default(), &sz, &recipe, &[], loaded);
        assert_eq!(cart.phase, Some(ProcessPhase::Growth));
        // Activated three hours ago of a twelve-hour growth.
        assert!((growth_progress(&cart, &recipe, now) - 25.0).abs() < 1e-6);

        let mut mes = Harness::seeded(4);
        mes.update(&mut cart, &sz, &recipe, ctx(now));
        assert_eq!(cart.telemetry.cs_current, Some(4.0));
        assert_eq!(cart.telemetry.photo_current, Some(550.0));

        close_active_steps(&mut cart, now);
        activate_phase(&mut cart, ProcessPhase::Unload, now);
        assert!(
            (growth_progress(&cart, &recipe, now) - 100.0).abs() < f64::EPSILON
        );
        assert_eq!(
            cart.steps.iter().filter(|s| s.status == StepStatus::Active).count(),
            1
        );
    }

    #[test]
    fn failed_sensors_freeze_readings() {
        let now = Utc::now();
        let mut hk = chamber("a-hk", Polarity::Anode, ChamberType::Bake);
        let recipe = default_anode_recipe();
        let mut cart = build_carrier(&NewCarrier::default(), &hk, &recipe, &[], now);
        let mut mes = Harness::seeded(5);
        mes.update(&mut cart, &hk, &recipe, ctx(now));

        hk.temperature = 300.0;
        let mut failed = ctx(now);
        failed.sensors_failed = true;
        mes.update(&mut cart, &hk, &recipe, failed);
        assert_eq!(cart.telemetry.temperature, Some(200.0));
        assert_eq!(cart.telemetry.target_vacuum, Some(1e-4));
    }

    #[test]
    fn tracker_forgets_removed_carts() {
        let now = Utc::now();
        let jl = chamber("a-jl", Polarity::Anode, ChamberType::LoadLock);
        let recipe = default_anode_recipe();
        let mut cart = build_carrier(&NewCarrier::default(), &jl, &recipe, &[], now);
        let mut mes = Harness::seeded(6);
        mes.update(&mut cart, &jl, &recipe, ctx(now));
        mes.tracker.retain(&[]);
        assert_eq!(mes.tracker, MesTracker::new());
    }
}
