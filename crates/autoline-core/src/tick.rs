//! Tick cycle: one physics and MES step over the whole entity graph.
//!
//! Each tick runs these phases under the caller's exclusive lock:
//!
//! 1. **Clock** -- advance the tick counter and scale real time by the
//!    time multiplier.
//! 2. **Recipes** -- resolve every carrier's recipe once from the catalog.
//! 3. **Thermal** -- move every chamber's temperatures toward its targets.
//! 4. **Vacuum** -- pump, vent or leak every chamber.
//! 5. **MES** -- mirror chamber readings into carrier telemetry and advance
//!    carrier progress.
//! 6. **History** -- collect one point per chamber and carrier.
//!
//! The history batch is returned in the summary; the caller hands it to the
//! sink once the lock is released.

use std::collections::BTreeMap;

use autoline_types::{
    CartStatus, ChamberId, DeviceStatus, FaultKind, HistoryPoint, Recipe, RecipeId,
    SimulationSettings,
};
use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::catalog::RecipeCatalog;
use crate::clock::{SimClock, TickTime};
use crate::config::EngineConfig;
use crate::events::EventLog;
use crate::faults::FaultOverlay;
use crate::mes::{self, MesContext, MesTracker};
use crate::store::ProcessState;
use crate::{thermal, vacuum};

/// Carrier progress gained per simulated second while in normal status.
pub const PROGRESS_RATE_PER_S: f64 = 0.5;

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: crate::clock::ClockError,
    },
}

/// Everything the simulation mutates, guarded by one lock.
#[derive(Debug)]
pub struct EngineState {
    /// Lines, chambers and carriers.
    pub process: ProcessState,
    /// Injected faults.
    pub faults: FaultOverlay,
    /// Runtime-adjustable simulation settings.
    pub settings: SimulationSettings,
    /// Tick counter and simulated time.
    pub clock: SimClock,
    /// Chamber-entry tracking for MES side effects.
    pub mes: MesTracker,
    /// Random source for noise, dips and actuation delays.
    pub rng: StdRng,
    /// System and operation event logs.
    pub events: EventLog,
}

impl EngineState {
    /// Create an empty state with the given settings and random source.
    pub const fn new(settings: SimulationSettings, rng: StdRng) -> Self {
        Self {
            process: ProcessState::new(),
            faults: FaultOverlay::new(),
            settings,
            clock: SimClock::new(),
            mes: MesTracker::new(),
            rng,
            events: EventLog::new(),
        }
    }
}

/// Summary of a completed tick.
#[derive(Debug, Clone)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Simulated seconds covered by the tick.
    pub dt: f64,
    /// Number of chambers updated.
    pub chambers: usize,
    /// Number of carriers updated.
    pub carts: usize,
    /// Carriers skipped because their chamber could not be resolved.
    pub skipped_carts: usize,
    /// Time-series points collected this tick.
    pub points: Vec<HistoryPoint>,
}

/// Execute one tick covering `real_dt` seconds of real time.
pub fn run_tick(
    state: &mut EngineState,
    real_dt: f64,
    catalog: &dyn RecipeCatalog,
    config: &EngineConfig,
) -> Result<TickSummary, TickError> {
    let time = state.clock.advance(
        real_dt,
        state.settings.time_multiplier,
        chrono::Utc::now(),
    )?;

    let recipes = resolve_recipes(&state.process, catalog);
    let chambers = run_physics(state, &recipes, time, config);
    let (carts, skipped_carts) = run_mes(state, &recipes, time);
    let points = collect_points(&state.process, &state.faults, time);

    debug!(
        tick = time.tick,
        dt = time.dt,
        chambers,
        carts,
        skipped_carts,
        "Tick complete"
    );

    Ok(TickSummary {
        tick: time.tick,
        dt: time.dt,
        chambers,
        carts,
        skipped_carts,
        points,
    })
}

fn resolve_recipes(
    process: &ProcessState,
    catalog: &dyn RecipeCatalog,
) -> BTreeMap<RecipeId, Recipe> {
    let mut recipes = BTreeMap::new();
    for id in process.carts().iter().filter_map(|c| c.recipe_id.as_ref()) {
        if recipes.contains_key(id) {
            continue;
        }
        if let Some(recipe) = catalog.recipe(id) {
            recipes.insert(id.clone(), recipe);
        }
    }
    recipes
}

/// Thermal then vacuum for every chamber; returns the chamber count.
fn run_physics(
    state: &mut EngineState,
    recipes: &BTreeMap<RecipeId, Recipe>,
    time: TickTime,
    config: &EngineConfig,
) -> usize {
    let noise_enabled = state.settings.noise_enabled;
    let faults = &state.faults;
    let rng = &mut state.rng;
    let (lines, carts) = state.process.split_mut();
    let carts: &[_] = carts;

    let mut count = 0usize;
    for chamber in lines.iter_mut().flat_map(|l| l.all_chambers_mut()) {
        let occupant = carts
            .iter()
            .find(|c| c.location_chamber_id == chamber.id)
            .map(|cart| {
                let recipe = cart.recipe_id.as_ref().and_then(|id| recipes.get(id));
                (cart, recipe)
            });
        let target = thermal::target_for(chamber, occupant, time.now, &config.thermal);
        let noise = noise_enabled.then_some(&mut *rng);
        thermal::advance(chamber, target, time.dt, faults, noise, &config.thermal);
        vacuum::advance(chamber, time.dt, faults, &config.vacuum);

        if faults.is_active(&chamber.id, FaultKind::SensorFailure)
            && chamber.status != DeviceStatus::Error
        {
            chamber.status = DeviceStatus::Warning;
        }
        count = count.saturating_add(1);
    }
    count
}

/// MES update and progress for every carrier; returns `(updated, skipped)`.
fn run_mes(
    state: &mut EngineState,
    recipes: &BTreeMap<RecipeId, Recipe>,
    time: TickTime,
) -> (usize, usize) {
    let ctx = MesContext {
        now: time.now,
        noise_enabled: state.settings.noise_enabled,
        sensors_failed: false,
    };
    let faults = &state.faults;
    let tracker = &mut state.mes;
    let rng = &mut state.rng;
    let (lines, carts) = state.process.split_mut();
    tracker.retain(carts);

    let mut updated = 0usize;
    let mut skipped = 0usize;
    for cart in carts.iter_mut() {
        let Some(chamber) = lines
            .iter()
            .flat_map(|l| l.all_chambers())
            .find(|c| c.id == cart.location_chamber_id)
        else {
            warn!(
                cart_id = %cart.id,
                chamber_id = %cart.location_chamber_id,
                "Carrier references unknown chamber, skipping"
            );
            skipped = skipped.saturating_add(1);
            continue;
        };

        let recipe = cart.recipe_id.as_ref().and_then(|id| recipes.get(id));
        let ctx = MesContext {
            sensors_failed: faults.is_active(&chamber.id, FaultKind::SensorFailure),
            ..ctx
        };
        mes::update_cart(cart, chamber, recipe, tracker, ctx, rng);

        if cart.status == CartStatus::Normal {
            cart.progress = PROGRESS_RATE_PER_S.mul_add(time.dt, cart.progress).min(100.0);
        }
        updated = updated.saturating_add(1);
    }
    (updated, skipped)
}

fn collect_points(
    process: &ProcessState,
    faults: &FaultOverlay,
    time: TickTime,
) -> Vec<HistoryPoint> {
    let failed = |id: &ChamberId| faults.is_active(id, FaultKind::SensorFailure);
    let mut points = Vec::new();

    for chamber in process.lines().iter().flat_map(|l| l.all_chambers()) {
        let readable = !failed(&chamber.id);
        points.push(HistoryPoint {
            entity_id: chamber.id.to_string(),
            timestamp: time.now,
            temperature: readable.then_some(chamber.temperature),
            vacuum: readable.then_some(chamber.high_vac_pressure),
        });
    }

    for cart in process.carts() {
        if process.chamber(&cart.location_chamber_id).is_none() {
            continue;
        }
        let readable = !failed(&cart.location_chamber_id);
        points.push(HistoryPoint {
            entity_id: cart.id.to_string(),
            timestamp: time.now,
            temperature: cart.telemetry.temperature.filter(|_| readable),
            vacuum: cart.telemetry.vacuum.filter(|_| readable),
        });
    }
    points
}
