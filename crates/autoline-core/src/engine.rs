//! Control plane: the engine handle shared by the scheduler and callers.
//!
//! All state lives in one [`EngineState`] behind a single async mutex. Each
//! tick and each control operation holds the lock for its whole duration,
//! so no partial tick interleaves with a partial operation. Valve and pump
//! actuation delays are slept with the lock released; the operation
//! re-validates before applying the final state.
//!
//! Every successful operation except carrier edits appends one entry to
//! the system or operation log. The entry goes to the history sink after
//! the lock is released.

use std::sync::Arc;
use std::time::Duration;

use autoline_types::{
    Cart, CartId, CartPatch, Chamber, ChamberId, ChamberPatch, Direction, FaultKind, Line, LineId,
    LinePatch, LogEntry, LogKind, LogLevel, PumpName, SimulationFault, SimulationSettings,
    SystemState, ValveAction, ValveName,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::carrier::{self, NewCarrier};
use crate::catalog::RecipeCatalog;
use crate::clock::{elapsed_whole_secs, format_duration};
use crate::config::EngineConfig;
use crate::error::{ControlError, StoreError};
use crate::history::HistorySink;
use crate::seed;
use crate::store::ProcessState;
use crate::tick::{self, EngineState, TickError, TickSummary};
use crate::transition::{self, MoveReport};

/// Shared handle to a running simulation.
pub struct Engine {
    state: Mutex<EngineState>,
    catalog: Arc<dyn RecipeCatalog>,
    history: Arc<dyn HistorySink>,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with no lines.
    ///
    /// The random source is seeded from `simulation.seed` when set.
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn RecipeCatalog>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        let rng = config
            .simulation
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let settings = SimulationSettings {
            time_multiplier: config.simulation.time_multiplier,
            noise_enabled: config.simulation.noise_enabled,
        };
        Self {
            state: Mutex::new(EngineState::new(settings, rng)),
            catalog,
            history,
            config,
        }
    }

    /// The configuration the engine was built with.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of the full entity graph and both event logs.
    pub async fn snapshot(&self) -> SystemState {
        let state = self.state.lock().await;
        snapshot_of(&state)
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Execute one tick, measuring real elapsed time since the previous one.
    ///
    /// `fallback_dt` is used for the first tick. The history batch is handed
    /// to the sink after the lock is released; sink failures are logged.
    pub async fn tick(&self, fallback_dt: f64) -> Result<TickSummary, TickError> {
        let summary = {
            let mut state = self.state.lock().await;
            let real_dt = state.clock.measure_real_dt(fallback_dt);
            tick::run_tick(&mut state, real_dt, self.catalog.as_ref(), &self.config)?
        };
        self.record_history(&summary);
        Ok(summary)
    }

    /// Execute one tick covering exactly `real_dt` seconds of real time.
    pub async fn tick_for(&self, real_dt: f64) -> Result<TickSummary, TickError> {
        let summary = {
            let mut state = self.state.lock().await;
            tick::run_tick(&mut state, real_dt, self.catalog.as_ref(), &self.config)?
        };
        self.record_history(&summary);
        Ok(summary)
    }

    /// Forget the previous tick time so the next [`tick`](Self::tick)
    /// covers its fallback interval.
    pub async fn reset_clock_baseline(&self) {
        self.state.lock().await.clock.reset_baseline();
    }

    fn record_history(&self, summary: &TickSummary) {
        if let Err(e) = self.history.record_batch(&summary.points) {
            warn!(tick = summary.tick, error = %e, "History batch not recorded");
        }
    }

    fn record_event(&self, entry: &LogEntry) {
        if let Err(e) = self.history.record_event(entry) {
            warn!(event_id = %entry.id, error = %e, "History event not recorded");
        }
    }

    // -----------------------------------------------------------------------
    // Lines
    // -----------------------------------------------------------------------

    /// Add a production line.
    pub async fn add_line(&self, line: Line) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let line_id = line.id.clone();
        state.process.add_line(line)?;
        info!(line_id = %line_id, "Line added");
        Ok(())
    }

    /// Create a line with a generated id and one load lock per side.
    pub async fn create_line(&self, name: &str) -> Result<Line, ControlError> {
        let (line, entry) = {
            let mut state = self.state.lock().await;
            let line = seed::blank_line(LineId::generate(), name);
            state
                .process
                .add_line(line.clone())
                .map_err(ControlError::from)
                .inspect_err(rejected("create_line"))?;
            let content = format!("Created line {}", line.name);
            let entry = state.events.push(LogKind::System, LogLevel::Success, content, Utc::now());
            (line, entry)
        };
        info!(line_id = %line.id, name = %line.name, "Line created");
        self.record_event(&entry);
        Ok(line)
    }

    /// Rename a line and/or replace its chamber sequences.
    ///
    /// Faults targeting chambers that no longer exist are dropped.
    pub async fn update_line(
        &self,
        line_id: &LineId,
        patch: LinePatch,
    ) -> Result<Line, ControlError> {
        let (line, entry, dropped_faults) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let line = state
                .process
                .update_line(line_id, patch)
                .map_err(ControlError::from)
                .inspect_err(rejected("update_line"))?;
            let dropped = state
                .faults
                .retain_targets(|id| state.process.chamber(id).is_some());
            let content = format!("Updated line {}", line.name);
            let entry = state.events.push(LogKind::System, LogLevel::Success, content, Utc::now());
            (line, entry, dropped)
        };
        info!(line_id = %line_id, dropped_faults, "Line updated");
        self.record_event(&entry);
        Ok(line)
    }

    /// Delete a line that holds no carriers. The last line is kept.
    pub async fn delete_line(&self, line_id: &LineId) -> Result<Line, ControlError> {
        let (line, entry, dropped_faults) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let line = state
                .process
                .remove_line(line_id)
                .map_err(ControlError::from)
                .inspect_err(rejected("delete_line"))?;
            let dropped = state
                .faults
                .retain_targets(|id| state.process.chamber(id).is_some());
            let content = format!("Deleted line {}", line.name);
            let entry = state.events.push(LogKind::System, LogLevel::Warn, content, Utc::now());
            (line, entry, dropped)
        };
        info!(line_id = %line_id, dropped_faults, "Line deleted");
        self.record_event(&entry);
        Ok(line)
    }

    /// Copy a line under a generated id. The copy starts empty.
    pub async fn duplicate_line(&self, line_id: &LineId) -> Result<Line, ControlError> {
        let (copy, entry) = {
            let mut state = self.state.lock().await;
            let copy = state
                .process
                .duplicate_line(line_id, LineId::generate())
                .map_err(ControlError::from)
                .inspect_err(rejected("duplicate_line"))?;
            let content = format!("Duplicated line {line_id} as {}", copy.name);
            let entry = state.events.push(LogKind::System, LogLevel::Success, content, Utc::now());
            (copy, entry)
        };
        info!(line_id = %line_id, copy_id = %copy.id, "Line duplicated");
        self.record_event(&entry);
        Ok(copy)
    }

    // -----------------------------------------------------------------------
    // Carrier movement
    // -----------------------------------------------------------------------

    /// Move a carrier one chamber, parsing the direction name.
    pub async fn move_carrier_named(
        &self,
        cart_id: &CartId,
        direction: &str,
    ) -> Result<SystemState, ControlError> {
        let direction = direction
            .parse::<Direction>()
            .map_err(|e| ControlError::UnknownDirection(e.key))
            .inspect_err(rejected("move_carrier"))?;
        self.move_carrier(cart_id, direction).await
    }

    /// Move a carrier one chamber along its sequence.
    ///
    /// Returns the updated snapshot.
    pub async fn move_carrier(
        &self,
        cart_id: &CartId,
        direction: Direction,
    ) -> Result<SystemState, ControlError> {
        let (snapshot, entry) = {
            let mut state = self.state.lock().await;
            let MoveReport { from, to, phase } =
                transition::move_carrier(&mut state.process, cart_id, direction, Utc::now())
                    .inspect_err(rejected("move_carrier"))?;
            info!(
                cart_id = %cart_id,
                from = %from,
                to = %to,
                phase = ?phase,
                "Carrier moved"
            );
            let content = format!(
                "Moved {} from {} to {}",
                cart_label(&state.process, cart_id),
                chamber_label(&state.process, &from),
                chamber_label(&state.process, &to),
            );
            let entry = state.events.push(
                LogKind::Operation,
                LogLevel::Success,
                content,
                Utc::now(),
            );
            (snapshot_of(&state), entry)
        };
        self.record_event(&entry);
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Actuation
    // -----------------------------------------------------------------------

    /// Open or close a valve, parsing the valve name.
    pub async fn toggle_valve(
        &self,
        chamber_id: &ChamberId,
        valve: &str,
        action: ValveAction,
    ) -> Result<(), ControlError> {
        let valve = valve
            .parse::<ValveName>()
            .map_err(|e| ControlError::UnknownValve(e.key))
            .inspect_err(rejected("toggle_valve"))?;
        self.set_valve(chamber_id, valve, action).await
    }

    /// Open or close a valve after the actuation delay.
    pub async fn set_valve(
        &self,
        chamber_id: &ChamberId,
        valve: ValveName,
        action: ValveAction,
    ) -> Result<(), ControlError> {
        let delay_ms = self.actuation_delay_ms(chamber_id).await?;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let entry = {
            let mut state = self.state.lock().await;
            let chamber =
                chamber_or_err(&mut state, chamber_id).inspect_err(rejected("set_valve"))?;
            chamber.valves.set(valve, action.final_state());
            info!(
                chamber_id = %chamber_id,
                valve = valve.key(),
                state = ?action.final_state(),
                delay_ms,
                "Valve actuated"
            );
            let verb = match action {
                ValveAction::Open => "Opened",
                ValveAction::Closed => "Closed",
            };
            let label = chamber_label(&state.process, chamber_id);
            let content = format!("{verb} {} on {label}", valve.key());
            state.events.push(LogKind::Operation, LogLevel::Success, content, Utc::now())
        };
        self.record_event(&entry);
        Ok(())
    }

    /// Switch a pump on or off, parsing the pump name.
    pub async fn toggle_pump(
        &self,
        chamber_id: &ChamberId,
        pump: &str,
        on: bool,
    ) -> Result<(), ControlError> {
        let pump = pump
            .parse::<PumpName>()
            .map_err(|e| ControlError::UnknownPump(e.key))
            .inspect_err(rejected("toggle_pump"))?;
        self.set_pump(chamber_id, pump, on).await
    }

    /// Switch a pump on or off after the actuation delay.
    ///
    /// Switching a pump into the state it is already in succeeds and is
    /// logged at info level.
    pub async fn set_pump(
        &self,
        chamber_id: &ChamberId,
        pump: PumpName,
        on: bool,
    ) -> Result<(), ControlError> {
        let delay_ms = self.actuation_delay_ms(chamber_id).await?;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let entry = {
            let mut state = self.state.lock().await;
            let chamber =
                chamber_or_err(&mut state, chamber_id).inspect_err(rejected("set_pump"))?;
            let changed = chamber.pump(pump) != on;
            chamber.set_pump(pump, on);
            info!(
                chamber_id = %chamber_id,
                pump = pump.key(),
                on,
                changed,
                delay_ms,
                "Pump switched"
            );
            let label = chamber_label(&state.process, chamber_id);
            let name = pump.key();
            let (level, content) = match (changed, on) {
                (true, true) => (LogLevel::Success, format!("Started {name} pump on {label}")),
                (true, false) => (LogLevel::Success, format!("Stopped {name} pump on {label}")),
                (false, true) => (LogLevel::Info, format!("{name} pump already on at {label}")),
                (false, false) => (LogLevel::Info, format!("{name} pump already off at {label}")),
            };
            state.events.push(LogKind::Operation, level, content, Utc::now())
        };
        self.record_event(&entry);
        Ok(())
    }

    /// Validate the chamber and draw a delay, holding the lock only briefly.
    async fn actuation_delay_ms(&self, chamber_id: &ChamberId) -> Result<u64, ControlError> {
        let mut state = self.state.lock().await;
        if state.process.chamber(chamber_id).is_none() {
            let err = ControlError::ChamberNotFound(chamber_id.clone());
            rejected("actuate")(&err);
            return Err(err);
        }
        let min = self.config.actuation.min_delay_ms;
        let max = self.config.actuation.max_delay_ms.max(min);
        Ok(state.rng.random_range(min..=max))
    }

    // -----------------------------------------------------------------------
    // Carrier lifecycle
    // -----------------------------------------------------------------------

    /// Load a new carrier into a chamber.
    ///
    /// Uses the requested recipe, or the catalog default for the chamber's
    /// polarity when none is given.
    pub async fn create_carrier(
        &self,
        chamber_id: &ChamberId,
        request: &NewCarrier,
    ) -> Result<Cart, ControlError> {
        let (cart, entry) = {
            let mut state = self.state.lock().await;
            let cart = self
                .build_in(&state, chamber_id, request)
                .inspect_err(rejected("create_carrier"))?;
            state.process.insert_cart(cart.clone());
            let label = chamber_label(&state.process, chamber_id);
            let content = format!("Loaded {} into {label}", cart.number);
            let entry = state.events.push(
                LogKind::Operation,
                LogLevel::Success,
                content,
                Utc::now(),
            );
            (cart, entry)
        };
        info!(
            cart_id = %cart.id,
            number = %cart.number,
            chamber_id = %chamber_id,
            recipe_id = ?cart.recipe_id,
            "Carrier created"
        );
        self.record_event(&entry);
        Ok(cart)
    }

    fn build_in(
        &self,
        state: &EngineState,
        chamber_id: &ChamberId,
        request: &NewCarrier,
    ) -> Result<Cart, ControlError> {
        let chamber = state
            .process
            .chamber(chamber_id)
            .ok_or_else(|| ControlError::ChamberNotFound(chamber_id.clone()))?;

        let capacity = chamber.max_cart_capacity;
        let occupants = state.process.occupancy(chamber_id, None);
        if u32::try_from(occupants).unwrap_or(u32::MAX) >= capacity {
            return Err(ControlError::ChamberOccupied {
                chamber: chamber_id.clone(),
                capacity,
            });
        }

        let recipe = match &request.recipe_id {
            Some(id) => self
                .catalog
                .recipe(id)
                .ok_or_else(|| ControlError::recipe(id))?,
            None => self
                .catalog
                .default_recipe(chamber.polarity)
                .ok_or_else(|| {
                    ControlError::RecipeNotFound(format!("default {:?}", chamber.polarity))
                })?,
        };

        Ok(carrier::build_carrier(
            request,
            chamber,
            &recipe,
            state.process.carts(),
            Utc::now(),
        ))
    }

    /// Remove a carrier from the line.
    pub async fn remove_carrier(&self, cart_id: &CartId) -> Result<Cart, ControlError> {
        let (cart, entry) = {
            let mut state = self.state.lock().await;
            let label = chamber_label_of_cart(&state.process, cart_id);
            let cart = state
                .process
                .remove_cart(cart_id)
                .ok_or_else(|| ControlError::CarrierNotFound(cart_id.clone()))
                .inspect_err(rejected("remove_carrier"))?;
            let now = Utc::now();
            let content = match cart.loaded_at {
                Some(loaded_at) => {
                    let resident = format_duration(elapsed_whole_secs(loaded_at, now));
                    format!("Removed {} from {label} after {resident}", cart.number)
                }
                None => format!("Removed {} from {label}", cart.number),
            };
            let entry = state.events.push(LogKind::Operation, LogLevel::Success, content, now);
            (cart, entry)
        };
        info!(
            cart_id = %cart_id,
            chamber_id = %cart.location_chamber_id,
            "Carrier removed"
        );
        self.record_event(&entry);
        Ok(cart)
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Apply a partial update to a chamber.
    pub async fn update_chamber(
        &self,
        chamber_id: &ChamberId,
        patch: &ChamberPatch,
    ) -> Result<Chamber, ControlError> {
        let (chamber, entry) = {
            let mut state = self.state.lock().await;
            let chamber =
                chamber_or_err(&mut state, chamber_id).inspect_err(rejected("update_chamber"))?;
            patch.apply(chamber);
            let chamber = chamber.clone();
            let label = chamber_label(&state.process, chamber_id);
            let content = format!("Updated settings of {label}");
            let entry = state.events.push(LogKind::System, LogLevel::Info, content, Utc::now());
            (chamber, entry)
        };
        info!(chamber_id = %chamber_id, "Chamber updated");
        self.record_event(&entry);
        Ok(chamber)
    }

    /// Apply a partial update to a carrier.
    pub async fn update_cart(
        &self,
        cart_id: &CartId,
        patch: &CartPatch,
    ) -> Result<Cart, ControlError> {
        let mut state = self.state.lock().await;
        let cart = state
            .process
            .cart_mut(cart_id)
            .ok_or_else(|| ControlError::CarrierNotFound(cart_id.clone()))
            .inspect_err(rejected("update_cart"))?;
        patch.apply(cart);
        info!(cart_id = %cart_id, "Carrier updated");
        Ok(cart.clone())
    }

    // -----------------------------------------------------------------------
    // Faults, settings and logs
    // -----------------------------------------------------------------------

    /// Inject a fault targeting a chamber.
    pub async fn inject_fault(
        &self,
        kind: FaultKind,
        chamber_id: &ChamberId,
    ) -> Result<SimulationFault, ControlError> {
        let (fault, entry) = {
            let mut state = self.state.lock().await;
            let line_id = state
                .process
                .chamber(chamber_id)
                .map(|c| c.line_id.clone())
                .ok_or_else(|| ControlError::ChamberNotFound(chamber_id.clone()))
                .inspect_err(rejected("inject_fault"))?;
            let now = Utc::now();
            let fault = state.faults.inject(kind, line_id, chamber_id.clone(), now);
            let content = fault.description.clone();
            let entry = state.events.push(LogKind::System, LogLevel::Warn, content, now);
            (fault, entry)
        };
        warn!(
            fault_id = %fault.id,
            kind = ?kind,
            chamber_id = %chamber_id,
            "Fault injected"
        );
        self.record_event(&entry);
        Ok(fault)
    }

    /// Remove every injected fault. Returns how many were cleared.
    pub async fn clear_faults(&self) -> usize {
        let (cleared, entry) = {
            let mut state = self.state.lock().await;
            let cleared = state.faults.clear();
            let content = format!("Cleared {cleared} faults");
            let entry = state.events.push(LogKind::System, LogLevel::Info, content, Utc::now());
            (cleared, entry)
        };
        info!(cleared, "Faults cleared");
        self.record_event(&entry);
        cleared
    }

    /// Change the time multiplier and noise switch.
    pub async fn configure(
        &self,
        time_multiplier: f64,
        noise_enabled: bool,
    ) -> Result<SimulationSettings, ControlError> {
        let max = self.config.simulation.max_time_multiplier;
        if !(time_multiplier.is_finite() && time_multiplier > 0.0 && time_multiplier <= max) {
            let err = ControlError::InvalidTimeMultiplier {
                value: time_multiplier,
                max,
            };
            rejected("configure")(&err);
            return Err(err);
        }
        let (settings, entry) = {
            let mut state = self.state.lock().await;
            state.settings = SimulationSettings {
                time_multiplier,
                noise_enabled,
            };
            let noise = if noise_enabled { "on" } else { "off" };
            let content = format!("Time multiplier set to {time_multiplier}x, noise {noise}");
            let entry = state.events.push(LogKind::System, LogLevel::Info, content, Utc::now());
            (state.settings, entry)
        };
        info!(
            time_multiplier,
            noise_enabled,
            "Simulation settings changed"
        );
        self.record_event(&entry);
        Ok(settings)
    }

    /// Empty the operation log. Returns how many entries were removed.
    pub async fn clear_operation_logs(&self) -> usize {
        let mut state = self.state.lock().await;
        let cleared = state.events.clear(LogKind::Operation);
        info!(cleared, "Operation log cleared");
        cleared
    }
}

/// Debug-log a rejected control operation.
fn rejected(operation: &'static str) -> impl Fn(&ControlError) {
    move |error| debug!(operation, error = %error, "Control operation rejected")
}

fn chamber_or_err<'a>(
    state: &'a mut EngineState,
    chamber_id: &ChamberId,
) -> Result<&'a mut Chamber, ControlError> {
    state
        .process
        .chamber_mut(chamber_id)
        .ok_or_else(|| ControlError::ChamberNotFound(chamber_id.clone()))
}

/// `"<chamber name> (<line name>)"`, or the bare id for unknown chambers.
fn chamber_label(process: &ProcessState, chamber_id: &ChamberId) -> String {
    let Some(chamber) = process.chamber(chamber_id) else {
        return chamber_id.to_string();
    };
    match process.line(&chamber.line_id) {
        Some(line) => format!("{} ({})", chamber.name, line.name),
        None => chamber.name.clone(),
    }
}

fn chamber_label_of_cart(process: &ProcessState, cart_id: &CartId) -> String {
    process
        .cart(cart_id)
        .map(|c| chamber_label(process, &c.location_chamber_id))
        .unwrap_or_default()
}

fn cart_label(process: &ProcessState, cart_id: &CartId) -> String {
    process
        .cart(cart_id)
        .map_or_else(|| cart_id.to_string(), |c| c.number.clone())
}

fn snapshot_of(state: &EngineState) -> SystemState {
    SystemState {
        lines: state.process.lines().to_vec(),
        carts: state.process.carts().to_vec(),
        faults: state.faults.faults().to_vec(),
        settings: state.settings,
        system_logs: state.events.to_vec(LogKind::System),
        operation_logs: state.events.to_vec(LogKind::Operation),
        tick: state.clock.tick(),
        timestamp: Utc::now(),
    }
}
