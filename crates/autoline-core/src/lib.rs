//! Simulation engine for the Autoline digital twin.
//!
//! This crate owns the entity graph of one or more production lines and
//! advances it on a fixed-rate tick: thermal model, vacuum model, MES
//! parameter derivation, progress and history recording. Control
//! operations (moves, actuation, carrier lifecycle, faults, line edits) go
//! through the same [`Engine`] lock as the tick and append to its logs.
//!
//! # Modules
//!
//! - [`catalog`] -- [`RecipeCatalog`] seam and the built-in default recipes.
//! - [`carrier`] -- Carrier construction and step planning.
//! - [`clock`] -- Tick counter and scaled simulated time.
//! - [`config`] -- Configuration loading from `autoline-config.yaml`.
//! - [`engine`] -- The control plane shared by the scheduler and callers.
//! - [`error`] -- Control and store error types.
//! - [`events`] -- Bounded system and operation event logs.
//! - [`faults`] -- Fault overlay consulted by the physical models.
//! - [`history`] -- [`HistorySink`] seam and provided sinks.
//! - [`mes`] -- Carrier telemetry derived from the chamber and recipe.
//! - [`scheduler`] -- The background tick loop and its controls.
//! - [`seed`] -- Default line layout.
//! - [`store`] -- Process state: lines, chambers and carriers.
//! - [`thermal`] -- Chamber temperature model.
//! - [`tick`] -- One tick over the whole entity graph.
//! - [`transition`] -- Carrier movement and the step state machine.
//! - [`vacuum`] -- Chamber pressure model.
//!
//! [`RecipeCatalog`]: catalog::RecipeCatalog
//! [`HistorySink`]: history::HistorySink

pub mod carrier;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod faults;
pub mod history;
pub mod mes;
pub mod scheduler;
pub mod seed;
pub mod store;
pub mod thermal;
pub mod tick;
pub mod transition;
pub mod vacuum;

pub use carrier::NewCarrier;
pub use catalog::{InMemoryRecipeCatalog, RecipeCatalog};
pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use error::{ControlError, StoreError};
pub use events::EventLog;
pub use history::{HistoryError, HistorySink, MemoryHistorySink, TracingHistorySink};
pub use scheduler::{SchedulerControl, SchedulerError, SchedulerReport, run_scheduler};
pub use tick::{TickError, TickSummary};
