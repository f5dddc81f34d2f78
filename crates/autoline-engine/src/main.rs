//! Simulation engine binary for the Autoline digital twin.
//!
//! Wires together configuration, the default line, the recipe catalog,
//! the history sink and the tick scheduler, then runs until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `autoline-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the engine with the default recipes and history sink
//! 4. Seed the default production line
//! 5. Spawn the scheduler
//! 6. Wait for Ctrl-C (or a scheduler failure) and stop cleanly

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use autoline_core::config::LoggingConfig;
use autoline_core::{
    Engine, EngineConfig, InMemoryRecipeCatalog, SchedulerControl, TracingHistorySink,
    run_scheduler, seed,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "autoline-config.yaml";

/// Environment variable naming an alternative configuration file.
const CONFIG_PATH_ENV: &str = "AUTOLINE_CONFIG";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, line setup or the scheduler fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let (config, config_source) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("autoline-engine starting");
    info!(
        source = %config_source,
        time_multiplier = config.simulation.time_multiplier,
        noise_enabled = config.simulation.noise_enabled,
        tick_interval_ms = config.simulation.tick_interval_ms,
        seed = ?config.simulation.seed,
        "Configuration loaded"
    );

    // 3. Build the engine.
    let tick_interval_ms = config.simulation.tick_interval_ms;
    let engine = Arc::new(Engine::new(
        config,
        Arc::new(InMemoryRecipeCatalog::with_defaults()),
        Arc::new(TracingHistorySink),
    ));

    // 4. Seed the default line.
    engine.add_line(seed::default_line()).await?;
    let snapshot = engine.snapshot().await;
    info!(
        lines = snapshot.lines.len(),
        chambers = snapshot
            .lines
            .iter()
            .map(|l| l.all_chambers().count())
            .sum::<usize>(),
        "Default line seeded"
    );

    // 5. Spawn the scheduler.
    let control = Arc::new(SchedulerControl::new(tick_interval_ms));
    let mut scheduler = {
        let engine = Arc::clone(&engine);
        let control = Arc::clone(&control);
        tokio::spawn(async move { run_scheduler(&engine, &control).await })
    };

    // 6. Run until Ctrl-C or the scheduler ends on its own.
    let report = tokio::select! {
        joined = &mut scheduler => joined??,
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|source| EngineError::Signal { source })?;
            info!("Shutdown signal received");
            control.request_stop();
            scheduler.await??
        }
    };

    let final_state = engine.snapshot().await;
    info!(
        ticks = report.ticks,
        sim_seconds = report.sim_seconds,
        carts = final_state.carts.len(),
        faults = final_state.faults.len(),
        system_events = final_state.system_logs.len(),
        "autoline-engine shutdown complete"
    );
    Ok(())
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Load the engine configuration.
///
/// Reads `AUTOLINE_CONFIG` if set, otherwise `autoline-config.yaml` in
/// the working directory. A missing file yields the defaults (with the
/// environment overrides still applied).
fn load_config() -> Result<(EngineConfig, String), EngineError> {
    let path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    if path.exists() {
        let config = EngineConfig::from_file(&path)?;
        Ok((config, path.display().to_string()))
    } else {
        let mut config = EngineConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok((config, "defaults".to_owned()))
    }
}
