//! Configuration loading and typed config structures for the engine.
//!
//! The canonical configuration lives in `autoline-config.yaml` in the
//! working directory. Every field carries a default so a missing or empty
//! section yields the tuned constants of the coarse thermal and vacuum
//! models.

use std::path::Path;

use serde::Deserialize;

/// Environment variable overriding `simulation.time_multiplier`.
pub const TIME_MULTIPLIER_ENV: &str = "AUTOLINE_TIME_MULTIPLIER";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `autoline-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Scheduler and time-scaling settings.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Thermal model constants.
    #[serde(default)]
    pub thermal: ThermalConfig,

    /// Vacuum model constants.
    #[serde(default)]
    pub vacuum: VacuumConfig,

    /// Valve and pump actuation delay.
    #[serde(default)]
    pub actuation: ActuationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `AUTOLINE_TIME_MULTIPLIER` overrides `simulation.time_multiplier`
    /// when set to a parseable number. The result is validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(multiplier) = std::env::var(TIME_MULTIPLIER_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
        {
            self.simulation.time_multiplier = multiplier;
        }
    }

    /// Check semantic constraints the YAML schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if !(sim.max_time_multiplier.is_finite() && sim.max_time_multiplier > 0.0) {
            return Err(invalid(
                "simulation.max_time_multiplier",
                "must be a positive number",
            ));
        }
        if !(sim.time_multiplier.is_finite()
            && sim.time_multiplier > 0.0
            && sim.time_multiplier <= sim.max_time_multiplier)
        {
            return Err(invalid(
                "simulation.time_multiplier",
                format!("must be in (0, {}]", sim.max_time_multiplier),
            ));
        }
        if sim.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            return Err(invalid(
                "simulation.tick_interval_ms",
                format!("must be at least {MIN_TICK_INTERVAL_MS}"),
            ));
        }

        let positive = [
            ("thermal.time_constant_s", self.thermal.time_constant_s),
            ("thermal.boost_span_c", self.thermal.boost_span_c),
            ("vacuum.roughing_time_constant_s", self.vacuum.roughing_time_constant_s),
            ("vacuum.molecular_time_constant_s", self.vacuum.molecular_time_constant_s),
            ("vacuum.vent_time_constant_s", self.vacuum.vent_time_constant_s),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, "must be a positive number"));
            }
        }
        if self.thermal.boost_cap < 1.0 {
            return Err(invalid("thermal.boost_cap", "must be at least 1.0"));
        }
        if self.vacuum.min_pressure_pa <= 0.0
            || self.vacuum.min_pressure_pa >= self.vacuum.atmosphere_pa
        {
            return Err(invalid(
                "vacuum.min_pressure_pa",
                "must be positive and below atmosphere",
            ));
        }
        if self.actuation.min_delay_ms > self.actuation.max_delay_ms {
            return Err(invalid(
                "actuation.min_delay_ms",
                "must not exceed actuation.max_delay_ms",
            ));
        }
        if self.actuation.max_delay_ms > MAX_ACTUATION_DELAY_MS {
            return Err(invalid(
                "actuation.max_delay_ms",
                format!("must be at most {MAX_ACTUATION_DELAY_MS}"),
            ));
        }
        Ok(())
    }
}

/// Lower bound on the scheduler tick interval.
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Upper bound on a valve or pump actuation delay.
pub const MAX_ACTUATION_DELAY_MS: u64 = 1_000;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Scheduler and time-scaling configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Simulated seconds per real second at startup.
    #[serde(default = "default_time_multiplier")]
    pub time_multiplier: f64,

    /// Upper bound accepted by runtime reconfiguration.
    #[serde(default = "default_max_time_multiplier")]
    pub max_time_multiplier: f64,

    /// Whether sensor and process-parameter jitter is applied at startup.
    #[serde(default = "default_true")]
    pub noise_enabled: bool,

    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// RNG seed. Unset means seeded from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_multiplier: default_time_multiplier(),
            max_time_multiplier: default_max_time_multiplier(),
            noise_enabled: true,
            tick_interval_ms: default_tick_interval_ms(),
            seed: None,
        }
    }
}

/// Thermal model constants.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThermalConfig {
    /// First-order lag time constant in seconds.
    #[serde(default = "default_thermal_time_constant_s")]
    pub time_constant_s: f64,

    /// Maximum heating boost factor.
    #[serde(default = "default_boost_cap")]
    pub boost_cap: f64,

    /// Temperature gap at which the boost adds one full unit.
    #[serde(default = "default_boost_span_c")]
    pub boost_span_c: f64,

    /// Gap above current temperature that switches automatic heating on.
    #[serde(default = "default_heating_threshold_c")]
    pub heating_threshold_c: f64,

    /// Outer offset when no recipe drives the chamber.
    #[serde(default = "default_idle_outer_offset_c")]
    pub idle_outer_offset_c: f64,

    /// Inner temperature climb under a runaway fault, per simulated second.
    #[serde(default = "default_runaway_rate_c_per_s")]
    pub runaway_rate_c_per_s: f64,

    /// Half-width of the uniform temperature jitter.
    #[serde(default = "default_noise_amplitude_c")]
    pub noise_amplitude_c: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            time_constant_s: default_thermal_time_constant_s(),
            boost_cap: default_boost_cap(),
            boost_span_c: default_boost_span_c(),
            heating_threshold_c: default_heating_threshold_c(),
            idle_outer_offset_c: default_idle_outer_offset_c(),
            runaway_rate_c_per_s: default_runaway_rate_c_per_s(),
            noise_amplitude_c: default_noise_amplitude_c(),
        }
    }
}

/// Vacuum model constants. Pressures in pascals, rates in Pa/s.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VacuumConfig {
    /// Atmospheric pressure and upper clamp.
    #[serde(default = "default_atmosphere_pa")]
    pub atmosphere_pa: f64,

    /// Lower clamp.
    #[serde(default = "default_min_pressure_pa")]
    pub min_pressure_pa: f64,

    /// Roughing pump end pressure.
    #[serde(default = "default_roughing_target_pa")]
    pub roughing_target_pa: f64,

    /// Roughing time constant in seconds.
    #[serde(default = "default_roughing_time_constant_s")]
    pub roughing_time_constant_s: f64,

    /// Pressure at or below which the molecular pump takes over.
    #[serde(default = "default_molecular_handover_pa")]
    pub molecular_handover_pa: f64,

    /// Molecular pump end pressure.
    #[serde(default = "default_molecular_target_pa")]
    pub molecular_target_pa: f64,

    /// Molecular pump end pressure in growth chambers.
    #[serde(default = "default_growth_target_pa")]
    pub growth_target_pa: f64,

    /// Molecular time constant in seconds.
    #[serde(default = "default_molecular_time_constant_s")]
    pub molecular_time_constant_s: f64,

    /// Vent time constant in seconds.
    #[serde(default = "default_vent_time_constant_s")]
    pub vent_time_constant_s: f64,

    /// Leak rate of an isolated bake chamber.
    #[serde(default = "default_bake_leak_rate")]
    pub bake_leak_rate: f64,

    /// Leak rate of an isolated growth chamber.
    #[serde(default = "default_growth_leak_rate")]
    pub growth_leak_rate: f64,

    /// Leak rate of every other isolated chamber.
    #[serde(default = "default_leak_rate")]
    pub default_leak_rate: f64,

    /// Leak rate while a vacuum-leak fault is active.
    #[serde(default = "default_fault_leak_rate")]
    pub fault_leak_rate: f64,
}

impl Default for VacuumConfig {
    fn default() -> Self {
        Self {
            atmosphere_pa: default_atmosphere_pa(),
            min_pressure_pa: default_min_pressure_pa(),
            roughing_target_pa: default_roughing_target_pa(),
            roughing_time_constant_s: default_roughing_time_constant_s(),
            molecular_handover_pa: default_molecular_handover_pa(),
            molecular_target_pa: default_molecular_target_pa(),
            growth_target_pa: default_growth_target_pa(),
            molecular_time_constant_s: default_molecular_time_constant_s(),
            vent_time_constant_s: default_vent_time_constant_s(),
            bake_leak_rate: default_bake_leak_rate(),
            growth_leak_rate: default_growth_leak_rate(),
            default_leak_rate: default_leak_rate(),
            fault_leak_rate: default_fault_leak_rate(),
        }
    }
}

/// Valve and pump actuation delay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActuationConfig {
    /// Shortest delay in milliseconds.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Longest delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_time_multiplier() -> f64 {
    1.0
}

const fn default_max_time_multiplier() -> f64 {
    60.0
}

const fn default_tick_interval_ms() -> u64 {
    1_000
}

const fn default_thermal_time_constant_s() -> f64 {
    150.0
}

const fn default_boost_cap() -> f64 {
    2.0
}

const fn default_boost_span_c() -> f64 {
    100.0
}

const fn default_heating_threshold_c() -> f64 {
    1.0
}

const fn default_idle_outer_offset_c() -> f64 {
    10.0
}

const fn default_runaway_rate_c_per_s() -> f64 {
    5.0
}

const fn default_noise_amplitude_c() -> f64 {
    0.1
}

const fn default_atmosphere_pa() -> f64 {
    101_325.0
}

const fn default_min_pressure_pa() -> f64 {
    1e-9
}

const fn default_roughing_target_pa() -> f64 {
    1.0
}

const fn default_roughing_time_constant_s() -> f64 {
    60.0
}

const fn default_molecular_handover_pa() -> f64 {
    10.0
}

const fn default_molecular_target_pa() -> f64 {
    1e-5
}

const fn default_growth_target_pa() -> f64 {
    1e-6
}

const fn default_molecular_time_constant_s() -> f64 {
    300.0
}

const fn default_vent_time_constant_s() -> f64 {
    10.0
}

const fn default_bake_leak_rate() -> f64 {
    1e-7
}

const fn default_growth_leak_rate() -> f64 {
    1e-8
}

const fn default_leak_rate() -> f64 {
    5e-8
}

const fn default_fault_leak_rate() -> f64 {
    100.0
}

const fn default_min_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
