//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup and scheduler execution.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: autoline_core::ConfigError,
    },

    /// The seed line was rejected by the state store.
    #[error("line setup error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: autoline_core::StoreError,
    },

    /// The tick loop ended with an error.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: autoline_core::SchedulerError,
    },

    /// The scheduler task panicked or was cancelled.
    #[error("scheduler task failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },

    /// Installing the shutdown signal handler failed.
    #[error("signal handler error: {source}")]
    Signal {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
