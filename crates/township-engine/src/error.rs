//! Error types for the Township engine.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! mode of startup and the operation executor.

use township_core::{BudgetError, ConfigError};

/// Top-level error for the engine.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The generation budget gate failed.
    #[error("budget error: {source}")]
    Budget {
        /// The underlying budget error.
        #[from]
        source: BudgetError,
    },

    /// A requested generation area exceeds the allowed size.
    #[error("area {width}x{height} exceeds the {max}x{max} limit")]
    AreaTooLarge {
        /// Requested width in tiles.
        width: u32,
        /// Requested height in tiles.
        height: u32,
        /// Largest accepted side.
        max: u32,
    },

    /// The input channel to the step loop is closed.
    #[error("channel error: {message}")]
    Channel {
        /// Description of the channel failure.
        message: String,
    },
}
