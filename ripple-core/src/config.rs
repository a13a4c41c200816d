//! Runtime Configuration
//!
//! Scheduler tuning knobs. Configs are plain values that can be built in code
//! or loaded from JSON, and are installed per thread with
//! [`Runtime::configure`](crate::reactive::Runtime::configure).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default bound on the number of passes a single flush may take.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 1000;

/// When pending effects are flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Flush when the outermost `write` or `batch` call returns.
    #[default]
    Sync,

    /// Writes only mark; the host calls `flush()` at the end of its turn.
    Manual,
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Passes allowed before a flush fails with `MaxFlushIterationsExceeded`.
    pub max_flush_iterations: usize,

    /// When pending effects are flushed.
    pub flush_mode: FlushMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
            flush_mode: FlushMode::Sync,
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the pass bound.
    pub fn with_max_flush_iterations(mut self, limit: usize) -> Self {
        self.max_flush_iterations = limit;
        self
    }

    /// Set the flush mode.
    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_iterations == 0 {
            return Err(ConfigError::ZeroFlushIterations);
        }
        Ok(())
    }
}
