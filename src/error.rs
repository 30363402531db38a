//! Error types for mapping exploration.
//!
//! Statistical trouble (no feasible samples, a failed simulation) is absorbed
//! and logged by the engine. Everything that reaches a caller lands here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DseError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Simulation of mapping {mapping} failed: {reason}")]
    Simulation { mapping: String, reason: String },

    #[error("Mapping refers to unknown {kind} {index}")]
    Structural { kind: &'static str, index: usize },

    #[error("Simulation deadlocked at {time_ps} ps with {blocked} blocked processes")]
    Deadlock { time_ps: u64, blocked: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DseError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        DseError::Configuration(reason.into())
    }
}

/// Result type alias for exploration operations.
pub type DseResult<T> = Result<T, DseError>;
