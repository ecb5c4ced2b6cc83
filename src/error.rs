// src/error.rs

use thiserror::Error;

/// Error type shared by the grid, domain and multigrid layers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MgError {
    /// Invalid or unsupported solver/grid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A true extent cannot be halved as often as the level count requires.
    #[error(
        "true extent {extent} on axis {axis} is not divisible by {factor} (needed for {levels} multigrid levels)"
    )]
    NotCoarsenable {
        axis: usize,
        extent: usize,
        factor: usize,
        levels: usize,
    },

    /// A field handed to the solver does not match the geometry it was built for.
    #[error("grid geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// Halo exchange or reduction failed.
    #[error("communication error: {0}")]
    Comm(String),
}

impl MgError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
