//! Error types for codegraph-dsa
//!
//! Provides unified error handling across the crate. Engine invariant
//! violations (stale forwarding references, deleted nodes) are not
//! represented here: they are bugs and panic at the point of detection.

use crate::config::ConfigError;
use crate::features::dsa::domain::{CallSiteId, FunctionId};
use thiserror::Error;

/// Main error type for codegraph-dsa operations
#[derive(Debug, Error)]
pub enum DsaError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Module (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A function id that the module does not define
    #[error("Unknown function {0}")]
    UnknownFunction(FunctionId),

    /// The interprocedural fixpoint did not converge within the configured cap
    #[error("Fixpoint did not converge after {iterations} iterations (limit {limit})")]
    IterationLimit { iterations: usize, limit: usize },

    /// A call site still requires propagation after the fixpoint finished
    #[error("Call site {call_site} is not stable after propagation: {state}")]
    Unstable { call_site: CallSiteId, state: String },

    /// A field address whose offset does not fit in 32 bits
    #[error("Offset overflow in {function}: {base} + {offset}")]
    OffsetOverflow {
        function: String,
        base: u32,
        offset: u32,
    },

    /// Analysis error
    #[error("Analysis error: {0}")]
    Analysis(String),
}

impl DsaError {
    /// Create an analysis error
    pub fn analysis(msg: impl Into<String>) -> Self {
        DsaError::Analysis(msg.into())
    }
}

/// Result type alias for codegraph-dsa operations
pub type Result<T> = std::result::Result<T, DsaError>;
