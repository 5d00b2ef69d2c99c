//! Error types for reconciliation.

use thiserror::Error;

use crate::module::ModuleError;
use crate::port::PortError;

/// Why an update was not applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    /// Polyphonic mode without the parameters note dispatch needs.
    /// Nothing was changed.
    #[error(
        "missing required polyphonic parameters: {}. Polyphonic modules must declare \
         'freq' (accepts note numbers) and 'gate' (accepts triggers)",
        missing.join(", ")
    )]
    MissingPolyphonicParameters { missing: Vec<&'static str> },

    /// The module failed to compile or to instantiate
    #[error("cannot create module instance: {0}")]
    Compile(ModuleError),

    /// The host failed to create or remove a port mid-update
    #[error("internal error: {0}")]
    Port(#[from] PortError),
}

impl ReconcileError {
    /// `true` for the expected, user-correctable validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, ReconcileError::MissingPolyphonicParameters { .. })
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
