//! Error taxonomy for the setup run.
//!
//! Fatal errors travel as [`SetupError`] wrapped in `anyhow::Error`, so the
//! binary can print a single diagnostic and exit non-zero. Validation errors
//! are the one recoverable kind: they never leave the prompt loop.

use thiserror::Error;

/// Errors raised by the setup pipeline.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The archiver's search-engine client is missing and cannot (or may not)
    /// be installed automatically.
    #[error("{message}")]
    Environment { message: String },

    /// Operator input did not satisfy a field's constraint.
    #[error("invalid value for {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The target index exists and the operator did not allow skipping.
    #[error("search index '{index}' already exists")]
    Conflict { index: String },

    /// The search engine rejected or never answered an admin call.
    #[error("index provisioning failed: {0}")]
    Provisioning(String),

    /// Standard input closed while a parameter was still unset.
    #[error("input closed before '{field}' was answered")]
    InputClosed { field: &'static str },
}

impl SetupError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        SetupError::Validation {
            field,
            reason: reason.into(),
        }
    }
}
