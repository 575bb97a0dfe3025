//! Error types shared across the computer-registry core.

use thiserror::Error;

/// Errors produced by computer setup, configuration and store operations.
#[derive(Debug, Error)]
pub enum RidgeError {
    /// A field value failed a range or consistency rule.
    #[error("Invalid value for {field}, {reason}")]
    Validation { field: String, reason: String },

    /// A string value is malformed (shebang, template placeholders).
    #[error("{0}")]
    Format(String),

    /// A uniqueness rule was violated.
    #[error("computer '{label}' already exists")]
    Conflict { label: String },

    /// Lookup by label found nothing.
    #[error("computer '{label}' does not exist")]
    NotFound { label: String },

    /// The transport requested by a configure operation does not match the
    /// transport the computer was set up with.
    #[error("computer '{label}' uses transport '{expected}', cannot configure for transport '{requested}'")]
    ConfigurationMismatch {
        label: String,
        expected: String,
        requested: String,
    },

    /// `computer test` requires the computer to be configured first.
    #[error("computer '{label}' is not configured for user '{username}'")]
    NotConfigured { label: String, username: String },

    /// A transport or scheduler identifier is not present in the registry.
    #[error("{kind} '{name}' is not registered")]
    UnknownPlugin { kind: &'static str, name: String },

    /// The persistence layer or a transport failed; propagated unchanged.
    #[error("store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for RidgeError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain in one line.
        RidgeError::Store(format!("{err:#}"))
    }
}

impl RidgeError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RidgeError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_transport(name: impl Into<String>) -> Self {
        RidgeError::UnknownPlugin {
            kind: "transport",
            name: name.into(),
        }
    }

    pub fn unknown_scheduler(name: impl Into<String>) -> Self {
        RidgeError::UnknownPlugin {
            kind: "scheduler",
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RidgeError>;
