//! Error types for the roster store.

use thiserror::Error;

use crate::types::DocumentKind;

/// Top-level error type for all roster operations.
///
/// Unknown accounts and roles are never errors here; they are reported
/// through return values. Everything in this enum is a persistence or
/// setup failure the caller has to decide how to handle.
#[derive(Error, Debug)]
pub enum RosterError {
    /// Generic I/O error from the document files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be parsed, or has the wrong shape.
    #[error("Malformed {document} document: {reason}")]
    MalformedDocument {
        /// Which document failed.
        document: DocumentKind,
        /// Parser or shape error.
        reason: String,
    },

    /// Encoding an in-memory value to JSON failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The client registry refused a session record.
    #[error("Client registry error: {0}")]
    Registry(String),

    /// The background writer could not be started.
    #[error("Background writer error: {0}")]
    Writer(String),
}

impl RosterError {
    /// Build a [`RosterError::MalformedDocument`] from any displayable cause.
    pub(crate) fn malformed(document: DocumentKind, reason: impl std::fmt::Display) -> Self {
        Self::MalformedDocument {
            document,
            reason: reason.to_string(),
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RosterError>;
