//! Error types for notely-core

use thiserror::Error;

use crate::sync::ProtocolError;

/// Result type alias using notely-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in notely-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sync batch failed protocol validation
    #[error("Invalid sync batch: {0}")]
    Protocol(#[from] ProtocolError),

    /// Request could not be sent or its response could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Sync rejected: {message} ({status})")]
    Rejected { status: u16, message: String },
}

/// Failure classes the sync engine reacts to differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Storage medium unavailable. Surfaced, never retried automatically.
    Local,
    /// Request could not complete. Retried on the next mutation or reconnect.
    Network,
    /// Malformed batch. Rejected before any write.
    Validation,
    /// Storage race on the server. The whole batch may be retried verbatim.
    Conflict,
}

impl Error {
    /// Classify this error into the sync fault taxonomy.
    pub const fn fault(&self) -> Fault {
        match self {
            Self::Database(_) | Self::LibSql(_) | Self::Io(_) | Self::Serialization(_) => {
                Fault::Local
            }
            Self::NotFound(_) | Self::InvalidInput(_) | Self::Protocol(_) => Fault::Validation,
            Self::Http(_) => Fault::Network,
            Self::Rejected { status, .. } => match *status {
                409 => Fault::Conflict,
                400 | 413 | 422 => Fault::Validation,
                _ => Fault::Network,
            },
        }
    }

    /// Whether resending the same batch later can succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.fault(), Fault::Network | Fault::Conflict)
    }
}
