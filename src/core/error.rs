use super::types::{DocumentKey, DocumentKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhantomError {
    #[error("Archive has no entry for {0}")]
    ArchiveMiss(DocumentKey),

    #[error("Failed to archive {key}: {reason}")]
    ArchiveWrite { key: DocumentKey, reason: String },

    #[error("Failed to read archive entry for {key}: {reason}")]
    ArchiveRead { key: DocumentKey, reason: String },

    #[error("{0} was mutated while a swap was in progress")]
    ConcurrentMutation(DocumentKey),

    #[error("{0} archive is not initialized")]
    NotInitialized(DocumentKind),

    #[error("{key} is in use: {reason}")]
    InUse { key: DocumentKey, reason: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Expected a {expected} document, got {found}")]
    WrongKind {
        expected: DocumentKind,
        found: DocumentKind,
    },

    #[error("{key} is a phantom; field '{field}' requires hydration")]
    StillPhantom { key: DocumentKey, field: String },

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, PhantomError>;

impl PhantomError {
    /// The document this error is about, if any.
    pub fn key(&self) -> Option<&DocumentKey> {
        match self {
            Self::ArchiveMiss(key)
            | Self::ConcurrentMutation(key)
            | Self::ArchiveWrite { key, .. }
            | Self::ArchiveRead { key, .. }
            | Self::InUse { key, .. }
            | Self::StillPhantom { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PhantomError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for PhantomError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
