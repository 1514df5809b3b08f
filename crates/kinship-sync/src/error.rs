//! Error types for the kinship-sync crate.

use kinship_codec::CodecError;
use serde::Serialize;
use thiserror::Error;

/// Failures of a document store collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported inside a [`SyncResult`](crate::SyncResult).
///
/// Coordinator entry points never return these directly; they collect them
/// so one bad document never aborts a pass over the others.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum SyncError {
    #[error("Document not found: {path}")]
    NotFound { path: String },

    #[error("Failed to parse {path}: {detail}")]
    ParseFailure { path: String, detail: String },

    #[error("Document is busy: {path}")]
    LockContention { path: String },

    #[error("Stale lock on {path} reclaimed after {held_for_ms}ms")]
    LockTimeout { path: String, held_for_ms: u64 },

    #[error("Cannot order revisions (incoming {incoming:?}, existing {existing:?})")]
    RevisionAmbiguous {
        incoming: Option<String>,
        existing: Option<String>,
    },

    #[error("Store error on {path}: {message}")]
    Store { path: String, message: String },

    #[error("Cannot rename {from} to {to}: target exists")]
    RenameConflict { from: String, to: String },
}

impl SyncError {
    pub fn parse(path: &str, err: CodecError) -> Self {
        SyncError::ParseFailure {
            path: path.to_string(),
            detail: err.to_string(),
        }
    }

    pub fn store(path: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => SyncError::NotFound {
                path: path.to_string(),
            },
            other => SyncError::Store {
                path: path.to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
