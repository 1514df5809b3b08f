//! kinship-core: Shared types, configuration, and error handling for kinship.
//!
//! This crate provides the foundational types used by every kinship layer:
//! - Contact identifiers, nodes and relationship edges
//! - References as they appear in structured front-matter fields
//! - Sync operations produced by codec diffs
//! - Ordered field maps for front-matter blocks
//! - Change events delivered by the document store
//! - Configuration management

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::SyncConfig;
pub use error::KinshipError;
pub use events::DocumentEvent;
pub use types::{
    ContactId, ContactNode, FieldMap, Gender, OperationKind, RefNamespace, Reference,
    Relationship, RelationshipEdge, SyncOperation,
};
